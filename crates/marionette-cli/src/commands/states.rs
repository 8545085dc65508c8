//! Behavior state table command

use anyhow::Result;
use marionette_animation::behavior::{TransitionTable, EMOTIONAL_STATE_DURATION};
use marionette_animation::BehaviorState;

pub fn run() -> Result<()> {
    let table = TransitionTable::default();

    println!("Behavior states ({}):", BehaviorState::ALL.len());
    for state in BehaviorState::ALL {
        let allowed: Vec<&str> = table.allowed(state).iter().map(|s| s.as_str()).collect();
        let params = state.params();
        let mut notes = Vec::new();
        if state.is_emotional() {
            notes.push(format!("returns to idle after {}s", EMOTIONAL_STATE_DURATION));
        }
        if params.expression != "neutral" {
            notes.push(format!(
                "expression {} {:.1}",
                params.expression, params.expression_weight
            ));
        }

        println!("  {:<16} -> {}", state.as_str(), allowed.join(", "));
        if !notes.is_empty() {
            println!("  {:<16}    ({})", "", notes.join("; "));
        }
    }
    Ok(())
}
