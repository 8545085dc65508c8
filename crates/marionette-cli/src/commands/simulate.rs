//! Headless simulation command
//!
//! Drives an `AvatarController` against a `MemoryRig` on a fixed timestep,
//! feeding it inputs from a TOML script:
//!
//! ```toml
//! [[step]]
//! at = 1.0
//! state = "dancing"
//!
//! [[step]]
//! at = 4.0
//! pointer = { kind = "click", position = { x = 0.5, y = 0.5 } }
//!
//! [[step]]
//! at = 6.0
//! speech = { speaking = true, energy = 0.4 }
//! ```

use anyhow::{bail, Context, Result};
use marionette_animation::{
    AnimationCatalog, AvatarController, BehaviorState, ClipSource, DirectoryClipSource,
    EngineEvent, MemoryRig, SetStateOptions, SyntheticClipSource,
};
use marionette_runtime::{FrameClock, InteractionType, PointerInput};
use serde::Deserialize;
use std::path::Path;
use std::rc::Rc;

pub struct SimulateArgs {
    pub catalog: Option<String>,
    pub clips: Option<String>,
    pub seconds: f64,
    pub fps: f64,
    pub seed: Option<u64>,
    pub script: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Script {
    #[serde(default, rename = "step")]
    steps: Vec<ScriptStep>,
}

/// One timed input. Any combination of fields may be set; they apply in
/// declaration order.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptStep {
    at: f64,
    state: Option<BehaviorState>,
    #[serde(default)]
    force: bool,
    emotion: Option<String>,
    interaction: Option<InteractionType>,
    pointer: Option<PointerInput>,
    speech: Option<Speech>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Speech {
    speaking: bool,
    #[serde(default)]
    energy: f32,
}

fn parse_script(content: &str) -> Result<Script> {
    let mut script: Script = toml::from_str(content)?;
    if let Some(step) = script.steps.iter().find(|s| !s.at.is_finite() || s.at < 0.0) {
        bail!("script step time must be a non-negative number, got {}", step.at);
    }
    script.steps.sort_by(|a, b| a.at.total_cmp(&b.at));
    Ok(script)
}

pub fn run(args: SimulateArgs) -> Result<()> {
    if !args.fps.is_finite() || args.fps <= 0.0 || !args.seconds.is_finite() || args.seconds < 0.0
    {
        bail!("--fps must be positive and --seconds non-negative");
    }

    let catalog = match &args.catalog {
        Some(path) => AnimationCatalog::load_from_file(Path::new(path))?,
        None => AnimationCatalog::builtin()?,
    };
    let script = match &args.script {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read script {}", path))?;
            parse_script(&content).with_context(|| format!("invalid script {}", path))?
        }
        None => Script::default(),
    };
    let source: Rc<dyn ClipSource> = match &args.clips {
        Some(dir) => Rc::new(DirectoryClipSource::new(dir)),
        None => Rc::new(SyntheticClipSource),
    };

    let mut avatar = AvatarController::new(catalog, source);
    if let Some(seed) = args.seed {
        avatar = avatar.with_seed(seed);
    }
    let mut rig = MemoryRig::humanoid();
    avatar.initialize()?;

    let mut clock = FrameClock::with_fixed_timestep(args.fps);
    let frames = (args.seconds * args.fps).round() as u64;
    let mut steps = script.steps.iter().peekable();
    let mut last = avatar.snapshot();
    println!(
        "[{:>7.2}s] start     state={} clip={}",
        0.0,
        last.behavior_state,
        last.current_clip.as_deref().unwrap_or("-")
    );

    for _ in 0..frames {
        let now = clock.total_time;
        while let Some(step) = steps.next_if(|s| s.at <= now) {
            apply_step(&mut avatar, step, now);
        }

        let dt = clock.step();
        for event in avatar.tick(&mut rig, dt)? {
            print_event(clock.total_time, &event);
        }

        let snap = avatar.snapshot();
        if snap.behavior_state != last.behavior_state {
            println!(
                "[{:>7.2}s] state     {} -> {}",
                clock.total_time, last.behavior_state, snap.behavior_state
            );
        }
        last = snap;
    }

    let cache = avatar.engine().cache();
    println!(
        "[{:>7.2}s] end       state={} clip={} playing={} cached={} frames={}",
        clock.total_time,
        last.behavior_state,
        last.current_clip.as_deref().unwrap_or("-"),
        last.is_playing,
        cache.loaded_count(),
        clock.frame_count()
    );
    avatar.dispose();
    Ok(())
}

fn apply_step(avatar: &mut AvatarController, step: &ScriptStep, now: f64) {
    if let Some(state) = step.state {
        let options = SetStateOptions {
            force: step.force,
            ..SetStateOptions::default()
        };
        if !avatar.set_state(state, options) {
            println!("[{:>7.2}s] rejected  state {}", now, state);
        }
    }
    if let Some(emotion) = &step.emotion {
        match avatar.set_emotion(emotion) {
            Ok(outcome) => println!(
                "[{:>7.2}s] emotion   {} (clip={} expression={} {:.1})",
                now,
                outcome.emotion,
                outcome.clip.as_deref().unwrap_or("-"),
                outcome.expression,
                outcome.intensity
            ),
            Err(err) => println!("[{:>7.2}s] emotion   {} failed: {}", now, emotion, err),
        }
    }
    if let Some(kind) = step.interaction {
        avatar.handle_interaction(kind);
    }
    if let Some(input) = &step.pointer {
        for event in avatar.handle_pointer(input) {
            println!(
                "[{:>7.2}s] pointer   {:?} {} (d={:.3})",
                now, event.kind, event.zone, event.distance
            );
        }
    }
    if let Some(speech) = &step.speech {
        avatar.set_speech(speech.speaking, speech.energy);
    }
}

fn print_event(t: f64, event: &EngineEvent) {
    match event {
        EngineEvent::ClipStarted { name, looping } => {
            let mode = if *looping { "loop" } else { "once" };
            println!("[{:>7.2}s] clip      {} ({})", t, name, mode);
        }
        EngineEvent::ClipFinished { name } => println!("[{:>7.2}s] finished  {}", t, name),
        EngineEvent::ReturnToIdle => println!("[{:>7.2}s] return    idle", t),
        EngineEvent::LoadFailed(err) => println!("[{:>7.2}s] error     {}", t, err),
        EngineEvent::RecoveryAttempted => println!("[{:>7.2}s] watchdog  recovery", t),
        EngineEvent::RestPoseApplied => println!("[{:>7.2}s] watchdog  rest pose", t),
        EngineEvent::ExpressionSettled { channel } => {
            println!("[{:>7.2}s] face      {} settled", t, channel)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marionette_core::Vec2;

    #[test]
    fn script_steps_parse_and_sort() {
        let script = parse_script(
            r#"
            [[step]]
            at = 4.0
            pointer = { kind = "click", position = { x = 0.5, y = 0.5 } }

            [[step]]
            at = 1.0
            state = "dancing"
            force = true

            [[step]]
            at = 2.5
            emotion = "sad"
            speech = { speaking = true, energy = 0.4 }
            interaction = "double_click"
            "#,
        )
        .unwrap();

        let times: Vec<f64> = script.steps.iter().map(|s| s.at).collect();
        assert_eq!(times, vec![1.0, 2.5, 4.0]);
        assert_eq!(script.steps[0].state, Some(BehaviorState::Dancing));
        assert!(script.steps[0].force);
        assert_eq!(script.steps[1].interaction, Some(InteractionType::DoubleClick));
        assert_eq!(
            script.steps[2].pointer,
            Some(PointerInput::Click {
                position: Vec2::new(0.5, 0.5)
            })
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(parse_script("[[step]]\nat = 1.0\ndance = \"spin\"").is_err());
        assert!(parse_script("[[step]]\nat = -1.0").is_err());
    }

    #[test]
    fn empty_script_is_valid() {
        assert!(parse_script("").unwrap().steps.is_empty());
    }
}
