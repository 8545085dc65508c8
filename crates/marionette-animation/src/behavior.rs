//! Behavioral state machine
//!
//! One discrete state at a time, guarded by a transition table. Each state
//! carries procedural motion parameters; after a change the parameters blend
//! from the previous state's over a short window so breathing and sway never
//! jump. Time only moves through `update(dt)`.

use marionette_core::{MarionetteError, Result};
use marionette_runtime::{Countdown, EventBus, SubscriptionId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Default length of the parameter blend after a state change, in seconds
pub const DEFAULT_TRANSITION_DURATION: f64 = 0.3;
/// Emotional states fall back to idle after this many seconds
pub const EMOTIONAL_STATE_DURATION: f64 = 3.0;
const MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorState {
    Idle,
    Dragging,
    Sitting,
    SittingWindow,
    SittingTaskbar,
    Dancing,
    Sleeping,
    Speaking,
    Thinking,
    Happy,
    Sad,
    Excited,
    Embarrassed,
}

impl BehaviorState {
    pub const ALL: [BehaviorState; 13] = [
        BehaviorState::Idle,
        BehaviorState::Dragging,
        BehaviorState::Sitting,
        BehaviorState::SittingWindow,
        BehaviorState::SittingTaskbar,
        BehaviorState::Dancing,
        BehaviorState::Sleeping,
        BehaviorState::Speaking,
        BehaviorState::Thinking,
        BehaviorState::Happy,
        BehaviorState::Sad,
        BehaviorState::Excited,
        BehaviorState::Embarrassed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorState::Idle => "idle",
            BehaviorState::Dragging => "dragging",
            BehaviorState::Sitting => "sitting",
            BehaviorState::SittingWindow => "sitting_window",
            BehaviorState::SittingTaskbar => "sitting_taskbar",
            BehaviorState::Dancing => "dancing",
            BehaviorState::Sleeping => "sleeping",
            BehaviorState::Speaking => "speaking",
            BehaviorState::Thinking => "thinking",
            BehaviorState::Happy => "happy",
            BehaviorState::Sad => "sad",
            BehaviorState::Excited => "excited",
            BehaviorState::Embarrassed => "embarrassed",
        }
    }

    pub fn is_sitting(&self) -> bool {
        matches!(
            self,
            BehaviorState::Sitting | BehaviorState::SittingWindow | BehaviorState::SittingTaskbar
        )
    }

    /// Transient states that return to idle on their own
    pub fn is_emotional(&self) -> bool {
        matches!(
            self,
            BehaviorState::Happy
                | BehaviorState::Sad
                | BehaviorState::Excited
                | BehaviorState::Embarrassed
        )
    }

    pub fn params(&self) -> StateParams {
        use BehaviorState::*;
        let base = StateParams::default();
        match self {
            Idle => base,
            Dragging => StateParams {
                breathing_speed: 0.0,
                breathing_amplitude: 0.0,
                sway_speed: 0.0,
                sway_amplitude: 0.0,
                expression: "surprised",
                expression_weight: 0.6,
                float_speed: 3.0,
                float_amplitude: 0.02,
                ..base
            },
            Sitting => StateParams {
                breathing_speed: 1.2,
                breathing_amplitude: 0.008,
                sway_speed: 0.3,
                sway_amplitude: 0.002,
                expression: "relaxed",
                expression_weight: 0.5,
                ..base
            },
            SittingTaskbar => StateParams {
                leg_dangle: true,
                ..Sitting.params()
            },
            SittingWindow => StateParams {
                sway_speed: 0.4,
                sway_amplitude: 0.003,
                expression_weight: 0.4,
                leg_dangle: true,
                ..Sitting.params()
            },
            Dancing => StateParams {
                breathing_speed: 2.5,
                breathing_amplitude: 0.02,
                sway_speed: 0.0,
                sway_amplitude: 0.0,
                expression: "happy",
                expression_weight: 0.8,
                bounce_speed: 4.0,
                bounce_amplitude: 0.03,
                ..base
            },
            Sleeping => StateParams {
                breathing_speed: 0.8,
                breathing_amplitude: 0.015,
                sway_speed: 0.0,
                sway_amplitude: 0.0,
                expression: "blink",
                expression_weight: 1.0,
                head_tilt: -0.1,
                ..base
            },
            Speaking => StateParams {
                mouth_animation: true,
                ..base
            },
            Thinking => StateParams {
                breathing_speed: 1.2,
                sway_speed: 0.3,
                sway_amplitude: 0.002,
                expression_weight: 0.5,
                ..base
            },
            Happy => StateParams {
                breathing_speed: 1.8,
                breathing_amplitude: 0.012,
                sway_speed: 1.0,
                sway_amplitude: 0.005,
                expression: "happy",
                expression_weight: 0.9,
                ..base
            },
            Sad => StateParams {
                breathing_speed: 1.0,
                breathing_amplitude: 0.008,
                sway_speed: 0.2,
                sway_amplitude: 0.001,
                expression: "sad",
                expression_weight: 0.7,
                ..base
            },
            Excited => StateParams {
                breathing_speed: 2.0,
                breathing_amplitude: 0.015,
                sway_speed: 2.0,
                sway_amplitude: 0.008,
                expression: "happy",
                expression_weight: 1.0,
                ..base
            },
            Embarrassed => StateParams {
                expression: "embarrassed",
                expression_weight: 0.8,
                ..base
            },
        }
    }
}

impl fmt::Display for BehaviorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BehaviorState {
    type Err = MarionetteError;

    fn from_str(s: &str) -> Result<Self> {
        BehaviorState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| MarionetteError::ParseError(format!("unknown behavior state '{}'", s)))
    }
}

/// Procedural motion parameters for one behavior state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateParams {
    pub breathing_speed: f32,
    pub breathing_amplitude: f32,
    pub sway_speed: f32,
    pub sway_amplitude: f32,
    /// Default facial expression channel
    pub expression: &'static str,
    pub expression_weight: f32,
    pub leg_dangle: bool,
    pub mouth_animation: bool,
    /// Head pitch offset in radians
    pub head_tilt: f32,
    pub float_speed: f32,
    pub float_amplitude: f32,
    pub bounce_speed: f32,
    pub bounce_amplitude: f32,
}

impl Default for StateParams {
    /// The idle parameters
    fn default() -> Self {
        Self {
            breathing_speed: 1.5,
            breathing_amplitude: 0.01,
            sway_speed: 0.5,
            sway_amplitude: 0.003,
            expression: "neutral",
            expression_weight: 0.3,
            leg_dangle: false,
            mouth_animation: false,
            head_tilt: 0.0,
            float_speed: 0.0,
            float_amplitude: 0.0,
            bounce_speed: 0.0,
            bounce_amplitude: 0.0,
        }
    }
}

impl StateParams {
    /// Blend toward `to` at `progress` (0..1) with ease-in-out cubic.
    /// Numeric fields interpolate; the rest switch past the halfway mark.
    pub fn blend(&self, to: &StateParams, progress: f32) -> StateParams {
        let p = progress.clamp(0.0, 1.0);
        let t = ease_in_out_cubic(p);
        let lerp = |a: f32, b: f32| a + (b - a) * t;
        let late = p > 0.5;
        StateParams {
            breathing_speed: lerp(self.breathing_speed, to.breathing_speed),
            breathing_amplitude: lerp(self.breathing_amplitude, to.breathing_amplitude),
            sway_speed: lerp(self.sway_speed, to.sway_speed),
            sway_amplitude: lerp(self.sway_amplitude, to.sway_amplitude),
            expression: if late { to.expression } else { self.expression },
            expression_weight: lerp(self.expression_weight, to.expression_weight),
            leg_dangle: if late { to.leg_dangle } else { self.leg_dangle },
            mouth_animation: if late {
                to.mouth_animation
            } else {
                self.mouth_animation
            },
            head_tilt: lerp(self.head_tilt, to.head_tilt),
            float_speed: lerp(self.float_speed, to.float_speed),
            float_amplitude: lerp(self.float_amplitude, to.float_amplitude),
            bounce_speed: lerp(self.bounce_speed, to.bounce_speed),
            bounce_amplitude: lerp(self.bounce_amplitude, to.bounce_amplitude),
        }
    }
}

pub fn ease_in_out_cubic(t: f32) -> f32 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// Adjacency map of allowed state changes
#[derive(Debug, Clone)]
pub struct TransitionTable {
    edges: HashMap<BehaviorState, Vec<BehaviorState>>,
}

impl Default for TransitionTable {
    fn default() -> Self {
        use BehaviorState::*;
        let mut edges = HashMap::new();
        edges.insert(
            Idle,
            BehaviorState::ALL
                .iter()
                .copied()
                .filter(|s| *s != Idle)
                .collect(),
        );
        edges.insert(Dragging, vec![Idle, Sitting, SittingWindow, SittingTaskbar]);
        edges.insert(Sitting, vec![Idle, Dragging, Sleeping, Happy]);
        edges.insert(SittingWindow, vec![Idle, Dragging, Sleeping]);
        edges.insert(SittingTaskbar, vec![Idle, Dragging, Sleeping]);
        edges.insert(Dancing, vec![Idle]);
        edges.insert(Sleeping, vec![Idle, Dragging]);
        edges.insert(Happy, vec![Idle, Dragging]);
        edges.insert(Sad, vec![Idle, Dragging]);
        edges.insert(Excited, vec![Idle, Dragging]);
        edges.insert(Embarrassed, vec![Idle]);
        edges.insert(Thinking, vec![Idle, Speaking]);
        edges.insert(Speaking, vec![Idle, Thinking]);
        Self { edges }
    }
}

impl TransitionTable {
    pub fn allowed(&self, from: BehaviorState) -> &[BehaviorState] {
        self.edges.get(&from).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn allows(&self, from: BehaviorState, to: BehaviorState) -> bool {
        self.allowed(from).contains(&to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateEvent {
    StateChange {
        from: BehaviorState,
        to: BehaviorState,
    },
    TransitionComplete {
        state: BehaviorState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateChangeRecord {
    pub from: BehaviorState,
    pub to: BehaviorState,
    /// Machine time in seconds
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SetStateOptions {
    /// Skip the transition table check
    pub force: bool,
    /// Parameter blend length; defaults to `DEFAULT_TRANSITION_DURATION`
    pub duration: Option<f64>,
}

impl SetStateOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            duration: None,
        }
    }
}

pub struct BehaviorStateMachine {
    current: BehaviorState,
    previous: Option<BehaviorState>,
    table: TransitionTable,
    progress: f64,
    duration: f64,
    clock: f64,
    state_start: f64,
    auto_return: Countdown,
    history: VecDeque<StateChangeRecord>,
    events: EventBus<StateEvent>,
}

impl Default for BehaviorStateMachine {
    fn default() -> Self {
        Self::new(TransitionTable::default())
    }
}

impl BehaviorStateMachine {
    pub fn new(table: TransitionTable) -> Self {
        Self {
            current: BehaviorState::Idle,
            previous: None,
            table,
            progress: 1.0,
            duration: DEFAULT_TRANSITION_DURATION,
            clock: 0.0,
            state_start: 0.0,
            auto_return: Countdown::idle(),
            history: VecDeque::new(),
            events: EventBus::new(),
        }
    }

    pub fn state(&self) -> BehaviorState {
        self.current
    }

    pub fn previous(&self) -> Option<BehaviorState> {
        self.previous
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn transition_progress(&self) -> f64 {
        self.progress
    }

    pub fn can_transition_to(&self, target: BehaviorState) -> bool {
        self.table.allows(self.current, target)
    }

    pub fn is_sitting(&self) -> bool {
        self.current.is_sitting()
    }

    pub fn is_emotional(&self) -> bool {
        self.current.is_emotional()
    }

    pub fn is_awake(&self) -> bool {
        self.current != BehaviorState::Sleeping
    }

    /// Seconds since the last state change
    pub fn time_in_state(&self) -> f64 {
        self.clock - self.state_start
    }

    pub fn history(&self) -> impl Iterator<Item = &StateChangeRecord> {
        self.history.iter()
    }

    /// Change state. Returns false for a no-op or a rejected transition.
    pub fn set_state(&mut self, target: BehaviorState, options: SetStateOptions) -> bool {
        match self.try_set_state(target, options) {
            Ok(changed) => changed,
            Err(err) => {
                tracing::warn!("{}", err);
                false
            }
        }
    }

    /// Like `set_state`, but a disallowed transition is an `InvalidTransition` error
    pub fn try_set_state(&mut self, target: BehaviorState, options: SetStateOptions) -> Result<bool> {
        if target == self.current {
            return Ok(false);
        }
        if !options.force && !self.can_transition_to(target) {
            return Err(MarionetteError::InvalidTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            });
        }

        self.auto_return.cancel();

        self.history.push_back(StateChangeRecord {
            from: self.current,
            to: target,
            timestamp: self.clock,
        });
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }

        let from = self.current;
        self.previous = Some(from);
        self.current = target;
        self.state_start = self.clock;
        self.progress = 0.0;
        self.duration = options
            .duration
            .unwrap_or(DEFAULT_TRANSITION_DURATION)
            .max(0.0);

        self.events.publish(StateEvent::StateChange { from, to: target });

        if target.is_emotional() {
            self.auto_return.start(EMOTIONAL_STATE_DURATION);
        }

        tracing::debug!(%from, to = %target, "behavior state changed");
        Ok(true)
    }

    pub fn update(&mut self, dt: f64) {
        self.clock += dt;

        if self.progress < 1.0 {
            self.progress = if self.duration <= 0.0 {
                1.0
            } else {
                ((self.clock - self.state_start) / self.duration).min(1.0)
            };
            if self.progress >= 1.0 {
                self.events.publish(StateEvent::TransitionComplete {
                    state: self.current,
                });
            }
        }

        if self.auto_return.tick(dt) {
            self.set_state(BehaviorState::Idle, SetStateOptions::default());
        }
    }

    /// Current parameters, blended with the previous state's during a transition
    pub fn animation_params(&self) -> StateParams {
        let current = self.current.params();
        match self.previous {
            Some(previous) if self.progress < 1.0 => {
                previous.params().blend(&current, self.progress as f32)
            }
            _ => current,
        }
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&StateEvent) + 'static) -> SubscriptionId {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Events published since the last drain
    pub fn drain_events(&mut self) -> Vec<StateEvent> {
        self.events.drain()
    }

    /// Detach subscribers, drop history and timers, and return to idle
    pub fn dispose(&mut self) {
        self.auto_return.cancel();
        self.events.clear();
        self.history.clear();
        self.current = BehaviorState::Idle;
        self.previous = None;
        self.progress = 1.0;
        self.state_start = self.clock;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn machine() -> BehaviorStateMachine {
        BehaviorStateMachine::default()
    }

    #[test]
    fn starts_idle() {
        let m = machine();
        assert_eq!(m.state(), BehaviorState::Idle);
        assert!(m.is_awake());
        assert_eq!(m.transition_progress(), 1.0);
    }

    #[test]
    fn same_state_is_a_no_op() {
        let mut m = machine();
        assert!(!m.set_state(BehaviorState::Idle, SetStateOptions::default()));
        assert_eq!(m.history().count(), 0);
    }

    #[test]
    fn disallowed_transition_is_rejected() {
        let mut m = machine();
        assert!(m.set_state(BehaviorState::Dancing, SetStateOptions::default()));
        let err = m
            .try_set_state(BehaviorState::Sleeping, SetStateOptions::default())
            .unwrap_err();
        assert!(matches!(err, MarionetteError::InvalidTransition { .. }));
        assert_eq!(m.state(), BehaviorState::Dancing);

        assert!(m.set_state(BehaviorState::Sleeping, SetStateOptions::forced()));
        assert_eq!(m.state(), BehaviorState::Sleeping);
        assert!(!m.is_awake());
    }

    #[test]
    fn subscribers_see_changes_and_completion() {
        let mut m = machine();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let id = m.subscribe(move |e| sink.borrow_mut().push(*e));

        m.set_state(BehaviorState::Thinking, SetStateOptions::default());
        m.update(0.1);
        m.update(0.25);
        assert_eq!(
            *seen.borrow(),
            vec![
                StateEvent::StateChange {
                    from: BehaviorState::Idle,
                    to: BehaviorState::Thinking
                },
                StateEvent::TransitionComplete {
                    state: BehaviorState::Thinking
                },
            ]
        );

        assert!(m.unsubscribe(id));
        m.set_state(BehaviorState::Speaking, SetStateOptions::default());
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(m.drain_events().len(), 3);
    }

    #[test]
    fn emotional_state_returns_to_idle() {
        let mut m = machine();
        m.set_state(BehaviorState::Happy, SetStateOptions::default());
        assert!(m.is_emotional());
        for _ in 0..29 {
            m.update(0.1);
        }
        assert_eq!(m.state(), BehaviorState::Happy);
        assert!((m.time_in_state() - 2.9).abs() < 1e-9);
        m.update(0.11);
        assert_eq!(m.state(), BehaviorState::Idle);
        assert!(m.time_in_state() < 1e-9);
    }

    #[test]
    fn explicit_change_cancels_auto_return() {
        let mut m = machine();
        m.set_state(BehaviorState::Sad, SetStateOptions::default());
        m.update(1.0);
        m.set_state(BehaviorState::Dragging, SetStateOptions::default());
        m.update(5.0);
        assert_eq!(m.state(), BehaviorState::Dragging);
    }

    #[test]
    fn params_blend_during_transition() {
        let mut m = machine();
        m.set_state(BehaviorState::Dancing, SetStateOptions::default());
        let start = m.animation_params();
        assert!((start.breathing_speed - 1.5).abs() < 1e-6);
        assert_eq!(start.expression, "neutral");

        m.update(0.15);
        let mid = m.animation_params();
        assert!((mid.breathing_speed - 2.0).abs() < 1e-4);

        m.update(0.1);
        assert_eq!(m.animation_params().expression, "happy");

        m.update(1.0);
        assert_eq!(m.animation_params(), BehaviorState::Dancing.params());
    }

    #[test]
    fn history_is_bounded() {
        let mut m = machine();
        for _ in 0..40 {
            m.set_state(BehaviorState::Thinking, SetStateOptions::default());
            m.set_state(BehaviorState::Speaking, SetStateOptions::default());
        }
        assert_eq!(m.history().count(), 50);
    }

    #[test]
    fn dispose_resets_to_idle() {
        let mut m = machine();
        m.subscribe(|_| {});
        m.set_state(BehaviorState::Excited, SetStateOptions::default());
        m.dispose();
        m.dispose();
        assert_eq!(m.state(), BehaviorState::Idle);
        assert_eq!(m.history().count(), 0);
        m.update(10.0);
        assert_eq!(m.state(), BehaviorState::Idle);
    }

    #[test]
    fn state_names_parse() {
        for state in BehaviorState::ALL {
            assert_eq!(state.as_str().parse::<BehaviorState>().unwrap(), state);
        }
        assert!("flying".parse::<BehaviorState>().is_err());
    }

    fn any_state() -> impl Strategy<Value = BehaviorState> {
        prop::sample::select(BehaviorState::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn reachable_states_are_reported(target in any_state()) {
            let mut m = machine();
            if target != BehaviorState::Idle {
                prop_assert!(m.set_state(target, SetStateOptions::default()));
            }
            prop_assert_eq!(m.state(), target);
        }

        #[test]
        fn rejected_transitions_leave_state_unchanged(from in any_state(), to in any_state()) {
            let mut m = machine();
            m.set_state(from, SetStateOptions::forced());
            let allowed = m.can_transition_to(to);
            let changed = m.set_state(to, SetStateOptions::default());
            if !allowed {
                prop_assert!(!changed);
                prop_assert_eq!(m.state(), from);
            } else {
                prop_assert_eq!(m.state(), to);
            }
        }

        #[test]
        fn blended_params_stay_between_endpoints(from in any_state(), to in any_state(), p in 0.0f32..=1.0) {
            let a = from.params();
            let b = to.params();
            let mixed = a.blend(&b, p);
            let lo = a.breathing_speed.min(b.breathing_speed) - 1e-5;
            let hi = a.breathing_speed.max(b.breathing_speed) + 1e-5;
            prop_assert!(mixed.breathing_speed >= lo && mixed.breathing_speed <= hi);
        }
    }
}
