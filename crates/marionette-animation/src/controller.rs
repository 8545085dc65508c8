//! Avatar controller: one per avatar, owning every animation component
//!
//! Requests come in as behavior states, emotions, pointer input and speech
//! energy. `tick` advances everything once per frame and writes the result
//! (bone poses, expression weights, gaze) into the rig.

use crate::behavior::{BehaviorState, BehaviorStateMachine, SetStateOptions, StateEvent};
use crate::catalog::AnimationCatalog;
use crate::engine::{AnimationEngine, EmotionOptions, EmotionOutcome, EngineEvent, PlayStatus};
use crate::expression::{Blinker, LipSync, BLINK_CHANNEL};
use crate::loader::ClipSource;
use crate::procedural::{ProceduralMotion, ROOT_BONE};
use crate::skeleton::AvatarRig;
use marionette_core::{MarionetteError, Result};
use marionette_interaction::{DetectorConfig, InteractionDetector, InteractionEvent, InteractionKind};
use marionette_runtime::{EventBus, InteractionType, PointerInput, RuntimeSystem, SubscriptionId};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::rc::Rc;

/// Blend time for a state's default expression
const STATE_EXPRESSION_BLEND: f64 = 0.5;
/// Head pitch offset while an emotion asks to look up (degrees)
const LOOK_UP_PITCH_DEG: f32 = -15.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AvatarSnapshot {
    pub behavior_state: BehaviorState,
    pub current_clip: Option<String>,
    pub is_playing: bool,
    pub initialized: bool,
}

pub struct AvatarController {
    engine: AnimationEngine,
    behavior: BehaviorStateMachine,
    detector: InteractionDetector,
    blinker: Blinker,
    lips: LipSync,
    procedural: ProceduralMotion,
    rng: StdRng,
    interactions: EventBus<InteractionEvent>,
    /// Expression channels written last frame
    written: BTreeSet<String>,
    look_pitch: f32,
    initialized: bool,
}

impl AvatarController {
    pub fn new(catalog: AnimationCatalog, source: Rc<dyn ClipSource>) -> Self {
        let mut rng = match catalog.engine_config().seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        Self {
            blinker: Blinker::new(&mut rng),
            engine: AnimationEngine::new(catalog, source),
            behavior: BehaviorStateMachine::default(),
            detector: InteractionDetector::new(DetectorConfig::default()),
            lips: LipSync::new(),
            procedural: ProceduralMotion::new(),
            rng,
            interactions: EventBus::new(),
            written: BTreeSet::new(),
            look_pitch: 0.0,
            initialized: false,
        }
    }

    /// Seed every random choice for a reproducible run
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.engine = self.engine.with_seed(seed);
        self.rng = StdRng::seed_from_u64(seed.wrapping_add(1));
        self.blinker = Blinker::new(&mut self.rng);
        self
    }

    pub fn with_detector(mut self, config: DetectorConfig) -> Self {
        self.detector = InteractionDetector::new(config);
        self
    }

    pub fn engine(&self) -> &AnimationEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AnimationEngine {
        &mut self.engine
    }

    pub fn behavior(&self) -> &BehaviorStateMachine {
        &self.behavior
    }

    pub fn detector(&self) -> &InteractionDetector {
        &self.detector
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Start the idle clip and expression
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;
        let state = self.behavior.state();
        self.enter_state(state);
        tracing::info!(
            clips = self.engine.catalog().total_count(),
            state = %state,
            "avatar controller initialized"
        );
        Ok(())
    }

    /// Request a behavior state. Returns false when rejected or unchanged.
    pub fn set_state(&mut self, state: BehaviorState, options: SetStateOptions) -> bool {
        let changed = self.behavior.set_state(state, options);
        if changed {
            self.enter_state(state);
        }
        changed
    }

    fn enter_state(&mut self, state: BehaviorState) {
        let played = match state {
            BehaviorState::Dancing => self.engine.play_dance(None),
            _ => self.engine.play_for_state(state),
        };
        if let Err(err) = played {
            tracing::warn!(state = %state, "state clip failed: {}", err);
        }
        self.apply_state_expression(state);
    }

    fn apply_state_expression(&mut self, state: BehaviorState) {
        self.blinker.hold_closed(state == BehaviorState::Sleeping);
        let params = state.params();
        if params.expression != BLINK_CHANNEL {
            self.engine.expressions_mut().blend_to(
                params.expression,
                params.expression_weight,
                STATE_EXPRESSION_BLEND,
            );
        }
    }

    pub fn set_emotion(&mut self, emotion: &str) -> Result<EmotionOutcome> {
        let outcome = self.engine.set_emotion(emotion, EmotionOptions::default())?;
        self.look_pitch = if outcome.look_up {
            LOOK_UP_PITCH_DEG.to_radians()
        } else {
            0.0
        };
        Ok(outcome)
    }

    /// Enter the dancing state and play a dance. Fails with
    /// `InvalidTransition` when the current state cannot start dancing.
    pub fn play_dance(&mut self, name: Option<&str>) -> Result<PlayStatus> {
        let from = self.behavior.state();
        if from != BehaviorState::Dancing
            && !self
                .behavior
                .set_state(BehaviorState::Dancing, SetStateOptions::default())
        {
            return Err(MarionetteError::InvalidTransition {
                from: from.to_string(),
                to: BehaviorState::Dancing.to_string(),
            });
        }
        self.apply_state_expression(BehaviorState::Dancing);
        self.engine.play_dance(name)
    }

    /// Feed one pointer sample. Detected interactions go to subscribers and
    /// are returned; discrete inputs also trigger their one-shot clips.
    pub fn handle_pointer(&mut self, input: &PointerInput) -> Vec<InteractionEvent> {
        for event in self.detector.handle(input) {
            if event.kind == InteractionKind::Pat {
                self.set_state(BehaviorState::Happy, SetStateOptions::default());
            }
            self.interactions.publish(event);
        }

        if let Some(kind) = input.interaction() {
            self.handle_interaction(kind);
        }
        self.interactions.drain()
    }

    /// React to a discrete interaction with its mapped clip
    pub fn handle_interaction(&mut self, kind: InteractionType) {
        match kind {
            InteractionType::DragStart => {
                self.behavior
                    .set_state(BehaviorState::Dragging, SetStateOptions::default());
                self.apply_state_expression(BehaviorState::Dragging);
            }
            InteractionType::DragEnd => {
                self.behavior
                    .set_state(BehaviorState::Idle, SetStateOptions::default());
                self.apply_state_expression(BehaviorState::Idle);
            }
            _ => {}
        }
        match self.engine.handle_interaction(kind) {
            Ok(status) => tracing::debug!(interaction = %kind, ?status, "interaction handled"),
            Err(err) => tracing::warn!(interaction = %kind, "interaction clip failed: {}", err),
        }
    }

    /// Speech activity only moves the mouth; it never changes clips
    pub fn set_speech(&mut self, speaking: bool, energy: f32) {
        self.lips.set_speech(speaking, energy);
    }

    pub fn subscribe_interactions(
        &mut self,
        handler: impl FnMut(&InteractionEvent) + 'static,
    ) -> SubscriptionId {
        self.interactions.subscribe(handler)
    }

    pub fn unsubscribe_interactions(&mut self, id: SubscriptionId) -> bool {
        self.interactions.unsubscribe(id)
    }

    pub fn subscribe_state(&mut self, handler: impl FnMut(&StateEvent) + 'static) -> SubscriptionId {
        self.behavior.subscribe(handler)
    }

    /// Advance one frame and write the pose into `rig`
    pub fn tick(&mut self, rig: &mut dyn AvatarRig, dt: f64) -> Result<Vec<EngineEvent>> {
        if !self.initialized {
            return Err(MarionetteError::NotInitialized);
        }

        let before = self.behavior.state();
        self.behavior.update(dt);
        let after = self.behavior.state();
        if after != before {
            // Emotional states time out back to idle on their own
            self.enter_state(after);
        }
        self.behavior.drain_events();

        self.detector.update(dt);
        let events = self.engine.update(dt, after, rig);
        if events.contains(&EngineEvent::ReturnToIdle)
            && self
                .behavior
                .set_state(BehaviorState::Idle, SetStateOptions::default())
        {
            self.apply_state_expression(BehaviorState::Idle);
            self.behavior.drain_events();
        }

        self.blinker.update(dt, &mut self.rng);
        self.lips.update(dt);

        let state = self.behavior.state();
        let params = self.behavior.animation_params();
        let clip_driven = self.engine.mixer().drives_bone(ROOT_BONE);
        self.procedural.apply(rig, state, &params, dt, clip_driven);

        let head = self.detector.follow().head_rotation();
        rig.set_look_at(head.yaw, head.pitch + self.look_pitch);

        self.write_expressions(rig);
        Ok(events)
    }

    fn write_expressions(&mut self, rig: &mut dyn AvatarRig) {
        let mut written = BTreeSet::new();
        for (channel, weight) in self.engine.expressions().weights() {
            rig.set_expression_weight(channel, weight);
            written.insert(channel.to_string());
        }
        // Channels that faded out of the blender since last frame
        for stale in self.written.difference(&written) {
            rig.set_expression_weight(stale, 0.0);
        }
        self.written = written;

        rig.set_expression_weight(BLINK_CHANNEL, self.blinker.weight());
        for (channel, weight) in self.lips.weights() {
            rig.set_expression_weight(channel, weight);
        }
    }

    pub fn snapshot(&self) -> AvatarSnapshot {
        AvatarSnapshot {
            behavior_state: self.behavior.state(),
            current_clip: self.engine.current_clip().map(str::to_string),
            is_playing: self.engine.is_playing(),
            initialized: self.initialized,
        }
    }

    /// Stop playback, drop caches and subscribers, and return to the
    /// uninitialized idle state. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        let was_initialized = self.initialized;
        self.engine.dispose();
        self.behavior.dispose();
        self.detector.reset();
        self.interactions.clear();
        self.lips.reset();
        self.blinker.hold_closed(false);
        self.procedural.reset();
        self.written.clear();
        self.look_pitch = 0.0;
        self.initialized = false;
        if was_initialized {
            tracing::info!("avatar controller disposed");
        }
    }
}

impl RuntimeSystem<dyn AvatarRig> for AvatarController {
    fn initialize(&mut self, _rig: &mut (dyn AvatarRig + 'static)) -> Result<()> {
        AvatarController::initialize(self)
    }

    fn update(&mut self, rig: &mut (dyn AvatarRig + 'static), dt: f64) -> Result<()> {
        self.tick(rig, dt).map(|_| ())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.dispose();
        Ok(())
    }

    fn name(&self) -> &str {
        "avatar"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::SyntheticClipSource;
    use crate::skeleton::MemoryRig;
    use marionette_core::Vec2;
    use std::cell::RefCell;

    fn controller() -> AvatarController {
        let catalog = AnimationCatalog::builtin().unwrap();
        let mut c = AvatarController::new(catalog, Rc::new(SyntheticClipSource)).with_seed(5);
        c.initialize().unwrap();
        c
    }

    fn run(c: &mut AvatarController, rig: &mut MemoryRig, seconds: f64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        for _ in 0..(seconds * 60.0).round() as usize {
            events.extend(c.tick(rig, 1.0 / 60.0).unwrap());
        }
        events
    }

    #[test]
    fn tick_requires_initialize() {
        let catalog = AnimationCatalog::builtin().unwrap();
        let mut c = AvatarController::new(catalog, Rc::new(SyntheticClipSource));
        let mut rig = MemoryRig::humanoid();
        assert!(matches!(
            c.tick(&mut rig, 0.1),
            Err(MarionetteError::NotInitialized)
        ));
    }

    #[test]
    fn initialize_plays_idle_clip() {
        let c = controller();
        let snap = c.snapshot();
        assert_eq!(snap.behavior_state, BehaviorState::Idle);
        assert_eq!(snap.current_clip.as_deref(), Some("motion_pose"));
        assert!(snap.is_playing);
        assert!(snap.initialized);
    }

    #[test]
    fn rejected_state_keeps_clip() {
        let mut c = controller();
        assert!(c.set_state(BehaviorState::Dancing, SetStateOptions::default()));
        assert!(!c.set_state(BehaviorState::Sleeping, SetStateOptions::default()));
        assert_eq!(c.snapshot().behavior_state, BehaviorState::Dancing);
        assert_eq!(c.snapshot().current_clip.as_deref(), Some("spin"));
    }

    #[test]
    fn emotional_state_times_out_to_idle_clip() {
        let mut c = controller();
        let mut rig = MemoryRig::humanoid();
        c.set_state(BehaviorState::Excited, SetStateOptions::default());
        run(&mut c, &mut rig, 3.5);
        let snap = c.snapshot();
        assert_eq!(snap.behavior_state, BehaviorState::Idle);
        assert_eq!(snap.current_clip.as_deref(), Some("motion_pose"));
    }

    #[test]
    fn drag_enters_and_leaves_dragging() {
        let mut c = controller();
        let mut rig = MemoryRig::humanoid();
        c.handle_pointer(&PointerInput::DragStart {
            position: Vec2::new(0.5, 0.5),
        });
        assert_eq!(c.snapshot().behavior_state, BehaviorState::Dragging);
        assert_eq!(c.snapshot().current_clip.as_deref(), Some("model_pose"));
        run(&mut c, &mut rig, 1.0);

        c.handle_pointer(&PointerInput::DragEnd {
            position: Vec2::new(0.5, 0.5),
        });
        assert_eq!(c.snapshot().behavior_state, BehaviorState::Idle);
        run(&mut c, &mut rig, 6.0);
        assert_eq!(c.snapshot().current_clip.as_deref(), Some("motion_pose"));
    }

    #[test]
    fn interaction_events_reach_subscribers() {
        let mut c = controller();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let id = c.subscribe_interactions(move |e| sink.borrow_mut().push(e.kind));

        let events = c.handle_pointer(&PointerInput::Click {
            position: Vec2::new(0.5, 0.24),
        });
        assert!(events.iter().any(|e| e.kind == InteractionKind::Touch));
        assert_eq!(seen.borrow().len(), events.len());
        assert_eq!(c.snapshot().current_clip.as_deref(), Some("greeting"));

        assert!(c.unsubscribe_interactions(id));
        c.handle_pointer(&PointerInput::Leave);
        c.handle_pointer(&PointerInput::Move {
            position: Vec2::new(0.5, 0.24),
        });
        assert_eq!(seen.borrow().len(), events.len());
    }

    #[test]
    fn speech_drives_mouth_only() {
        let mut c = controller();
        let mut rig = MemoryRig::humanoid();
        let before = c.snapshot();
        c.set_speech(true, 0.4);
        run(&mut c, &mut rig, 0.5);
        assert!(rig.expression("aa") > 0.2);
        assert_eq!(c.snapshot().current_clip, before.current_clip);
        assert_eq!(c.snapshot().behavior_state, BehaviorState::Idle);

        c.set_speech(false, 0.0);
        run(&mut c, &mut rig, 1.0);
        assert!(rig.expression("aa") < 0.01);
    }

    #[test]
    fn dance_is_refused_while_sleeping() {
        let mut c = controller();
        let mut rig = MemoryRig::humanoid();
        c.set_state(BehaviorState::Sleeping, SetStateOptions::default());
        assert!(matches!(
            c.play_dance(None),
            Err(MarionetteError::InvalidTransition { .. })
        ));
        run(&mut c, &mut rig, 0.5);
        let snap = c.snapshot();
        assert_eq!(snap.behavior_state, BehaviorState::Sleeping);
        assert_eq!(snap.current_clip.as_deref(), Some("sit"));
        assert_eq!(rig.expression(BLINK_CHANNEL), 1.0);
    }

    #[test]
    fn play_dance_switches_dances_while_dancing() {
        let mut c = controller();
        assert_eq!(c.play_dance(Some("spin")).unwrap(), PlayStatus::Started);
        assert_eq!(c.snapshot().behavior_state, BehaviorState::Dancing);
        c.play_dance(None).unwrap();
        assert_eq!(c.snapshot().behavior_state, BehaviorState::Dancing);
        assert!(c.snapshot().current_clip.is_some());
    }

    #[test]
    fn drag_start_clip_returns_to_idle_on_its_own() {
        let mut c = controller();
        let mut rig = MemoryRig::humanoid();
        c.handle_pointer(&PointerInput::DragStart {
            position: Vec2::new(0.5, 0.5),
        });
        assert!(!c.engine().mixer().current().unwrap().is_looping());
        let events = run(&mut c, &mut rig, 6.0);
        assert!(events.contains(&EngineEvent::ReturnToIdle));
        assert_eq!(c.snapshot().behavior_state, BehaviorState::Idle);
        assert_eq!(c.snapshot().current_clip.as_deref(), Some("motion_pose"));
    }

    #[test]
    fn sleeping_holds_eyes_closed() {
        let mut c = controller();
        let mut rig = MemoryRig::humanoid();
        c.set_state(BehaviorState::Sleeping, SetStateOptions::default());
        run(&mut c, &mut rig, 0.5);
        assert_eq!(rig.expression(BLINK_CHANNEL), 1.0);
        assert_eq!(c.snapshot().current_clip.as_deref(), Some("sit"));
    }

    #[test]
    fn look_up_emotion_raises_gaze() {
        let mut c = controller();
        let mut rig = MemoryRig::humanoid();
        let outcome = c.set_emotion("thinking").unwrap();
        assert!(outcome.look_up);
        run(&mut c, &mut rig, 0.1);
        let (_, pitch) = rig.look_at();
        assert!(pitch < -0.2);
    }

    #[test]
    fn faded_channels_are_zeroed_on_the_rig() {
        let mut c = controller();
        let mut rig = MemoryRig::humanoid();
        run(&mut c, &mut rig, 1.0);
        assert!(rig.expression("neutral") > 0.2);
        c.set_emotion("sad").unwrap();
        run(&mut c, &mut rig, 2.5);
        assert_eq!(rig.expression("neutral"), 0.0);
        assert!((rig.expression("sad") - 0.7).abs() < 1e-3);
    }

    #[test]
    fn runs_as_runtime_system() {
        let catalog = AnimationCatalog::builtin().unwrap();
        let mut system: Box<dyn RuntimeSystem<dyn AvatarRig>> =
            Box::new(AvatarController::new(catalog, Rc::new(SyntheticClipSource)));
        let mut rig = MemoryRig::humanoid();
        system.initialize(&mut rig).unwrap();
        system.update(&mut rig, 1.0 / 60.0).unwrap();
        assert_eq!(system.name(), "avatar");
        system.shutdown().unwrap();
        system.shutdown().unwrap();
    }
}
