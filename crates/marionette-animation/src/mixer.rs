//! Playback actions and the crossfading mixer
//!
//! At most two actions carry weight: the current one and, during a transition,
//! the outgoing one. A crossfade drives both weights from one progress value,
//! so `outgoing + current == 1` at every instant.

use crate::blend::PoseAccumulator;
use crate::cache::LoadedClip;
use crate::sampler::{sample_clip, TrackValue};
use crate::skeleton::{AvatarRig, JointPose};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Play once and hold the last frame
    Once,
    Repeat,
}

/// One clip being played
#[derive(Debug, Clone)]
pub struct PlaybackAction {
    pub clip: Rc<LoadedClip>,
    /// Local time in seconds
    pub time: f64,
    pub weight: f32,
    pub time_scale: f64,
    pub loop_mode: LoopMode,
    /// False once a `Once` action reaches its end
    pub running: bool,
    pub paused: bool,
}

impl PlaybackAction {
    pub fn new(clip: Rc<LoadedClip>, loop_mode: LoopMode, time_scale: f64) -> Self {
        Self {
            clip,
            time: 0.0,
            weight: 0.0,
            time_scale,
            loop_mode,
            running: true,
            paused: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.clip.name
    }

    pub fn is_running(&self) -> bool {
        self.running && !self.paused
    }

    pub fn is_looping(&self) -> bool {
        self.loop_mode == LoopMode::Repeat
    }

    /// Advance local time. Returns true on the tick a `Once` action finishes.
    fn advance(&mut self, dt: f64) -> bool {
        if !self.is_running() {
            return false;
        }
        let duration = self.clip.runtime_duration;
        self.time += dt * self.time_scale;

        match self.loop_mode {
            LoopMode::Repeat => {
                if duration > 0.0 {
                    self.time = self.time.rem_euclid(duration);
                }
                false
            }
            LoopMode::Once => {
                if self.time >= duration {
                    self.time = duration;
                    self.running = false;
                    true
                } else if self.time < 0.0 {
                    self.time = 0.0;
                    self.running = false;
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TransitionKind {
    Crossfade,
    FadeIn,
    /// Fade the outgoing action from this weight to 0
    FadeOut(f32),
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    kind: TransitionKind,
    elapsed: f64,
    duration: f64,
}

impl Transition {
    fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0) as f32
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MixerEvent {
    /// A `Once` action reached its end
    Finished(String),
}

#[derive(Debug, Default)]
pub struct Mixer {
    current: Option<PlaybackAction>,
    outgoing: Option<PlaybackAction>,
    transition: Option<Transition>,
    /// Each bone's pose before the mixer first wrote it
    bind_pose: HashMap<String, JointPose>,
    driven: HashSet<String>,
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&PlaybackAction> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut PlaybackAction> {
        self.current.as_mut()
    }

    pub fn outgoing(&self) -> Option<&PlaybackAction> {
        self.outgoing.as_ref()
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    /// (outgoing, current) weights
    pub fn weights(&self) -> (Option<f32>, Option<f32>) {
        (
            self.outgoing.as_ref().map(|a| a.weight),
            self.current.as_ref().map(|a| a.weight),
        )
    }

    /// Crossfade from the current action to `action` over `duration` seconds.
    /// Falls back to a plain fade-in when nothing is running.
    pub fn crossfade_to(&mut self, mut action: PlaybackAction, duration: f64) {
        let Some(mut previous) = self.current.take().filter(|a| a.is_running()) else {
            self.fade_in(action, duration);
            return;
        };
        // An interrupted transition loses its older outgoing action
        previous.weight = 1.0;
        action.weight = 0.0;
        self.outgoing = Some(previous);
        self.current = Some(action);
        self.transition = Some(Transition {
            kind: TransitionKind::Crossfade,
            elapsed: 0.0,
            duration,
        });
        self.apply_transition_weights();
    }

    /// Start `action` from weight 0, dropping anything else
    pub fn fade_in(&mut self, mut action: PlaybackAction, duration: f64) {
        action.weight = 0.0;
        self.outgoing = None;
        self.current = Some(action);
        self.transition = Some(Transition {
            kind: TransitionKind::FadeIn,
            elapsed: 0.0,
            duration,
        });
        self.apply_transition_weights();
    }

    /// Fade the current action out; it is dropped once its weight reaches 0.
    pub fn fade_out(&mut self, duration: f64) {
        let Some(action) = self.current.take() else {
            return;
        };
        let start = action.weight;
        self.outgoing = Some(action);
        self.transition = Some(Transition {
            kind: TransitionKind::FadeOut(start),
            elapsed: 0.0,
            duration,
        });
        self.apply_transition_weights();
    }

    pub fn stop_all(&mut self) {
        self.current = None;
        self.outgoing = None;
        self.transition = None;
        self.driven.clear();
    }

    /// Forget captured bind poses, e.g. after the rig changed
    pub fn reset_bindings(&mut self) {
        self.bind_pose.clear();
    }

    /// Advance actions and transition weights by `dt`
    pub fn advance(&mut self, dt: f64) -> Vec<MixerEvent> {
        let mut events = Vec::new();
        for action in self.current.iter_mut().chain(self.outgoing.iter_mut()) {
            if action.advance(dt) {
                events.push(MixerEvent::Finished(action.name().to_string()));
            }
        }

        if let Some(transition) = self.transition.as_mut() {
            transition.elapsed += dt;
        }
        self.apply_transition_weights();
        events
    }

    fn apply_transition_weights(&mut self) {
        let Some(transition) = self.transition else {
            return;
        };
        let p = transition.progress();
        match transition.kind {
            TransitionKind::Crossfade => {
                if let Some(out) = self.outgoing.as_mut() {
                    out.weight = 1.0 - p;
                }
                if let Some(cur) = self.current.as_mut() {
                    cur.weight = p;
                }
            }
            TransitionKind::FadeIn => {
                if let Some(cur) = self.current.as_mut() {
                    cur.weight = p;
                }
            }
            TransitionKind::FadeOut(start) => {
                if let Some(out) = self.outgoing.as_mut() {
                    out.weight = start * (1.0 - p);
                }
            }
        }
        if p >= 1.0 {
            self.outgoing = None;
            self.transition = None;
        }
    }

    /// Whether the last `apply` wrote this bone
    pub fn drives_bone(&self, bone: &str) -> bool {
        self.driven.contains(bone)
    }

    /// Sample every action and write the blended pose into the rig.
    /// Tracks whose bone the rig lacks are skipped.
    pub fn apply(&mut self, rig: &mut dyn AvatarRig) {
        self.driven.clear();
        let mut accumulators: BTreeMap<&str, PoseAccumulator> = BTreeMap::new();

        for action in self.current.iter().chain(self.outgoing.iter()) {
            let weight = action.weight.max(0.0);
            for (bone, value) in sample_clip(&action.clip.clip, action.time) {
                let acc = accumulators.entry(bone).or_default();
                match value {
                    TrackValue::Translation(v) => acc.add_translation(v, weight),
                    TrackValue::Rotation(q) => acc.add_rotation(q, weight),
                    TrackValue::Scale(s) => acc.add_scale(s, weight),
                }
            }
        }

        for (bone, acc) in accumulators {
            let Some(node) = rig.bone_node(bone) else {
                continue;
            };
            let base = *self
                .bind_pose
                .entry(bone.to_string())
                .or_insert(*node);
            *node = acc.resolve(&base);
            self.driven.insert(bone.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{BoneTrack, Interpolation, JointKeyframe, JointProperty, SkeletalClip};
    use crate::skeleton::MemoryRig;
    use proptest::prelude::*;

    fn loaded(name: &str, duration: f64, x: f32) -> Rc<LoadedClip> {
        Rc::new(LoadedClip {
            name: name.into(),
            runtime_duration: duration,
            clip: SkeletalClip {
                name: name.into(),
                duration,
                tracks: vec![
                    BoneTrack {
                        bone: "hips".into(),
                        property: JointProperty::Translation,
                        interpolation: Interpolation::Linear,
                        keyframes: vec![JointKeyframe::new(0.0, vec![x, 0.0, 0.0])],
                    },
                    BoneTrack {
                        bone: "tail".into(),
                        property: JointProperty::Translation,
                        interpolation: Interpolation::Linear,
                        keyframes: vec![JointKeyframe::new(0.0, vec![1.0, 1.0, 1.0])],
                    },
                ],
            },
        })
    }

    fn action(name: &str, x: f32, mode: LoopMode) -> PlaybackAction {
        PlaybackAction::new(loaded(name, 2.0, x), mode, 1.0)
    }

    #[test]
    fn fade_in_from_nothing() {
        let mut mixer = Mixer::new();
        mixer.crossfade_to(action("a", 1.0, LoopMode::Repeat), 0.5);
        assert_eq!(mixer.weights(), (None, Some(0.0)));
        mixer.advance(0.25);
        assert!((mixer.weights().1.unwrap() - 0.5).abs() < 1e-6);
        mixer.advance(0.25);
        assert_eq!(mixer.weights(), (None, Some(1.0)));
        assert!(!mixer.is_transitioning());
    }

    #[test]
    fn crossfade_weights_sum_to_one() {
        let mut mixer = Mixer::new();
        mixer.fade_in(action("a", 1.0, LoopMode::Repeat), 0.0);
        mixer.crossfade_to(action("b", 2.0, LoopMode::Repeat), 1.0);
        assert_eq!(mixer.weights(), (Some(1.0), Some(0.0)));
        for _ in 0..9 {
            mixer.advance(0.1);
            let (out, cur) = mixer.weights();
            assert!((out.unwrap() + cur.unwrap() - 1.0).abs() < 1e-5);
        }
        mixer.advance(0.2);
        assert_eq!(mixer.weights(), (None, Some(1.0)));
        assert_eq!(mixer.current().unwrap().name(), "b");
    }

    #[test]
    fn interrupted_crossfade_drops_older_outgoing() {
        let mut mixer = Mixer::new();
        mixer.fade_in(action("a", 0.0, LoopMode::Repeat), 0.0);
        mixer.crossfade_to(action("b", 0.0, LoopMode::Repeat), 1.0);
        mixer.advance(0.5);
        mixer.crossfade_to(action("c", 0.0, LoopMode::Repeat), 1.0);
        assert_eq!(mixer.outgoing().unwrap().name(), "b");
        assert_eq!(mixer.current().unwrap().name(), "c");
        let (out, cur) = mixer.weights();
        assert!((out.unwrap() + cur.unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn once_action_finishes_and_holds() {
        let mut mixer = Mixer::new();
        mixer.fade_in(action("wave", 0.0, LoopMode::Once), 0.0);
        assert!(mixer.advance(1.5).is_empty());
        let events = mixer.advance(1.0);
        assert_eq!(events, vec![MixerEvent::Finished("wave".into())]);
        let current = mixer.current().unwrap();
        assert!(!current.is_running());
        assert_eq!(current.time, 2.0);
        assert_eq!(current.weight, 1.0);
    }

    #[test]
    fn repeat_action_wraps() {
        let mut mixer = Mixer::new();
        mixer.fade_in(action("loop", 0.0, LoopMode::Repeat), 0.0);
        mixer.advance(2.5);
        assert!((mixer.current().unwrap().time - 0.5).abs() < 1e-9);
        assert!(mixer.current().unwrap().is_running());
    }

    #[test]
    fn paused_action_keeps_time() {
        let mut mixer = Mixer::new();
        mixer.fade_in(action("loop", 0.0, LoopMode::Repeat), 0.0);
        mixer.current_mut().unwrap().paused = true;
        mixer.advance(1.0);
        assert_eq!(mixer.current().unwrap().time, 0.0);
    }

    #[test]
    fn fade_out_clears_current() {
        let mut mixer = Mixer::new();
        mixer.fade_in(action("a", 0.0, LoopMode::Repeat), 0.0);
        mixer.fade_out(0.5);
        assert!(mixer.current().is_none());
        mixer.advance(0.25);
        assert!((mixer.weights().0.unwrap() - 0.5).abs() < 1e-6);
        mixer.advance(0.5);
        assert_eq!(mixer.weights(), (None, None));
    }

    #[test]
    fn apply_blends_and_skips_missing_bones() {
        let mut rig = MemoryRig::with_bones(["hips"]);
        let mut mixer = Mixer::new();
        mixer.fade_in(action("a", 2.0, LoopMode::Repeat), 0.0);
        mixer.crossfade_to(action("b", 4.0, LoopMode::Repeat), 1.0);
        mixer.advance(0.5);
        mixer.apply(&mut rig);
        assert!((rig.bone("hips").unwrap().translation[0] - 3.0).abs() < 1e-5);
        assert!(mixer.drives_bone("hips"));
        assert!(!mixer.drives_bone("tail"));
    }

    #[test]
    fn fade_in_starts_from_bind_pose() {
        let mut rig = MemoryRig::with_bones(["hips"]);
        let mut mixer = Mixer::new();
        mixer.fade_in(action("a", 4.0, LoopMode::Repeat), 1.0);
        mixer.advance(0.25);
        mixer.apply(&mut rig);
        assert!((rig.bone("hips").unwrap().translation[0] - 1.0).abs() < 1e-5);
        mixer.advance(0.25);
        mixer.apply(&mut rig);
        assert!((rig.bone("hips").unwrap().translation[0] - 2.0).abs() < 1e-5);
    }

    proptest! {
        #[test]
        fn crossfade_sum_holds_at_any_instant(duration in 0.05f64..3.0, steps in prop::collection::vec(0.0f64..0.5, 1..20)) {
            let mut mixer = Mixer::new();
            mixer.fade_in(action("a", 0.0, LoopMode::Repeat), 0.0);
            mixer.crossfade_to(action("b", 0.0, LoopMode::Repeat), duration);
            for dt in steps {
                mixer.advance(dt);
                let (out, cur) = mixer.weights();
                let total = out.unwrap_or(0.0) + cur.unwrap_or(0.0);
                prop_assert!((total - 1.0).abs() < 1e-5);
            }
        }
    }
}
