//! Procedural body motion layered over the mixed clip pose
//!
//! Breathing and sway apply in every state. Bounce, float and the sleeping
//! head tilt only apply in their own state. The result is a lift along Y and
//! a roll around Z on the root bone.

use crate::behavior::{BehaviorState, StateParams};
use crate::blend::additive;
use crate::skeleton::{AvatarRig, JointPose};
use marionette_core::Vec3;

/// Bone the offsets are applied to
pub const ROOT_BONE: &str = "hips";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProceduralOffsets {
    /// Vertical offset in meters
    pub lift: f32,
    /// Roll in radians
    pub roll: f32,
}

impl ProceduralOffsets {
    pub fn as_pose(&self) -> JointPose {
        JointPose {
            translation: [0.0, self.lift, 0.0],
            ..JointPose::from_euler(Vec3::new(0.0, 0.0, self.roll))
        }
    }
}

/// Offsets for `state` at time `t` seconds
pub fn offsets(state: BehaviorState, params: &StateParams, t: f64) -> ProceduralOffsets {
    let t = t as f32;
    let mut lift = 0.0;
    let mut roll = 0.0;

    if params.breathing_speed > 0.0 {
        lift += (t * params.breathing_speed).sin() * params.breathing_amplitude;
    }
    if params.sway_speed > 0.0 {
        roll += (t * params.sway_speed).sin() * params.sway_amplitude;
    }
    if state == BehaviorState::Dancing && params.bounce_speed > 0.0 {
        lift += (t * params.bounce_speed).sin().abs() * params.bounce_amplitude;
    }
    if state == BehaviorState::Dragging && params.float_speed > 0.0 {
        lift += (t * params.float_speed).sin() * params.float_amplitude;
    }
    if state == BehaviorState::Sleeping && params.head_tilt != 0.0 {
        roll = params.head_tilt;
    }
    ProceduralOffsets { lift, roll }
}

#[derive(Debug, Default)]
pub struct ProceduralMotion {
    elapsed: f64,
    /// Root pose when no clip drives it, captured on first use
    rest: Option<JointPose>,
    last: ProceduralOffsets,
}

impl ProceduralMotion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn last_offsets(&self) -> ProceduralOffsets {
        self.last
    }

    /// Advance time and layer the offsets onto the root bone.
    ///
    /// When `clip_driven` is true the mixer already wrote the root this frame,
    /// so the offsets go on top of that pose. Otherwise they go on top of the
    /// captured rest pose, which keeps them from accumulating frame to frame.
    pub fn apply(
        &mut self,
        rig: &mut dyn AvatarRig,
        state: BehaviorState,
        params: &StateParams,
        dt: f64,
        clip_driven: bool,
    ) {
        self.elapsed += dt;
        self.last = offsets(state, params, self.elapsed);
        let Some(node) = rig.bone_node(ROOT_BONE) else {
            return;
        };
        let base = if clip_driven {
            *node
        } else {
            *self.rest.get_or_insert(*node)
        };
        *node = additive(&base, &self.last.as_pose(), 1.0);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
