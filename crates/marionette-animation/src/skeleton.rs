//! Humanoid skeleton contract and an in-memory rig
//!
//! The renderer owns the real skeleton. The animation side only needs to look
//! bones up by humanoid name and write local poses and expression weights, so
//! that is all `AvatarRig` asks for.

use marionette_core::Vec3;
use std::collections::{BTreeMap, HashMap};

/// A single joint's local-space pose (translation, rotation, scale)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointPose {
    pub translation: [f32; 3],
    pub rotation: [f32; 4], // quaternion xyzw
    pub scale: [f32; 3],
}

impl Default for JointPose {
    fn default() -> Self {
        Self {
            translation: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0, 1.0, 1.0],
        }
    }
}

impl JointPose {
    pub fn from_rotation(rotation: [f32; 4]) -> Self {
        Self {
            rotation,
            ..Default::default()
        }
    }

    pub fn from_euler(euler: Vec3) -> Self {
        Self::from_rotation(euler.euler_to_quat())
    }
}

/// The skeleton handle the animation system drives
pub trait AvatarRig {
    /// Mutable access to a bone's local pose. `None` when the model lacks the bone.
    fn bone_node(&mut self, bone: &str) -> Option<&mut JointPose>;

    /// Set a facial expression weight in 0..1
    fn set_expression_weight(&mut self, name: &str, value: f32);

    /// Point the eyes/head, in radians
    fn set_look_at(&mut self, _yaw: f32, _pitch: f32) {}
}

/// Standard humanoid bone names
pub const HUMANOID_BONES: [&str; 21] = [
    "hips",
    "spine",
    "chest",
    "upperChest",
    "neck",
    "head",
    "leftShoulder",
    "leftUpperArm",
    "leftLowerArm",
    "leftHand",
    "rightShoulder",
    "rightUpperArm",
    "rightLowerArm",
    "rightHand",
    "leftUpperLeg",
    "leftLowerLeg",
    "leftFoot",
    "rightUpperLeg",
    "rightLowerLeg",
    "rightFoot",
    "jaw",
];

/// Relaxed standing pose (XYZ Euler, radians): arms lowered to the sides with a
/// slight elbow bend, neutral hands, spine and head.
pub fn natural_rest_pose() -> [(&'static str, Vec3); 8] {
    [
        ("leftUpperArm", Vec3::new(0.1, 0.0, 1.2)),
        ("rightUpperArm", Vec3::new(0.1, 0.0, -1.2)),
        ("leftLowerArm", Vec3::new(0.1, 0.0, 0.0)),
        ("rightLowerArm", Vec3::new(0.1, 0.0, 0.0)),
        ("leftHand", Vec3::ZERO),
        ("rightHand", Vec3::ZERO),
        ("spine", Vec3::ZERO),
        ("head", Vec3::ZERO),
    ]
}

/// Write the rest pose's rotations into the rig. Returns how many bones were set.
pub fn apply_rest_pose(rig: &mut dyn AvatarRig) -> usize {
    let mut applied = 0;
    for (bone, euler) in natural_rest_pose() {
        if let Some(node) = rig.bone_node(bone) {
            node.rotation = euler.euler_to_quat();
            applied += 1;
        }
    }
    applied
}

/// A rig held entirely in memory. Used headless and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryRig {
    bones: HashMap<String, JointPose>,
    expressions: BTreeMap<String, f32>,
    look_at: (f32, f32),
}

impl MemoryRig {
    /// A rig with every standard humanoid bone at identity
    pub fn humanoid() -> Self {
        Self::with_bones(HUMANOID_BONES)
    }

    pub fn with_bones<'a>(bones: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            bones: bones
                .into_iter()
                .map(|b| (b.to_string(), JointPose::default()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn bone(&self, bone: &str) -> Option<&JointPose> {
        self.bones.get(bone)
    }

    pub fn has_bone(&self, bone: &str) -> bool {
        self.bones.contains_key(bone)
    }

    pub fn expression(&self, name: &str) -> f32 {
        self.expressions.get(name).copied().unwrap_or(0.0)
    }

    pub fn expressions(&self) -> &BTreeMap<String, f32> {
        &self.expressions
    }

    /// Last (yaw, pitch) passed to `set_look_at`
    pub fn look_at(&self) -> (f32, f32) {
        self.look_at
    }
}

impl AvatarRig for MemoryRig {
    fn bone_node(&mut self, bone: &str) -> Option<&mut JointPose> {
        self.bones.get_mut(bone)
    }

    fn set_expression_weight(&mut self, name: &str, value: f32) {
        self.expressions
            .insert(name.to_string(), value.clamp(0.0, 1.0));
    }

    fn set_look_at(&mut self, yaw: f32, pitch: f32) {
        self.look_at = (yaw, pitch);
    }
}
