//! Pose blending utilities
//!
//! Weighted blending of single joint poses, additive layering of procedural
//! offsets, and the accumulator the mixer uses to combine every weighted
//! action's contribution to one bone.

use crate::skeleton::JointPose;

/// Blend two joint poses. `weight` of 0.0 = fully `a`, 1.0 = fully `b`.
///
/// Translation and scale lerp; rotation slerps.
pub fn blend_pose(a: &JointPose, b: &JointPose, weight: f32) -> JointPose {
    let w = weight.clamp(0.0, 1.0);
    JointPose {
        translation: lerp3(&a.translation, &b.translation, w),
        rotation: quat_slerp(&a.rotation, &b.rotation, w),
        scale: lerp3(&a.scale, &b.scale, w),
    }
}

/// Layer a delta pose (relative to identity) onto a base pose.
///
/// Translation adds, scale multiplies, rotation composes as `base * slerp(identity, delta, weight)`.
pub fn additive(base: &JointPose, delta: &JointPose, weight: f32) -> JointPose {
    let w = weight.clamp(0.0, 1.0);
    let identity = [0.0, 0.0, 0.0, 1.0];
    let weighted = quat_slerp(&identity, &delta.rotation, w);
    JointPose {
        translation: [
            base.translation[0] + delta.translation[0] * w,
            base.translation[1] + delta.translation[1] * w,
            base.translation[2] + delta.translation[2] * w,
        ],
        rotation: quat_normalize(&quat_mul(&base.rotation, &weighted)),
        scale: [
            base.scale[0] * (1.0 + (delta.scale[0] - 1.0) * w),
            base.scale[1] * (1.0 + (delta.scale[1] - 1.0) * w),
            base.scale[2] * (1.0 + (delta.scale[2] - 1.0) * w),
        ],
    }
}

/// Running weighted blend of one bone property across several actions.
///
/// Each `add` folds a sample in with weight `w / (accumulated + w)`, so the
/// result is the weighted average regardless of order. When the total weight
/// is below 1 the remainder is taken from the bone's base value.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseAccumulator {
    translation: Option<([f32; 3], f32)>,
    rotation: Option<([f32; 4], f32)>,
    scale: Option<([f32; 3], f32)>,
}

impl PoseAccumulator {
    pub fn add_translation(&mut self, value: [f32; 3], weight: f32) {
        self.translation = Some(fold_vec3(self.translation, value, weight));
    }

    pub fn add_scale(&mut self, value: [f32; 3], weight: f32) {
        self.scale = Some(fold_vec3(self.scale, value, weight));
    }

    pub fn add_rotation(&mut self, value: [f32; 4], weight: f32) {
        self.rotation = Some(match self.rotation {
            None => (value, weight),
            Some((acc, total)) => {
                let sum = total + weight;
                let t = if sum > 0.0 { weight / sum } else { 0.0 };
                (quat_slerp(&acc, &value, t), sum)
            }
        });
    }

    pub fn is_empty(&self) -> bool {
        self.translation.is_none() && self.rotation.is_none() && self.scale.is_none()
    }

    /// Resolve against the bone's base pose. Untouched properties keep the base value.
    pub fn resolve(&self, base: &JointPose) -> JointPose {
        let mut out = *base;
        if let Some((value, total)) = self.translation {
            out.translation = if total >= 1.0 {
                value
            } else {
                lerp3(&base.translation, &value, total)
            };
        }
        if let Some((value, total)) = self.rotation {
            out.rotation = if total >= 1.0 {
                value
            } else {
                quat_slerp(&base.rotation, &value, total)
            };
        }
        if let Some((value, total)) = self.scale {
            out.scale = if total >= 1.0 {
                value
            } else {
                lerp3(&base.scale, &value, total)
            };
        }
        out
    }
}

fn fold_vec3(acc: Option<([f32; 3], f32)>, value: [f32; 3], weight: f32) -> ([f32; 3], f32) {
    match acc {
        None => (value, weight),
        Some((acc, total)) => {
            let sum = total + weight;
            let t = if sum > 0.0 { weight / sum } else { 0.0 };
            (lerp3(&acc, &value, t), sum)
        }
    }
}

fn lerp3(a: &[f32; 3], b: &[f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

/// Quaternion slerp (xyzw) with shortest-path correction
pub fn quat_slerp(a: &[f32; 4], b: &[f32; 4], t: f32) -> [f32; 4] {
    let mut dot = a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3];

    let mut b_adj = *b;
    if dot < 0.0 {
        b_adj = [-b[0], -b[1], -b[2], -b[3]];
        dot = -dot;
    }

    // Nearly parallel: lerp avoids dividing by sin(theta) ~ 0
    if dot > 0.9995 {
        let result = [
            a[0] + t * (b_adj[0] - a[0]),
            a[1] + t * (b_adj[1] - a[1]),
            a[2] + t * (b_adj[2] - a[2]),
            a[3] + t * (b_adj[3] - a[3]),
        ];
        return quat_normalize(&result);
    }

    let theta = dot.acos();
    let sin_theta = theta.sin();
    let wa = ((1.0 - t) * theta).sin() / sin_theta;
    let wb = (t * theta).sin() / sin_theta;

    quat_normalize(&[
        a[0] * wa + b_adj[0] * wb,
        a[1] * wa + b_adj[1] * wb,
        a[2] * wa + b_adj[2] * wb,
        a[3] * wa + b_adj[3] * wb,
    ])
}

pub fn quat_normalize(q: &[f32; 4]) -> [f32; 4] {
    let len = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    if len < 1e-10 {
        return [0.0, 0.0, 0.0, 1.0];
    }
    [q[0] / len, q[1] / len, q[2] / len, q[3] / len]
}

pub fn quat_conjugate(q: &[f32; 4]) -> [f32; 4] {
    [-q[0], -q[1], -q[2], q[3]]
}

/// Hamilton product (xyzw)
pub fn quat_mul(a: &[f32; 4], b: &[f32; 4]) -> [f32; 4] {
    [
        a[3] * b[0] + a[0] * b[3] + a[1] * b[2] - a[2] * b[1],
        a[3] * b[1] - a[0] * b[2] + a[1] * b[3] + a[2] * b[0],
        a[3] * b[2] + a[0] * b[1] - a[1] * b[0] + a[2] * b[3],
        a[3] * b[3] - a[0] * b[0] - a[1] * b[1] - a[2] * b[2],
    ]
}
