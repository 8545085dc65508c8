//! Skeletal clip data: per-bone keyframe tracks keyed by humanoid bone name

use marionette_core::{MarionetteError, Result, Vec3};
use serde::{Deserialize, Serialize};

/// How to interpolate between keyframes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Hold the previous value
    Step,
    #[default]
    Linear,
    /// Cubic Hermite using the keyframes' tangents (zero when absent)
    CubicSpline,
}

/// Which bone property a track animates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JointProperty {
    Translation,
    Rotation,
    Scale,
}

impl JointProperty {
    pub fn arity(&self) -> usize {
        match self {
            JointProperty::Rotation => 4,
            _ => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointKeyframe {
    pub time: f64,
    /// 3 floats for translation/scale, 4 for rotation (quaternion xyzw)
    pub value: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_tangent: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_tangent: Option<Vec<f32>>,
}

impl JointKeyframe {
    pub fn new(time: f64, value: Vec<f32>) -> Self {
        Self {
            time,
            value,
            in_tangent: None,
            out_tangent: None,
        }
    }
}

/// One property of one bone over time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneTrack {
    pub bone: String,
    pub property: JointProperty,
    #[serde(default)]
    pub interpolation: Interpolation,
    pub keyframes: Vec<JointKeyframe>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletalClip {
    pub name: String,
    /// Total duration in seconds
    pub duration: f64,
    pub tracks: Vec<BoneTrack>,
}

impl SkeletalClip {
    /// Distinct bone names in track order
    pub fn bones(&self) -> Vec<&str> {
        let mut bones: Vec<&str> = Vec::new();
        for track in &self.tracks {
            if !bones.contains(&track.bone.as_str()) {
                bones.push(&track.bone);
            }
        }
        bones
    }

    /// Rewrite three-component rotation keyframes (XYZ Euler, radians) as quaternions
    pub fn normalize_rotations(&mut self) {
        for track in self
            .tracks
            .iter_mut()
            .filter(|t| t.property == JointProperty::Rotation)
        {
            for kf in &mut track.keyframes {
                if kf.value.len() == 3 {
                    let euler = Vec3::new(kf.value[0], kf.value[1], kf.value[2]);
                    kf.value = euler.euler_to_quat().to_vec();
                    kf.in_tangent = None;
                    kf.out_tangent = None;
                }
            }
        }
    }

    /// Structural checks shared by every clip source
    pub fn validate(&self) -> Result<()> {
        if self.duration.is_nan() || self.duration <= 0.0 {
            return Err(MarionetteError::AnimationError(format!(
                "Clip '{}' has non-positive duration: {}",
                self.name, self.duration
            )));
        }
        if self.tracks.is_empty() {
            return Err(MarionetteError::AnimationError(format!(
                "Clip '{}' has no tracks",
                self.name
            )));
        }

        for (i, track) in self.tracks.iter().enumerate() {
            if track.keyframes.is_empty() {
                return Err(MarionetteError::AnimationError(format!(
                    "Clip '{}' track {} ({}) has no keyframes",
                    self.name, i, track.bone
                )));
            }
            let arity = track.property.arity();
            for kf in &track.keyframes {
                if kf.value.len() != arity {
                    return Err(MarionetteError::AnimationError(format!(
                        "Clip '{}' track {} ({}) expects {} values per keyframe, got {}",
                        self.name,
                        i,
                        track.bone,
                        arity,
                        kf.value.len()
                    )));
                }
            }
            let sorted = track
                .keyframes
                .windows(2)
                .all(|pair| pair[0].time <= pair[1].time);
            if !sorted {
                return Err(MarionetteError::AnimationError(format!(
                    "Clip '{}' track {} ({}) keyframes are not sorted by time",
                    self.name, i, track.bone
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip() -> SkeletalClip {
        SkeletalClip {
            name: "wave".into(),
            duration: 1.0,
            tracks: vec![
                BoneTrack {
                    bone: "rightUpperArm".into(),
                    property: JointProperty::Rotation,
                    interpolation: Interpolation::Linear,
                    keyframes: vec![
                        JointKeyframe::new(0.0, vec![0.0, 0.0, -1.2]),
                        JointKeyframe::new(1.0, vec![0.0, 0.0, 0.0, 1.0]),
                    ],
                },
                BoneTrack {
                    bone: "rightUpperArm".into(),
                    property: JointProperty::Translation,
                    interpolation: Interpolation::Step,
                    keyframes: vec![JointKeyframe::new(0.0, vec![0.0, 0.0, 0.0])],
                },
            ],
        }
    }

    #[test]
    fn euler_rotations_become_quaternions() {
        let mut c = clip();
        assert!(c.validate().is_err());
        c.normalize_rotations();
        c.validate().unwrap();
        let q = &c.tracks[0].keyframes[0].value;
        assert_eq!(q.len(), 4);
        assert!((q[2] - (-0.6f32).sin()).abs() < 1e-6);
    }

    #[test]
    fn bones_are_deduplicated() {
        assert_eq!(clip().bones(), vec!["rightUpperArm"]);
    }

    #[test]
    fn unsorted_keyframes_are_rejected() {
        let mut c = clip();
        c.normalize_rotations();
        c.tracks[0].keyframes.swap(0, 1);
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("not sorted"));
    }

    #[test]
    fn empty_clip_is_rejected() {
        let c = SkeletalClip {
            name: "empty".into(),
            duration: 1.0,
            tracks: vec![],
        };
        assert!(c.validate().is_err());
    }
}
