//! Keyframe sampling with quaternion slerp for rotation tracks

use crate::blend::{quat_normalize, quat_slerp};
use crate::clip::{BoneTrack, Interpolation, JointKeyframe, JointProperty, SkeletalClip};

/// One sampled bone property
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackValue {
    Translation([f32; 3]),
    Rotation([f32; 4]),
    Scale([f32; 3]),
}

/// Sample a bone track at `time`, clamping outside the keyframe range.
pub fn sample_track(track: &BoneTrack, time: f64) -> TrackValue {
    let keyframes = &track.keyframes;
    let raw = match (keyframes.first(), keyframes.last()) {
        (None, _) | (_, None) => Vec::new(),
        (Some(first), _) if time <= first.time => first.value.clone(),
        (_, Some(last)) if time >= last.time => last.value.clone(),
        _ => interpolate(track, time),
    };
    to_value(track.property, &raw)
}

fn interpolate(track: &BoneTrack, time: f64) -> Vec<f32> {
    let keyframes = &track.keyframes;
    let idx = match keyframes.binary_search_by(|kf| kf.time.total_cmp(&time)) {
        Ok(i) => return keyframes[i].value.clone(),
        Err(i) => i,
    };
    let prev = &keyframes[idx - 1];
    let next = &keyframes[idx];

    let span = next.time - prev.time;
    if span <= 0.0 {
        return prev.value.clone();
    }
    let t = ((time - prev.time) / span) as f32;
    let is_rotation = track.property == JointProperty::Rotation;

    match track.interpolation {
        Interpolation::Step => prev.value.clone(),
        Interpolation::Linear if is_rotation => {
            quat_slerp(&quat(&prev.value), &quat(&next.value), t).to_vec()
        }
        Interpolation::Linear => lerp_vec(&prev.value, &next.value, t),
        Interpolation::CubicSpline => {
            let v = hermite(prev, next, span as f32, t);
            if is_rotation {
                quat_normalize(&quat(&v)).to_vec()
            } else {
                v
            }
        }
    }
}

/// Cubic Hermite between two keyframes; missing tangents count as zero
fn hermite(prev: &JointKeyframe, next: &JointKeyframe, span: f32, t: f32) -> Vec<f32> {
    let t2 = t * t;
    let t3 = t2 * t;
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;
    let tangent = |tan: &Option<Vec<f32>>, i: usize| {
        tan.as_ref().and_then(|v| v.get(i)).copied().unwrap_or(0.0)
    };

    (0..prev.value.len().min(next.value.len()))
        .map(|i| {
            h00 * prev.value[i]
                + h10 * span * tangent(&prev.out_tangent, i)
                + h01 * next.value[i]
                + h11 * span * tangent(&next.in_tangent, i)
        })
        .collect()
}

/// Every track of a clip sampled at `time`, with its bone name
pub fn sample_clip(clip: &SkeletalClip, time: f64) -> impl Iterator<Item = (&str, TrackValue)> {
    clip.tracks
        .iter()
        .map(move |track| (track.bone.as_str(), sample_track(track, time)))
}

fn lerp_vec(a: &[f32], b: &[f32], t: f32) -> Vec<f32> {
    a.iter().zip(b).map(|(av, bv)| av + (bv - av) * t).collect()
}

fn quat(v: &[f32]) -> [f32; 4] {
    match v {
        [x, y, z, w, ..] => [*x, *y, *z, *w],
        _ => [0.0, 0.0, 0.0, 1.0],
    }
}

fn vec3(v: &[f32], fill: f32) -> [f32; 3] {
    [
        v.first().copied().unwrap_or(fill),
        v.get(1).copied().unwrap_or(fill),
        v.get(2).copied().unwrap_or(fill),
    ]
}

fn to_value(property: JointProperty, raw: &[f32]) -> TrackValue {
    match property {
        JointProperty::Translation => TrackValue::Translation(vec3(raw, 0.0)),
        JointProperty::Rotation => TrackValue::Rotation(quat(raw)),
        JointProperty::Scale => TrackValue::Scale(vec3(raw, 1.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(property: JointProperty, interpolation: Interpolation, kfs: Vec<(f64, Vec<f32>)>) -> BoneTrack {
        BoneTrack {
            bone: "spine".into(),
            property,
            interpolation,
            keyframes: kfs
                .into_iter()
                .map(|(time, value)| JointKeyframe::new(time, value))
                .collect(),
        }
    }

    #[test]
    fn translation_lerps() {
        let t = track(
            JointProperty::Translation,
            Interpolation::Linear,
            vec![(0.0, vec![0.0, 0.0, 0.0]), (2.0, vec![4.0, 6.0, 8.0])],
        );
        match sample_track(&t, 1.0) {
            TrackValue::Translation(v) => {
                assert!((v[0] - 2.0).abs() < 1e-4);
                assert!((v[2] - 4.0).abs() < 1e-4);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn clamps_outside_range() {
        let t = track(
            JointProperty::Translation,
            Interpolation::Linear,
            vec![(0.5, vec![1.0, 1.0, 1.0]), (1.0, vec![2.0, 2.0, 2.0])],
        );
        assert_eq!(sample_track(&t, 0.0), TrackValue::Translation([1.0, 1.0, 1.0]));
        assert_eq!(sample_track(&t, 9.0), TrackValue::Translation([2.0, 2.0, 2.0]));
    }

    #[test]
    fn step_holds_previous() {
        let t = track(
            JointProperty::Scale,
            Interpolation::Step,
            vec![(0.0, vec![1.0, 2.0, 3.0]), (1.0, vec![4.0, 5.0, 6.0])],
        );
        assert_eq!(sample_track(&t, 0.5), TrackValue::Scale([1.0, 2.0, 3.0]));
    }

    #[test]
    fn rotation_midpoint_is_normalized() {
        let t = track(
            JointProperty::Rotation,
            Interpolation::Linear,
            vec![(0.0, vec![0.0, 0.0, 0.0, 1.0]), (1.0, vec![0.0, 1.0, 0.0, 0.0])],
        );
        let TrackValue::Rotation(q) = sample_track(&t, 0.5) else {
            panic!("rotation track must yield a rotation");
        };
        let len = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
        assert!((len - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cubic_without_tangents_eases() {
        let t = track(
            JointProperty::Translation,
            Interpolation::CubicSpline,
            vec![(0.0, vec![0.0, 0.0, 0.0]), (1.0, vec![1.0, 0.0, 0.0])],
        );
        let TrackValue::Translation(quarter) = sample_track(&t, 0.25) else {
            panic!("translation track must yield a translation");
        };
        let TrackValue::Translation(half) = sample_track(&t, 0.5) else {
            panic!("translation track must yield a translation");
        };
        assert!(quarter[0] < 0.25);
        assert!((half[0] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn empty_track_yields_identity() {
        let t = track(JointProperty::Rotation, Interpolation::Linear, vec![]);
        assert_eq!(sample_track(&t, 0.3), TrackValue::Rotation([0.0, 0.0, 0.0, 1.0]));
    }
}
