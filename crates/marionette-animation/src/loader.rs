//! Clip sources: where clip data comes from
//!
//! A `ClipSource` turns a catalog descriptor into a parsed `SkeletalClip`
//! asynchronously. Files use the `.anim.toml` format:
//!
//! ```toml
//! name = "wave"
//! duration = 2.0
//!
//! [[tracks]]
//! bone = "rightUpperArm"
//! property = "Rotation"
//! interpolation = "Linear"
//!
//! [[tracks.keyframes]]
//! time = 0.0
//! value = [0.1, 0.0, -1.2]          # XYZ Euler radians, or a quaternion xyzw
//! ```

use crate::catalog::{ClipCategory, ClipDescriptor};
use crate::clip::{BoneTrack, Interpolation, JointKeyframe, JointProperty, SkeletalClip};
use futures::future::{self, FutureExt, LocalBoxFuture};
use marionette_core::{MarionetteError, Result, Vec3};
use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Fetches and parses clip data for a descriptor
pub trait ClipSource {
    fn fetch(&self, descriptor: &ClipDescriptor) -> LocalBoxFuture<'static, Result<SkeletalClip>>;
}

/// Load a clip from a `.anim.toml` file.
pub fn load_clip_from_file(path: &Path) -> Result<SkeletalClip> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        MarionetteError::AnimationError(format!("Failed to read {}: {}", path.display(), e))
    })?;
    parse_clip(&content).map_err(|e| match e {
        MarionetteError::AnimationError(msg) => {
            MarionetteError::AnimationError(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Parse and validate a clip from TOML text
pub fn parse_clip(content: &str) -> Result<SkeletalClip> {
    let mut clip: SkeletalClip = toml::from_str(content)
        .map_err(|e| MarionetteError::AnimationError(format!("Failed to parse clip: {}", e)))?;
    clip.normalize_rotations();
    clip.validate()?;
    Ok(clip)
}

/// Reads `<root>/<stem>.anim.toml`, where `<stem>` is the file stem of the
/// descriptor's resource (`/assets/animations/05_Spin.vrma` -> `05_Spin`).
/// Falls back to `<root>/<clip name>.anim.toml`.
#[derive(Debug, Clone)]
pub struct DirectoryClipSource {
    root: PathBuf,
}

impl DirectoryClipSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidate paths for a descriptor, most specific first
    pub fn candidates(&self, descriptor: &ClipDescriptor) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(2);
        if let Some(stem) = Path::new(&descriptor.resource)
            .file_stem()
            .and_then(|s| s.to_str())
        {
            paths.push(self.root.join(format!("{}.anim.toml", stem)));
        }
        let by_name = self.root.join(format!("{}.anim.toml", descriptor.name));
        if !paths.contains(&by_name) {
            paths.push(by_name);
        }
        paths
    }
}

impl ClipSource for DirectoryClipSource {
    fn fetch(&self, descriptor: &ClipDescriptor) -> LocalBoxFuture<'static, Result<SkeletalClip>> {
        let candidates = self.candidates(descriptor);
        let name = descriptor.name.clone();
        async move {
            let path = candidates.iter().find(|p| p.exists()).ok_or_else(|| {
                MarionetteError::LoadFailure {
                    name: name.clone(),
                    reason: format!(
                        "no clip file (tried {})",
                        candidates
                            .iter()
                            .map(|p| p.display().to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                }
            })?;
            tracing::debug!(clip = %name, path = %path.display(), "reading clip file");
            load_clip_from_file(path)
        }
        .boxed_local()
    }
}

/// Clips registered up front, keyed by clip name
#[derive(Debug, Default)]
pub struct MemoryClipSource {
    clips: HashMap<String, SkeletalClip>,
    failures: HashMap<String, String>,
    fetches: Cell<usize>,
}

impl MemoryClipSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, clip: SkeletalClip) {
        self.clips.insert(name.into(), clip);
    }

    pub fn with_clip(mut self, name: impl Into<String>, clip: SkeletalClip) -> Self {
        self.insert(name, clip);
        self
    }

    /// Make every fetch of `name` fail with `reason`
    pub fn fail(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.failures.insert(name.into(), reason.into());
    }

    /// Number of `fetch` calls so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }
}

impl ClipSource for MemoryClipSource {
    fn fetch(&self, descriptor: &ClipDescriptor) -> LocalBoxFuture<'static, Result<SkeletalClip>> {
        self.fetches.set(self.fetches.get() + 1);
        let outcome = if let Some(reason) = self.failures.get(&descriptor.name) {
            Err(MarionetteError::LoadFailure {
                name: descriptor.name.clone(),
                reason: reason.clone(),
            })
        } else {
            self.clips.get(&descriptor.name).cloned().ok_or_else(|| {
                MarionetteError::LoadFailure {
                    name: descriptor.name.clone(),
                    reason: "not registered".into(),
                }
            })
        };
        future::ready(outcome).boxed_local()
    }
}

/// Generates a gentle procedural loop for any descriptor, so a headless run
/// has something to play without clip files.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticClipSource;

impl SyntheticClipSource {
    /// Build the clip for a descriptor. Deterministic per clip name.
    pub fn generate(descriptor: &ClipDescriptor) -> SkeletalClip {
        let duration = descriptor.duration;
        let energy = match descriptor.category {
            ClipCategory::Idle | ClipCategory::Pose => 0.4,
            ClipCategory::Greeting | ClipCategory::Reaction => 0.8,
            ClipCategory::Action => 0.7,
            ClipCategory::Dance | ClipCategory::Special => 1.0,
        };
        let phase = descriptor
            .name
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32))
            % 628;
        let phase = phase as f32 / 100.0;

        let steps = 8;
        let keyframes = |f: &dyn Fn(Vec3) -> Vec3| -> Vec<JointKeyframe> {
            (0..=steps)
                .map(|i| {
                    let u = i as f32 / steps as f32;
                    let angle = u * std::f32::consts::TAU + phase;
                    JointKeyframe::new(
                        duration * i as f64 / steps as f64,
                        f(Vec3::new(angle.sin(), angle.cos(), 0.0))
                            .euler_to_quat()
                            .to_vec(),
                    )
                })
                .collect()
        };
        let track = |bone: &str, kfs: Vec<JointKeyframe>| BoneTrack {
            bone: bone.to_string(),
            property: JointProperty::Rotation,
            interpolation: Interpolation::Linear,
            keyframes: kfs,
        };

        SkeletalClip {
            name: descriptor.name.clone(),
            duration,
            tracks: vec![
                track(
                    "spine",
                    keyframes(&|w: Vec3| Vec3::new(0.0, w.x * 0.05 * energy, w.y * 0.02 * energy)),
                ),
                track(
                    "head",
                    keyframes(&|w: Vec3| Vec3::new(w.y * 0.04 * energy, w.x * 0.08 * energy, 0.0)),
                ),
                track(
                    "leftUpperArm",
                    keyframes(&|w: Vec3| Vec3::new(0.1, 0.0, 1.2 - w.x.abs() * 0.3 * energy)),
                ),
                track(
                    "rightUpperArm",
                    keyframes(&|w: Vec3| Vec3::new(0.1, 0.0, -1.2 + w.y.abs() * 0.3 * energy)),
                ),
            ],
        }
    }
}

impl ClipSource for SyntheticClipSource {
    fn fetch(&self, descriptor: &ClipDescriptor) -> LocalBoxFuture<'static, Result<SkeletalClip>> {
        let clip = Self::generate(descriptor);
        future::ready(clip.validate().map(|_| clip)).boxed_local()
    }
}
