//! Marionette Animation - Avatar animation control
//!
//! Drives a humanoid avatar from high-level requests:
//! - `AnimationCatalog` - named clips grouped by category, state preferences, emotion and interaction mappings
//! - `ClipCache` - deduplicated asynchronous clip loading behind a `ClipSource`
//! - `BehaviorStateMachine` - guarded behavior states with blended procedural parameters
//! - `AnimationEngine` - crossfading playback, idle cycling, stall recovery, emotions and interactions
//! - `ExpressionBlender` / `Blinker` / `LipSync` - facial expression weights
//! - `AvatarController` - one per avatar, composes everything and writes into an `AvatarRig`

pub mod behavior;
pub mod blend;
pub mod cache;
pub mod catalog;
pub mod clip;
pub mod config;
pub mod controller;
pub mod engine;
pub mod expression;
pub mod history;
pub mod loader;
pub mod mixer;
pub mod procedural;
pub mod sampler;
pub mod skeleton;

pub use behavior::{BehaviorState, BehaviorStateMachine, SetStateOptions, StateEvent, StateParams};
pub use cache::{ClipCache, LoadError, LoadedClip};
pub use catalog::{AnimationCatalog, ClipCategory, ClipDescriptor};
pub use config::EngineConfig;
pub use controller::{AvatarController, AvatarSnapshot};
pub use engine::{
    AnimationEngine, EmotionOptions, EmotionOutcome, EngineEvent, PlayOptions, PlayStatus,
    PlaybackPhase, PlaybackSnapshot,
};
pub use expression::{Blinker, ExpressionBlender, LipSync};
pub use loader::{ClipSource, DirectoryClipSource, MemoryClipSource, SyntheticClipSource};
pub use skeleton::{AvatarRig, JointPose, MemoryRig};
