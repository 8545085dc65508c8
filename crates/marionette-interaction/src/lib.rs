//! Marionette Interaction - Pointer interaction detection
//!
//! Turns the raw pointer stream into discrete avatar interactions:
//! - `ZoneLayout` - named proximity regions (head, hands, body) and classification
//! - `PetGesture` - back-and-forth stroke recognition over the head zone
//! - `GazeFollow` - smoothed head and eye rotation toward the cursor
//! - `InteractionDetector` - ties the pieces together and emits `InteractionEvent`s

mod detector;
mod follow;
mod gesture;
mod zones;

pub use detector::{DetectorConfig, InteractionDetector, InteractionEvent, InteractionKind};
pub use follow::{EyeRotation, GazeFollow, Hand, HeadRotation};
pub use gesture::{GestureConfig, PetGesture};
pub use zones::{Zone, ZoneLayout, ZoneShape};
