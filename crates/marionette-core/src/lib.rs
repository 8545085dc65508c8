//! Marionette Core - Foundational types for the avatar controller
//!
//! This crate provides the types that all other Marionette crates depend on:
//! - `Vec2`, `Vec3` - Spatial types for pointer input and bone rotations
//! - Error types and Result alias

mod error;
mod types;

pub use error::{MarionetteError, Result};
pub use types::{Vec2, Vec3};
