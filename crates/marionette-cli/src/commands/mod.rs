//! CLI command implementations

pub mod simulate;
pub mod states;
pub mod validate;
