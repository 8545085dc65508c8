//! Error types for Marionette

use thiserror::Error;

/// The main error type for Marionette operations
#[derive(Debug, Error)]
pub enum MarionetteError {
    /// A configuration references something that does not exist. Fatal at load time.
    #[error("Catalog error: {0}")]
    CatalogError(String),

    /// A runtime lookup for a clip, category or profile came back empty.
    #[error("Catalog miss: {0}")]
    CatalogMiss(String),

    #[error("Failed to load clip '{name}': {reason}")]
    LoadFailure { name: String, reason: String },

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Animation error: {0}")]
    AnimationError(String),

    #[error("Controller is not initialized")]
    NotInitialized,
}

/// Result type alias for Marionette operations
pub type Result<T> = std::result::Result<T, MarionetteError>;

impl From<toml::de::Error> for MarionetteError {
    fn from(err: toml::de::Error) -> Self {
        MarionetteError::TomlParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_failure_message_names_clip() {
        let err = MarionetteError::LoadFailure {
            name: "spin".into(),
            reason: "file missing".into(),
        };
        assert_eq!(err.to_string(), "Failed to load clip 'spin': file missing");
    }

    #[test]
    fn toml_errors_convert() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("= broken");
        let err: MarionetteError = parsed.unwrap_err().into();
        assert!(matches!(err, MarionetteError::TomlParseError(_)));
    }
}
