//! Engine tuning loaded from the `[engine]` table of a catalog file

use marionette_core::{MarionetteError, Result};
use serde::{Deserialize, Serialize};

/// Playback engine timing and selection parameters. Every field has a default,
/// so an absent or partial `[engine]` table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default crossfade length for `play`, in seconds
    #[serde(default = "default_blend_duration")]
    pub blend_duration: f64,
    /// Crossfade length used when an emotion changes the clip
    #[serde(default = "default_emotion_blend_duration")]
    pub emotion_blend_duration: f64,
    /// How long an emotion's facial expression takes to settle
    #[serde(default = "default_expression_duration")]
    pub expression_duration: f64,
    #[serde(default = "default_idle_cycle_min")]
    pub idle_cycle_min: f64,
    #[serde(default = "default_idle_cycle_max")]
    pub idle_cycle_max: f64,
    /// Seconds of accumulated frame time between stall checks
    #[serde(default = "default_watchdog_interval")]
    pub watchdog_interval: f64,
    /// Number of recently played clip names avoided by idle cycling
    #[serde(default = "default_recent_history")]
    pub recent_history: usize,
    /// Added to a one-shot's duration before returning to idle
    #[serde(default = "default_return_to_idle_padding")]
    pub return_to_idle_padding: f64,
    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            blend_duration: default_blend_duration(),
            emotion_blend_duration: default_emotion_blend_duration(),
            expression_duration: default_expression_duration(),
            idle_cycle_min: default_idle_cycle_min(),
            idle_cycle_max: default_idle_cycle_max(),
            watchdog_interval: default_watchdog_interval(),
            recent_history: default_recent_history(),
            return_to_idle_padding: default_return_to_idle_padding(),
            seed: None,
        }
    }
}

fn default_blend_duration() -> f64 {
    0.5
}
fn default_emotion_blend_duration() -> f64 {
    0.8
}
fn default_expression_duration() -> f64 {
    2.0
}
fn default_idle_cycle_min() -> f64 {
    20.0
}
fn default_idle_cycle_max() -> f64 {
    40.0
}
fn default_watchdog_interval() -> f64 {
    2.0
}
fn default_recent_history() -> usize {
    5
}
fn default_return_to_idle_padding() -> f64 {
    0.2
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("blend_duration", self.blend_duration),
            ("emotion_blend_duration", self.emotion_blend_duration),
            ("expression_duration", self.expression_duration),
            ("return_to_idle_padding", self.return_to_idle_padding),
        ];
        for (field, value) in non_negative {
            if value.is_nan() || value < 0.0 {
                return Err(MarionetteError::CatalogError(format!(
                    "engine.{} must be non-negative, got {}",
                    field, value
                )));
            }
        }
        if self.idle_cycle_min.is_nan()
            || self.idle_cycle_min <= 0.0
            || self.idle_cycle_min > self.idle_cycle_max
        {
            return Err(MarionetteError::CatalogError(format!(
                "engine idle cycle range is invalid: {}..{}",
                self.idle_cycle_min, self.idle_cycle_max
            )));
        }
        if self.watchdog_interval.is_nan() || self.watchdog_interval <= 0.0 {
            return Err(MarionetteError::CatalogError(format!(
                "engine.watchdog_interval must be positive, got {}",
                self.watchdog_interval
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_table_fills_defaults() {
        let config: EngineConfig = toml::from_str("blend_duration = 0.3\nseed = 7").unwrap();
        assert_eq!(config.blend_duration, 0.3);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.idle_cycle_min, 20.0);
        assert_eq!(config.recent_history, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn inverted_idle_range_is_rejected() {
        let config = EngineConfig {
            idle_cycle_min: 30.0,
            idle_cycle_max: 10.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_watchdog_interval_is_rejected() {
        let config = EngineConfig {
            watchdog_interval: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
