//! Animation catalog: named clip descriptors grouped by category, plus the
//! per-state, per-emotion and per-interaction selection tables.
//!
//! The catalog is data. It is parsed from TOML and validated once, so every
//! lookup after construction can assume its references resolve.

use crate::behavior::BehaviorState;
use crate::config::EngineConfig;
use marionette_core::{MarionetteError, Result};
use marionette_runtime::InteractionType;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const BUILTIN_CATALOG: &str = include_str!("../assets/default_catalog.toml");

/// Preference keys accepted in addition to the behavior state ids
pub const SCENARIO_KEYS: [&str; 7] = [
    "greeting",
    "listening",
    "surprised",
    "posing",
    "celebrating",
    "working",
    "exercising",
];

/// Closed set of clip categories, in canonical lookup order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipCategory {
    Idle,
    Greeting,
    Pose,
    Action,
    Reaction,
    Dance,
    Special,
}

impl ClipCategory {
    pub const ALL: [ClipCategory; 7] = [
        ClipCategory::Idle,
        ClipCategory::Greeting,
        ClipCategory::Pose,
        ClipCategory::Action,
        ClipCategory::Reaction,
        ClipCategory::Dance,
        ClipCategory::Special,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClipCategory::Idle => "idle",
            ClipCategory::Greeting => "greeting",
            ClipCategory::Pose => "pose",
            ClipCategory::Action => "action",
            ClipCategory::Reaction => "reaction",
            ClipCategory::Dance => "dance",
            ClipCategory::Special => "special",
        }
    }
}

impl fmt::Display for ClipCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClipCategory {
    type Err = MarionetteError;

    fn from_str(s: &str) -> Result<Self> {
        ClipCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| MarionetteError::ParseError(format!("unknown clip category '{}'", s)))
    }
}

/// Static description of one clip
#[derive(Debug, Clone, PartialEq)]
pub struct ClipDescriptor {
    pub name: String,
    /// Resource locator handed to the clip source
    pub resource: String,
    pub category: ClipCategory,
    /// Nominal duration in seconds
    pub duration: f64,
    pub looping: bool,
}

/// Which clip a preference entry asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preference {
    Named(String),
    Random,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatePreference {
    pub category: ClipCategory,
    pub preference: Preference,
    pub fallback: Option<String>,
}

/// Clip and expression choices for one emotion
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionProfile {
    pub id: String,
    /// Candidates, picked uniformly at random
    pub clips: Vec<String>,
    /// Used when `clips` is empty
    pub category: Option<ClipCategory>,
    pub expression: String,
    pub intensity: f32,
    /// Raise the gaze while this emotion is active
    pub look_up: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionProfile {
    pub clip: Option<String>,
    pub category: ClipCategory,
}

// ── File format ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CatalogFile {
    categories: BTreeMap<String, Vec<ClipEntry>>,
    #[serde(default)]
    preferences: BTreeMap<String, PreferenceEntry>,
    #[serde(default)]
    emotions: BTreeMap<String, EmotionEntry>,
    #[serde(default)]
    interactions: BTreeMap<String, InteractionEntry>,
    #[serde(default)]
    engine: EngineConfig,
}

#[derive(Debug, Deserialize)]
struct ClipEntry {
    name: String,
    resource: String,
    duration: f64,
    #[serde(rename = "loop", default)]
    looping: bool,
}

#[derive(Debug, Deserialize)]
struct PreferenceEntry {
    category: ClipCategory,
    preference: String,
    #[serde(default)]
    fallback: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmotionEntry {
    #[serde(default)]
    clips: Vec<String>,
    #[serde(default)]
    category: Option<ClipCategory>,
    expression: String,
    intensity: f32,
    #[serde(default)]
    look_up: bool,
}

#[derive(Debug, Deserialize)]
struct InteractionEntry {
    #[serde(default)]
    clip: Option<String>,
    category: ClipCategory,
}

// ── Catalog ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AnimationCatalog {
    categories: BTreeMap<ClipCategory, Vec<ClipDescriptor>>,
    preferences: HashMap<String, StatePreference>,
    emotions: BTreeMap<String, EmotionProfile>,
    interactions: HashMap<InteractionType, InteractionProfile>,
    engine: EngineConfig,
}

impl AnimationCatalog {
    /// The catalog shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MarionetteError::CatalogError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            MarionetteError::CatalogError(msg) => {
                MarionetteError::CatalogError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse and validate a catalog document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::from_file(file)
    }

    fn from_file(file: CatalogFile) -> Result<Self> {
        let mut categories = BTreeMap::new();
        for (key, entries) in file.categories {
            let category: ClipCategory = key
                .parse()
                .map_err(|_| MarionetteError::CatalogError(format!("unknown category '{}'", key)))?;
            let mut seen = HashSet::new();
            let mut clips = Vec::with_capacity(entries.len());
            for entry in entries {
                if !seen.insert(entry.name.clone()) {
                    return Err(MarionetteError::CatalogError(format!(
                        "clip '{}' appears twice in category '{}'",
                        entry.name, category
                    )));
                }
                if entry.duration.is_nan() || entry.duration <= 0.0 {
                    return Err(MarionetteError::CatalogError(format!(
                        "clip '{}' has non-positive duration {}",
                        entry.name, entry.duration
                    )));
                }
                clips.push(ClipDescriptor {
                    name: entry.name,
                    resource: entry.resource,
                    category,
                    duration: entry.duration,
                    looping: entry.looping,
                });
            }
            categories.insert(category, clips);
        }

        let mut preferences = HashMap::new();
        for (key, entry) in file.preferences {
            if key.parse::<BehaviorState>().is_err() && !SCENARIO_KEYS.contains(&key.as_str()) {
                return Err(MarionetteError::CatalogError(format!(
                    "preference for unknown state '{}'",
                    key
                )));
            }
            let preference = if entry.preference == "random" {
                Preference::Random
            } else {
                Preference::Named(entry.preference)
            };
            preferences.insert(
                key,
                StatePreference {
                    category: entry.category,
                    preference,
                    fallback: entry.fallback,
                },
            );
        }

        let emotions = file
            .emotions
            .into_iter()
            .map(|(id, entry)| {
                let profile = EmotionProfile {
                    id: id.clone(),
                    clips: entry.clips,
                    category: entry.category,
                    expression: entry.expression,
                    intensity: entry.intensity,
                    look_up: entry.look_up,
                };
                (id, profile)
            })
            .collect();

        let mut interactions = HashMap::new();
        for (key, entry) in file.interactions {
            let kind: InteractionType = key.parse().map_err(|_| {
                MarionetteError::CatalogError(format!("unknown interaction '{}'", key))
            })?;
            interactions.insert(
                kind,
                InteractionProfile {
                    clip: entry.clip,
                    category: entry.category,
                },
            );
        }

        let catalog = Self {
            categories,
            preferences,
            emotions,
            interactions,
            engine: file.engine,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Every reference must resolve. Dangling names are load-time errors.
    fn validate(&self) -> Result<()> {
        if self.total_count() == 0 {
            return Err(MarionetteError::CatalogError("catalog has no clips".into()));
        }
        self.engine.validate()?;

        if !self.preferences.contains_key(BehaviorState::Idle.as_str()) {
            return Err(MarionetteError::CatalogError(
                "catalog needs a preference for the idle state".into(),
            ));
        }

        for (key, pref) in &self.preferences {
            if self.category(pref.category).is_empty() {
                return Err(MarionetteError::CatalogError(format!(
                    "preference '{}' references empty category '{}'",
                    key, pref.category
                )));
            }
            if let Preference::Named(name) = &pref.preference {
                self.require_clip(name, &format!("preference '{}'", key))?;
                if !self.category(pref.category).iter().any(|c| &c.name == name) {
                    return Err(MarionetteError::CatalogError(format!(
                        "preference '{}' names '{}', which is not in category '{}'",
                        key, name, pref.category
                    )));
                }
            }
            if let Some(fallback) = &pref.fallback {
                self.require_clip(fallback, &format!("preference '{}' fallback", key))?;
            }
        }

        for (id, emotion) in &self.emotions {
            for clip in &emotion.clips {
                self.require_clip(clip, &format!("emotion '{}'", id))?;
            }
            if emotion.clips.is_empty() {
                let usable = emotion
                    .category
                    .map(|c| !self.category(c).is_empty())
                    .unwrap_or(false);
                if !usable {
                    return Err(MarionetteError::CatalogError(format!(
                        "emotion '{}' has no clips and no usable category",
                        id
                    )));
                }
            }
            if !(0.0..=1.0).contains(&emotion.intensity) {
                return Err(MarionetteError::CatalogError(format!(
                    "emotion '{}' intensity {} is outside 0..1",
                    id, emotion.intensity
                )));
            }
        }

        for (kind, interaction) in &self.interactions {
            match &interaction.clip {
                Some(clip) => self.require_clip(clip, &format!("interaction '{}'", kind))?,
                None if self.category(interaction.category).is_empty() => {
                    return Err(MarionetteError::CatalogError(format!(
                        "interaction '{}' references empty category '{}'",
                        kind, interaction.category
                    )));
                }
                None => {}
            }
        }
        Ok(())
    }

    fn require_clip(&self, name: &str, context: &str) -> Result<()> {
        if self.get(name).is_none() {
            return Err(MarionetteError::CatalogError(format!(
                "{} references unknown clip '{}'",
                context, name
            )));
        }
        Ok(())
    }

    /// First clip with this name, searching categories in canonical order
    pub fn get(&self, name: &str) -> Option<&ClipDescriptor> {
        self.categories
            .values()
            .flat_map(|clips| clips.iter())
            .find(|clip| clip.name == name)
    }

    pub fn category(&self, category: ClipCategory) -> &[ClipDescriptor] {
        self.categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Non-empty categories in canonical order
    pub fn categories(&self) -> impl Iterator<Item = ClipCategory> + '_ {
        self.categories
            .iter()
            .filter(|(_, clips)| !clips.is_empty())
            .map(|(category, _)| *category)
    }

    pub fn random_of<R: Rng + ?Sized>(
        &self,
        category: ClipCategory,
        rng: &mut R,
    ) -> Option<&ClipDescriptor> {
        self.category(category).choose(rng)
    }

    /// Clip for a behavior state
    pub fn preferred_for<R: Rng + ?Sized>(
        &self,
        state: BehaviorState,
        rng: &mut R,
    ) -> Option<&ClipDescriptor> {
        self.preferred_for_key(state.as_str(), rng)
    }

    /// Clip for any preference key. Unknown keys use the idle mapping.
    pub fn preferred_for_key<R: Rng + ?Sized>(
        &self,
        key: &str,
        rng: &mut R,
    ) -> Option<&ClipDescriptor> {
        let pref = self
            .preferences
            .get(key)
            .or_else(|| self.preferences.get(BehaviorState::Idle.as_str()))?;
        self.resolve_preferred_clip(pref, rng)
    }

    /// The single place the fallback order is encoded:
    /// named preference within its category (or a random member),
    /// then the fallback clip from anywhere, then the category's first entry.
    pub fn resolve_preferred_clip<R: Rng + ?Sized>(
        &self,
        pref: &StatePreference,
        rng: &mut R,
    ) -> Option<&ClipDescriptor> {
        let clips = self.category(pref.category);
        let preferred = match &pref.preference {
            Preference::Random => clips.choose(rng),
            Preference::Named(name) => clips.iter().find(|c| &c.name == name),
        };
        preferred
            .or_else(|| pref.fallback.as_deref().and_then(|f| self.get(f)))
            .or_else(|| clips.first())
    }

    pub fn preference(&self, key: &str) -> Option<&StatePreference> {
        self.preferences.get(key)
    }

    /// Sorted preference keys
    pub fn preference_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.preferences.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Unique clip names in declaration order
    pub fn all_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.categories
            .values()
            .flat_map(|clips| clips.iter())
            .map(|clip| clip.name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Number of entries across categories; a clip listed twice counts twice
    pub fn total_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Short one-off gestures for livening up idle time
    pub fn idle_gestures(&self) -> Vec<&ClipDescriptor> {
        self.category(ClipCategory::Greeting)
            .iter()
            .chain(self.category(ClipCategory::Reaction))
            .collect()
    }

    /// Profile for an emotion id. Unknown ids get the neutral profile.
    pub fn emotion(&self, id: &str) -> Option<&EmotionProfile> {
        self.emotions.get(id).or_else(|| self.emotions.get("neutral"))
    }

    pub fn emotion_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.emotions.keys().map(String::as_str)
    }

    pub fn interaction(&self, kind: InteractionType) -> Option<&InteractionProfile> {
        self.interactions.get(&kind)
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine
    }
}
