//! Proximity zones in screen-normalized space

use marionette_core::{MarionetteError, Vec2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named regions of the avatar the pointer can interact with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Head,
    LeftHand,
    RightHand,
    Body,
}

impl Zone {
    /// Declaration order, which is also the tie-break priority
    pub const ALL: [Zone; 4] = [Zone::Head, Zone::LeftHand, Zone::RightHand, Zone::Body];

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Head => "head",
            Zone::LeftHand => "left_hand",
            Zone::RightHand => "right_hand",
            Zone::Body => "body",
        }
    }

    pub fn is_hand(&self) -> bool {
        matches!(self, Zone::LeftHand | Zone::RightHand)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = MarionetteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Zone::ALL
            .iter()
            .copied()
            .find(|z| z.as_str() == s)
            .ok_or_else(|| MarionetteError::ParseError(format!("unknown zone '{}'", s)))
    }
}

/// A circular region: center plus radius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneShape {
    pub center: Vec2,
    pub radius: f32,
}

impl ZoneShape {
    pub const fn new(x: f32, y: f32, radius: f32) -> Self {
        Self {
            center: Vec2::new(x, y),
            radius,
        }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        self.center.distance(&point) <= self.radius
    }
}

/// The set of zones used for classification, kept in priority order
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneLayout {
    zones: Vec<(Zone, ZoneShape)>,
}

impl Default for ZoneLayout {
    /// Touch-region layout for a portrait avatar window, (0,0) top-left
    fn default() -> Self {
        Self {
            zones: vec![
                (Zone::Head, ZoneShape::new(0.5, 0.15, 0.12)),
                (Zone::LeftHand, ZoneShape::new(0.2, 0.6, 0.08)),
                (Zone::RightHand, ZoneShape::new(0.8, 0.6, 0.08)),
                (Zone::Body, ZoneShape::new(0.5, 0.5, 0.18)),
            ],
        }
    }
}

impl ZoneLayout {
    /// Replace the shape of one zone, e.g. after the avatar's bones moved
    pub fn set_shape(&mut self, zone: Zone, shape: ZoneShape) {
        if let Some(entry) = self.zones.iter_mut().find(|(z, _)| *z == zone) {
            entry.1 = shape;
        }
    }

    pub fn shape(&self, zone: Zone) -> Option<ZoneShape> {
        self.zones.iter().find(|(z, _)| *z == zone).map(|(_, s)| *s)
    }

    /// Nearest zone whose radius contains `point`, with its distance.
    ///
    /// Equal distances resolve to the zone declared first.
    pub fn classify(&self, point: Vec2) -> Option<(Zone, f32)> {
        let mut best: Option<(Zone, f32)> = None;
        for (zone, shape) in &self.zones {
            let dist = shape.center.distance(&point);
            if dist > shape.radius {
                continue;
            }
            match best {
                Some((_, best_dist)) if best_dist <= dist => {}
                _ => best = Some((*zone, dist)),
            }
        }
        best
    }
}
