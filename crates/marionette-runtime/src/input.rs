//! Raw pointer input and the interaction kinds the engine reacts to

use marionette_core::{MarionetteError, Vec2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discrete user interactions mapped to one-shot animations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Click,
    DoubleClick,
    Hover,
    DragStart,
    DragEnd,
    LongPress,
}

impl InteractionType {
    pub const ALL: [InteractionType; 6] = [
        InteractionType::Click,
        InteractionType::DoubleClick,
        InteractionType::Hover,
        InteractionType::DragStart,
        InteractionType::DragEnd,
        InteractionType::LongPress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Click => "click",
            InteractionType::DoubleClick => "double_click",
            InteractionType::Hover => "hover",
            InteractionType::DragStart => "drag_start",
            InteractionType::DragEnd => "drag_end",
            InteractionType::LongPress => "long_press",
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionType {
    type Err = MarionetteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| MarionetteError::ParseError(format!("unknown interaction '{}'", s)))
    }
}

/// One sample of the raw pointer stream, in screen-normalized [0,1]² coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointerInput {
    Move { position: Vec2 },
    Click { position: Vec2 },
    DoubleClick { position: Vec2 },
    Hover { position: Vec2 },
    DragStart { position: Vec2 },
    DragEnd { position: Vec2 },
    LongPress { position: Vec2 },
    /// Pointer left the avatar window
    Leave,
}

impl PointerInput {
    pub fn position(&self) -> Option<Vec2> {
        match *self {
            PointerInput::Move { position }
            | PointerInput::Click { position }
            | PointerInput::DoubleClick { position }
            | PointerInput::Hover { position }
            | PointerInput::DragStart { position }
            | PointerInput::DragEnd { position }
            | PointerInput::LongPress { position } => Some(position),
            PointerInput::Leave => None,
        }
    }

    /// The discrete interaction this sample carries, if any. Plain moves carry none.
    pub fn interaction(&self) -> Option<InteractionType> {
        match self {
            PointerInput::Click { .. } => Some(InteractionType::Click),
            PointerInput::DoubleClick { .. } => Some(InteractionType::DoubleClick),
            PointerInput::Hover { .. } => Some(InteractionType::Hover),
            PointerInput::DragStart { .. } => Some(InteractionType::DragStart),
            PointerInput::DragEnd { .. } => Some(InteractionType::DragEnd),
            PointerInput::LongPress { .. } => Some(InteractionType::LongPress),
            PointerInput::Move { .. } | PointerInput::Leave => None,
        }
    }
}
