//! Head and eye follow toward the cursor

use marionette_core::{Vec2, Vec3};

/// Head rotation in radians
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadRotation {
    pub yaw: f32,
    pub pitch: f32,
}

/// Per-eye rotation in radians
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EyeRotation {
    pub left_yaw: f32,
    pub left_pitch: f32,
    pub right_yaw: f32,
    pub right_pitch: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hand {
    Left,
    Right,
}

const HEAD_YAW_RANGE: f32 = 0.4;
const HEAD_PITCH_RANGE: f32 = 0.2;
const EYE_YAW_RANGE: f32 = 0.5;
const EYE_PITCH_RANGE: f32 = 0.3;
/// Smoothing factors are specified per 60 Hz frame
const REFERENCE_RATE: f64 = 60.0;

/// Tracks the cursor in centered coordinates ([-1,1], +y up) and eases the
/// gaze toward it.
#[derive(Debug, Clone)]
pub struct GazeFollow {
    target: Vec2,
    smoothed: Vec2,
    smoothing: f32,
    grabbing_left: bool,
    grabbing_right: bool,
}

impl Default for GazeFollow {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl GazeFollow {
    pub fn new(smoothing: f32) -> Self {
        Self {
            target: Vec2::ZERO,
            smoothed: Vec2::ZERO,
            smoothing: smoothing.clamp(0.0, 1.0),
            grabbing_left: false,
            grabbing_right: false,
        }
    }

    /// Point in screen-normalized space, (0,0) top-left
    pub fn set_pointer(&mut self, point: Vec2) {
        self.target = Vec2::new(point.x * 2.0 - 1.0, -(point.y * 2.0 - 1.0));
    }

    /// Ease toward the target, independent of frame rate
    pub fn update(&mut self, dt: f64) {
        let frames = (dt * REFERENCE_RATE) as f32;
        let alpha = 1.0 - (1.0 - self.smoothing).powf(frames);
        self.smoothed = self.smoothed.lerp(&self.target, alpha);
    }

    pub fn centered_pointer(&self) -> Vec2 {
        self.target
    }

    pub fn head_rotation(&self) -> HeadRotation {
        HeadRotation {
            yaw: self.smoothed.x * HEAD_YAW_RANGE,
            pitch: self.smoothed.y * HEAD_PITCH_RANGE,
        }
    }

    pub fn eye_rotation(&self) -> EyeRotation {
        let yaw = self.smoothed.x * EYE_YAW_RANGE;
        let pitch = self.smoothed.y * EYE_PITCH_RANGE;
        EyeRotation {
            left_yaw: yaw,
            left_pitch: pitch,
            right_yaw: yaw,
            right_pitch: pitch,
        }
    }

    pub fn set_grabbing(&mut self, hand: Hand, grabbing: bool) {
        match hand {
            Hand::Left => self.grabbing_left = grabbing,
            Hand::Right => self.grabbing_right = grabbing,
        }
    }

    pub fn is_grabbing(&self, hand: Hand) -> bool {
        match hand {
            Hand::Left => self.grabbing_left,
            Hand::Right => self.grabbing_right,
        }
    }

    /// Avatar-local reach target for a hand that is grabbing toward the cursor
    pub fn hand_reach_target(&self, hand: Hand) -> Option<Vec3> {
        if !self.is_grabbing(hand) {
            return None;
        }
        Some(Vec3::new(
            self.target.x * 0.4,
            1.0 + self.target.y * 0.3,
            0.3,
        ))
    }

    pub fn is_cursor_near_avatar(&self) -> bool {
        self.target.x.abs() < 1.5 && self.target.y.abs() < 1.5
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.smoothing);
    }
}
