//! Petting gesture recognition
//!
//! A pat is a short back-and-forth stroke: the turn direction between
//! consecutive motion vectors flips sign repeatedly within a few samples.

use marionette_core::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Maximum number of positions kept in the rolling window
    pub window: usize,
    /// Sign reversals within the window needed to recognize a pat
    pub required_reversals: usize,
    /// Seconds after a pat during which no further pat is reported
    pub cooldown: f64,
    /// Seconds without samples after which the window is discarded
    pub inactivity_reset: f64,
    /// Motion shorter than this is treated as no motion
    pub min_motion: f32,
    /// Turns smaller than this (radians) carry no direction
    pub min_angle: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            window: 5,
            required_reversals: 2,
            cooldown: 1.0,
            inactivity_reset: 0.5,
            min_motion: 1e-4,
            min_angle: 0.05,
        }
    }
}

/// Rolling-window pat recognizer. Time advances only through `update`.
#[derive(Debug, Clone)]
pub struct PetGesture {
    config: GestureConfig,
    samples: VecDeque<Vec2>,
    cooldown_left: f64,
    since_last_sample: f64,
}

impl Default for PetGesture {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}

impl PetGesture {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            samples: VecDeque::with_capacity(config.window),
            config,
            cooldown_left: 0.0,
            since_last_sample: 0.0,
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// Feed one pointer position. Returns true when this sample completes a pat.
    pub fn push(&mut self, position: Vec2) -> bool {
        self.since_last_sample = 0.0;

        if let Some(last) = self.samples.back() {
            if last.distance(&position) < self.config.min_motion {
                return false;
            }
        }

        self.samples.push_back(position);
        while self.samples.len() > self.config.window.max(3) {
            self.samples.pop_front();
        }

        if self.reversals() < self.config.required_reversals {
            return false;
        }
        if self.in_cooldown() {
            return false;
        }

        self.samples.clear();
        self.cooldown_left = self.config.cooldown;
        true
    }

    /// Count direction reversals across the current window
    pub fn reversals(&self) -> usize {
        let motions: Vec<Vec2> = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .map(|(a, b)| *b - *a)
            .collect();

        let mut reversals = 0;
        let mut last_sign = 0.0f32;
        for (a, b) in motions.iter().zip(motions.iter().skip(1)) {
            let angle = a.signed_angle_to(b);
            if angle.abs() < self.config.min_angle {
                continue;
            }
            let sign = angle.signum();
            if last_sign != 0.0 && sign != last_sign {
                reversals += 1;
            }
            last_sign = sign;
        }
        reversals
    }

    pub fn update(&mut self, dt: f64) {
        self.cooldown_left = (self.cooldown_left - dt).max(0.0);
        if self.samples.is_empty() {
            return;
        }
        self.since_last_sample += dt;
        if self.since_last_sample >= self.config.inactivity_reset {
            self.samples.clear();
        }
    }

    pub fn in_cooldown(&self) -> bool {
        self.cooldown_left > 0.0
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Drop the rolling window. The cooldown keeps running.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.since_last_sample = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zigzag(offset: f32) -> Vec<Vec2> {
        (0..5)
            .map(|i| {
                let y = if i % 2 == 0 { 0.15 } else { 0.13 };
                Vec2::new(0.46 + offset + i as f32 * 0.02, y)
            })
            .collect()
    }

    #[test]
    fn zigzag_triggers_one_pat() {
        let mut gesture = PetGesture::default();
        let results: Vec<bool> = zigzag(0.0).into_iter().map(|p| gesture.push(p)).collect();
        assert_eq!(results, vec![false, false, false, false, true]);
        assert_eq!(gesture.sample_count(), 0);
        assert!(gesture.in_cooldown());
    }

    #[test]
    fn straight_line_is_not_a_pat() {
        let mut gesture = PetGesture::default();
        for i in 0..20 {
            assert!(!gesture.push(Vec2::new(0.4 + i as f32 * 0.01, 0.15)));
        }
        assert_eq!(gesture.reversals(), 0);
    }

    #[test]
    fn cooldown_suppresses_repeat() {
        let mut gesture = PetGesture::default();
        let first: usize = zigzag(0.0).into_iter().filter(|p| gesture.push(*p)).count();
        gesture.update(0.5);
        let second: usize = zigzag(0.0).into_iter().filter(|p| gesture.push(*p)).count();
        assert_eq!(first, 1);
        assert_eq!(second, 0);

        gesture.update(0.6);
        assert!(!gesture.in_cooldown());
        gesture.clear();
        let third: usize = zigzag(0.0).into_iter().filter(|p| gesture.push(*p)).count();
        assert_eq!(third, 1);
    }

    #[test]
    fn repeated_positions_are_ignored() {
        let mut gesture = PetGesture::default();
        let p = Vec2::new(0.5, 0.15);
        gesture.push(p);
        gesture.push(p);
        gesture.push(p);
        assert_eq!(gesture.sample_count(), 1);
    }

    #[test]
    fn inactivity_clears_window() {
        let mut gesture = PetGesture::default();
        for p in zigzag(0.0).into_iter().take(3) {
            gesture.push(p);
        }
        gesture.update(0.3);
        assert_eq!(gesture.sample_count(), 3);
        gesture.update(0.3);
        assert_eq!(gesture.sample_count(), 0);
    }

    #[test]
    fn window_is_bounded() {
        let mut gesture = PetGesture::default();
        for i in 0..12 {
            gesture.push(Vec2::new(0.4 + i as f32 * 0.01, 0.15));
        }
        assert_eq!(gesture.sample_count(), 5);
    }
}
