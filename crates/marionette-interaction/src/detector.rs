//! Interaction detector: turns the raw pointer stream into interaction events

use crate::follow::{GazeFollow, Hand};
use crate::gesture::{GestureConfig, PetGesture};
use crate::zones::{Zone, ZoneLayout};
use marionette_core::Vec2;
use marionette_runtime::PointerInput;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// Click inside a zone
    Touch,
    /// Petting stroke over the head
    Pat,
    /// Pointer entered a zone
    Hover,
    /// Pointer reached for a hand
    Grab,
}

/// A fire-and-forget notification for upstream reactions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionEvent {
    pub kind: InteractionKind,
    pub zone: Zone,
    /// Detector time in seconds
    pub timestamp: f64,
    /// Distance from the zone center in normalized units
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub layout: ZoneLayout,
    pub gesture: GestureConfig,
    /// Seconds before the same zone can report another touch
    pub touch_cooldown: f64,
    /// Per-frame gaze smoothing factor
    pub follow_smoothing: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            layout: ZoneLayout::default(),
            gesture: GestureConfig::default(),
            touch_cooldown: 1.0,
            follow_smoothing: 0.1,
        }
    }
}

pub struct InteractionDetector {
    layout: ZoneLayout,
    gesture: PetGesture,
    follow: GazeFollow,
    touch_cooldown: f64,
    touch_cooldowns: HashMap<Zone, f64>,
    current_zone: Option<Zone>,
    clock: f64,
}

impl Default for InteractionDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl InteractionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            layout: config.layout,
            gesture: PetGesture::new(config.gesture),
            follow: GazeFollow::new(config.follow_smoothing),
            touch_cooldown: config.touch_cooldown,
            touch_cooldowns: HashMap::new(),
            current_zone: None,
            clock: 0.0,
        }
    }

    pub fn classify(&self, point: Vec2) -> Option<Zone> {
        self.layout.classify(point).map(|(zone, _)| zone)
    }

    pub fn layout_mut(&mut self) -> &mut ZoneLayout {
        &mut self.layout
    }

    pub fn current_zone(&self) -> Option<Zone> {
        self.current_zone
    }

    pub fn follow(&self) -> &GazeFollow {
        &self.follow
    }

    pub fn gesture(&self) -> &PetGesture {
        &self.gesture
    }

    /// Consume one pointer sample and return the events it produced
    pub fn handle(&mut self, input: &PointerInput) -> Vec<InteractionEvent> {
        let mut events = Vec::new();

        let Some(position) = input.position() else {
            self.leave_zone();
            return events;
        };

        self.follow.set_pointer(position);
        let hit = self.layout.classify(position);
        let zone = hit.map(|(z, _)| z);

        if zone != self.current_zone {
            self.leave_zone();
            if let Some((entered, distance)) = hit {
                events.push(self.event(InteractionKind::Hover, entered, distance));
                match entered {
                    Zone::LeftHand => self.follow.set_grabbing(Hand::Left, true),
                    Zone::RightHand => self.follow.set_grabbing(Hand::Right, true),
                    _ => {}
                }
                if entered.is_hand() {
                    events.push(self.event(InteractionKind::Grab, entered, distance));
                }
            }
            self.current_zone = zone;
        }

        let Some((zone, distance)) = hit else {
            return events;
        };

        if zone == Zone::Head && self.gesture.push(position) {
            events.push(self.event(InteractionKind::Pat, zone, distance));
        }

        if matches!(input, PointerInput::Click { .. }) {
            let ready = self
                .touch_cooldowns
                .get(&zone)
                .map_or(true, |left| *left <= 0.0);
            if ready {
                self.touch_cooldowns.insert(zone, self.touch_cooldown);
                events.push(self.event(InteractionKind::Touch, zone, distance));
            }
        }

        for event in &events {
            tracing::debug!(kind = ?event.kind, zone = %event.zone, "interaction detected");
        }
        events
    }

    /// Advance detector time: cooldowns, gesture inactivity, gaze smoothing
    pub fn update(&mut self, dt: f64) {
        self.clock += dt;
        self.gesture.update(dt);
        self.follow.update(dt);
        for left in self.touch_cooldowns.values_mut() {
            *left -= dt;
        }
        self.touch_cooldowns.retain(|_, left| *left > 0.0);
    }

    /// Forget all pointer state
    pub fn reset(&mut self) {
        self.gesture = PetGesture::new(*self.gesture.config());
        self.follow.reset();
        self.touch_cooldowns.clear();
        self.current_zone = None;
    }

    fn leave_zone(&mut self) {
        match self.current_zone.take() {
            Some(Zone::Head) => self.gesture.clear(),
            Some(Zone::LeftHand) => self.follow.set_grabbing(Hand::Left, false),
            Some(Zone::RightHand) => self.follow.set_grabbing(Hand::Right, false),
            _ => {}
        }
    }

    fn event(&self, kind: InteractionKind, zone: Zone, distance: f32) -> InteractionEvent {
        InteractionEvent {
            kind,
            zone,
            timestamp: self.clock,
            distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moves(points: &[(f32, f32)]) -> Vec<PointerInput> {
        points
            .iter()
            .map(|&(x, y)| PointerInput::Move {
                position: Vec2::new(x, y),
            })
            .collect()
    }

    fn pat_stroke() -> Vec<PointerInput> {
        moves(&[
            (0.46, 0.15),
            (0.48, 0.13),
            (0.50, 0.15),
            (0.52, 0.13),
            (0.54, 0.15),
        ])
    }

    fn feed(detector: &mut InteractionDetector, inputs: &[PointerInput]) -> Vec<InteractionEvent> {
        let mut out = Vec::new();
        for input in inputs {
            out.extend(detector.handle(input));
            detector.update(1.0 / 60.0);
        }
        out
    }

    fn count(events: &[InteractionEvent], kind: InteractionKind) -> usize {
        events.iter().filter(|e| e.kind == kind).count()
    }

    #[test]
    fn pat_stroke_yields_one_pat_and_cooldown_blocks_replay() {
        let mut detector = InteractionDetector::default();
        let first = feed(&mut detector, &pat_stroke());
        assert_eq!(count(&first, InteractionKind::Pat), 1);
        assert_eq!(count(&first, InteractionKind::Hover), 1);

        let second = feed(&mut detector, &pat_stroke());
        assert_eq!(count(&second, InteractionKind::Pat), 0);
    }

    #[test]
    fn pat_available_again_after_cooldown() {
        let mut detector = InteractionDetector::default();
        feed(&mut detector, &pat_stroke());
        detector.update(1.1);
        let again = feed(&mut detector, &pat_stroke());
        assert_eq!(count(&again, InteractionKind::Pat), 1);
    }

    #[test]
    fn leaving_head_clears_history() {
        let mut detector = InteractionDetector::default();
        let stroke = pat_stroke();
        feed(&mut detector, &stroke[..3]);
        assert_eq!(detector.gesture().sample_count(), 3);
        detector.handle(&PointerInput::Leave);
        assert_eq!(detector.gesture().sample_count(), 0);
        assert_eq!(detector.current_zone(), None);
        let rest = feed(&mut detector, &stroke[3..]);
        assert_eq!(count(&rest, InteractionKind::Pat), 0);
    }

    #[test]
    fn click_touch_has_per_zone_cooldown() {
        let mut detector = InteractionDetector::default();
        let head = PointerInput::Click {
            position: Vec2::new(0.5, 0.15),
        };
        let body = PointerInput::Click {
            position: Vec2::new(0.5, 0.5),
        };
        assert_eq!(count(&detector.handle(&head), InteractionKind::Touch), 1);
        assert_eq!(count(&detector.handle(&head), InteractionKind::Touch), 0);
        assert_eq!(count(&detector.handle(&body), InteractionKind::Touch), 1);
        detector.update(1.0);
        assert_eq!(count(&detector.handle(&head), InteractionKind::Touch), 1);
    }

    #[test]
    fn entering_hand_zone_grabs() {
        let mut detector = InteractionDetector::default();
        let events = feed(&mut detector, &moves(&[(0.02, 0.98), (0.2, 0.6)]));
        assert_eq!(count(&events, InteractionKind::Grab), 1);
        assert_eq!(events[0].zone, Zone::LeftHand);
        assert!(detector.follow().is_grabbing(Hand::Left));

        feed(&mut detector, &moves(&[(0.02, 0.98)]));
        assert!(!detector.follow().is_grabbing(Hand::Left));
    }

    #[test]
    fn hover_fires_only_on_zone_change() {
        let mut detector = InteractionDetector::default();
        let events = feed(&mut detector, &moves(&[(0.5, 0.5), (0.51, 0.5), (0.5, 0.15)]));
        let zones: Vec<Zone> = events
            .iter()
            .filter(|e| e.kind == InteractionKind::Hover)
            .map(|e| e.zone)
            .collect();
        assert_eq!(zones, vec![Zone::Body, Zone::Head]);
    }

    #[test]
    fn timestamps_follow_detector_time() {
        let mut detector = InteractionDetector::default();
        detector.update(2.5);
        let events = detector.handle(&PointerInput::Move {
            position: Vec2::new(0.5, 0.5),
        });
        assert_eq!(events[0].timestamp, 2.5);
    }
}
