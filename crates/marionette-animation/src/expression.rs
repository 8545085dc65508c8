//! Facial expression weights
//!
//! `ExpressionBlender` eases one emotion channel toward a target while every
//! other tracked channel fades toward zero on the same curve. `Blinker` and
//! `LipSync` drive their own channels (`blink`, the mouth visemes) and are
//! never faded by emotion blends.

use rand::Rng;
use std::collections::BTreeMap;

/// Channel driven by `Blinker`
pub const BLINK_CHANNEL: &str = "blink";

/// Mouth channels driven by `LipSync`
pub const MOUTH_CHANNELS: [&str; 3] = ["aa", "ee", "oh"];

/// Handle for one `blend_to` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlendId(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct BlendCompletion {
    pub id: BlendId,
    pub channel: String,
    /// True when a later `blend_to` took over before this one finished
    pub interrupted: bool,
}

#[derive(Debug, Clone)]
struct ActiveBlend {
    id: BlendId,
    channel: String,
    start: f32,
    target: f32,
    elapsed: f64,
    duration: f64,
    /// Weights of the competing channels when the blend started
    fade_from: Vec<(String, f32)>,
}

pub fn ease_in_out_quad(t: f32) -> f32 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

#[derive(Debug, Default)]
pub struct ExpressionBlender {
    weights: BTreeMap<String, f32>,
    active: Option<ActiveBlend>,
    finished: Vec<BlendCompletion>,
    next_id: u64,
}

impl ExpressionBlender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start easing `channel` toward `target` over `duration` seconds.
    ///
    /// The blend starts from the channel's current weight, so calling this
    /// again mid-blend restarts smoothly rather than queueing.
    pub fn blend_to(&mut self, channel: &str, target: f32, duration: f64) -> BlendId {
        let id = BlendId(self.next_id);
        self.next_id += 1;

        if let Some(previous) = self.active.take() {
            self.finished.push(BlendCompletion {
                id: previous.id,
                channel: previous.channel,
                interrupted: true,
            });
        }

        let fade_from = self
            .weights
            .iter()
            .filter(|(name, weight)| name.as_str() != channel && **weight > 0.0)
            .map(|(name, weight)| (name.clone(), *weight))
            .collect();

        self.active = Some(ActiveBlend {
            id,
            channel: channel.to_string(),
            start: self.weight(channel),
            target: target.clamp(0.0, 1.0),
            elapsed: 0.0,
            duration: duration.max(0.0),
            fade_from,
        });
        id
    }

    /// Advance the active blend. Returns blends that finished or were superseded.
    pub fn update(&mut self, dt: f64) -> Vec<BlendCompletion> {
        let mut done = std::mem::take(&mut self.finished);

        let Some(blend) = self.active.as_mut() else {
            return done;
        };
        blend.elapsed += dt;
        let progress = if blend.duration <= 0.0 {
            1.0
        } else {
            (blend.elapsed / blend.duration).clamp(0.0, 1.0) as f32
        };
        let eased = ease_in_out_quad(progress);

        self.weights.insert(
            blend.channel.clone(),
            blend.start + (blend.target - blend.start) * eased,
        );
        for (name, from) in &blend.fade_from {
            self.weights.insert(name.clone(), from * (1.0 - eased));
        }

        if progress >= 1.0 {
            done.push(BlendCompletion {
                id: blend.id,
                channel: blend.channel.clone(),
                interrupted: false,
            });
            self.active = None;
            self.weights.retain(|_, weight| *weight > 0.0);
        }
        done
    }

    pub fn weight(&self, channel: &str) -> f32 {
        self.weights.get(channel).copied().unwrap_or(0.0)
    }

    /// Tracked channels and their weights
    pub fn weights(&self) -> impl Iterator<Item = (&str, f32)> {
        self.weights.iter().map(|(name, w)| (name.as_str(), *w))
    }

    /// Whether the blend has finished (or was superseded)
    pub fn is_settled(&self, id: BlendId) -> bool {
        self.active.as_ref().map_or(true, |blend| blend.id != id)
    }

    pub fn is_blending(&self) -> bool {
        self.active.is_some()
    }

    /// Channel the active blend is driving
    pub fn blending_channel(&self) -> Option<&str> {
        self.active.as_ref().map(|blend| blend.channel.as_str())
    }

    /// Drop every channel and the active blend
    pub fn clear(&mut self) {
        self.weights.clear();
        self.active = None;
        self.finished.clear();
    }
}

const BLINK_DURATION: f64 = 0.15;
const BLINK_INTERVAL_MIN: f64 = 2.0;
const BLINK_INTERVAL_MAX: f64 = 7.0;

/// Periodic eye blinks on the `blink` channel
#[derive(Debug, Clone)]
pub struct Blinker {
    until_next: f64,
    /// Time left in the current blink, if one is in progress
    closing: Option<f64>,
    held_closed: bool,
}

impl Blinker {
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            until_next: rng.gen_range(BLINK_INTERVAL_MIN..BLINK_INTERVAL_MAX),
            closing: None,
            held_closed: false,
        }
    }

    /// Keep the eyes shut (sleeping) or release them
    pub fn hold_closed(&mut self, closed: bool) {
        self.held_closed = closed;
    }

    pub fn update<R: Rng + ?Sized>(&mut self, dt: f64, rng: &mut R) {
        if let Some(left) = self.closing.as_mut() {
            *left -= dt;
            if *left <= 0.0 {
                self.closing = None;
            }
            return;
        }
        self.until_next -= dt;
        if self.until_next <= 0.0 {
            self.closing = Some(BLINK_DURATION);
            self.until_next = rng.gen_range(BLINK_INTERVAL_MIN..BLINK_INTERVAL_MAX);
        }
    }

    pub fn is_blinking(&self) -> bool {
        self.closing.is_some()
    }

    /// Weight for the `blink` channel: a triangular close/open pulse
    pub fn weight(&self) -> f32 {
        if self.held_closed {
            return 1.0;
        }
        match self.closing {
            Some(left) => {
                let t = (1.0 - left / BLINK_DURATION).clamp(0.0, 1.0) as f32;
                1.0 - (2.0 * t - 1.0).abs()
            }
            None => 0.0,
        }
    }
}

/// Fraction of the gap to the target closed per 1/60 s
const LIP_SMOOTHING: f32 = 0.3;

/// Speech energy to mouth shapes
#[derive(Debug, Clone, Default)]
pub struct LipSync {
    speaking: bool,
    energy: f32,
    time: f64,
    aa: f32,
    ee: f32,
    oh: f32,
}

impl LipSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_speech(&mut self, speaking: bool, energy: f32) {
        self.speaking = speaking;
        self.energy = if energy.is_finite() { energy.max(0.0) } else { 0.0 };
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn update(&mut self, dt: f64) {
        self.time += dt;
        let (aa, ee, oh) = if self.speaking {
            let open = (self.energy * 3.0).min(1.0);
            let phase = (self.time * 10.0) as f32;
            let variation = phase.sin() * 0.3;
            (
                open * (variation + 0.7),
                open * (1.0 - variation) * 0.5,
                open * phase.cos().abs() * 0.4,
            )
        } else {
            (0.0, 0.0, 0.0)
        };
        let k = 1.0 - (1.0 - LIP_SMOOTHING).powf(dt.max(0.0) as f32 * 60.0);
        self.aa += (aa - self.aa) * k;
        self.ee += (ee - self.ee) * k;
        self.oh += (oh - self.oh) * k;
    }

    /// Current (channel, weight) pairs
    pub fn weights(&self) -> [(&'static str, f32); 3] {
        [
            (MOUTH_CHANNELS[0], self.aa.clamp(0.0, 1.0)),
            (MOUTH_CHANNELS[1], self.ee.clamp(0.0, 1.0)),
            (MOUTH_CHANNELS[2], self.oh.clamp(0.0, 1.0)),
        ]
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn blend_reaches_target_and_fades_competitors() {
        let mut blender = ExpressionBlender::new();
        blender.blend_to("happy", 0.9, 0.0);
        blender.update(0.0);
        assert_eq!(blender.weight("happy"), 0.9);

        let id = blender.blend_to("sad", 0.7, 2.0);
        blender.update(1.0);
        // Halfway through ease-in-out: both channels at half of their travel
        assert!((blender.weight("sad") - 0.35).abs() < 1e-5);
        assert!((blender.weight("happy") - 0.45).abs() < 1e-5);
        assert!(!blender.is_settled(id));

        let done = blender.update(1.0);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].channel, "sad");
        assert!(!done[0].interrupted);
        assert!(blender.is_settled(id));
        assert!((blender.weight("sad") - 0.7).abs() < 1e-6);
        assert_eq!(blender.weight("happy"), 0.0);
        // Zeroed channels stop being tracked
        assert_eq!(blender.weights().count(), 1);
    }

    #[test]
    fn restart_begins_from_current_weight() {
        let mut blender = ExpressionBlender::new();
        blender.blend_to("happy", 1.0, 1.0);
        blender.update(0.5);
        let mid = blender.weight("happy");
        assert!((mid - 0.5).abs() < 1e-5);

        blender.blend_to("happy", 0.0, 1.0);
        let done = blender.update(0.0);
        assert!(done[0].interrupted);
        assert!((blender.weight("happy") - mid).abs() < 1e-6);
        blender.update(1.0);
        assert_eq!(blender.weight("happy"), 0.0);
    }

    #[test]
    fn ease_curve_is_symmetric() {
        assert_eq!(ease_in_out_quad(0.0), 0.0);
        assert_eq!(ease_in_out_quad(1.0), 1.0);
        assert!((ease_in_out_quad(0.25) + ease_in_out_quad(0.75) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn blinker_pulses_and_holds() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut blinker = Blinker::new(&mut rng);
        let mut saw_blink = false;
        for _ in 0..(8.0 / 0.01) as usize {
            blinker.update(0.01, &mut rng);
            let w = blinker.weight();
            assert!((0.0..=1.0).contains(&w));
            saw_blink |= w > 0.5;
        }
        assert!(saw_blink);

        blinker.hold_closed(true);
        assert_eq!(blinker.weight(), 1.0);
    }

    #[test]
    fn lip_sync_closes_at_the_same_rate_at_any_frame_rate() {
        let mut open = LipSync::new();
        open.set_speech(true, 0.5);
        for _ in 0..30 {
            open.update(1.0 / 60.0);
        }
        open.set_speech(false, 0.0);
        let (mut slow, mut fast) = (open.clone(), open);
        for _ in 0..15 {
            slow.update(1.0 / 30.0);
        }
        for _ in 0..60 {
            fast.update(1.0 / 120.0);
        }
        assert!(slow.weights()[0].1 > 0.0);
        for ((_, a), (_, b)) in slow.weights().iter().zip(fast.weights().iter()) {
            assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
        }
    }

    #[test]
    fn lip_sync_opens_only_while_speaking() {
        let mut lips = LipSync::new();
        lips.update(0.1);
        assert!(lips.weights().iter().all(|(_, w)| *w == 0.0));

        lips.set_speech(true, 0.5);
        for _ in 0..30 {
            lips.update(1.0 / 60.0);
        }
        assert!(lips.weights()[0].1 > 0.3);

        lips.set_speech(false, 0.0);
        for _ in 0..60 {
            lips.update(1.0 / 60.0);
        }
        assert!(lips.weights().iter().all(|(_, w)| *w < 0.01));
    }
}
