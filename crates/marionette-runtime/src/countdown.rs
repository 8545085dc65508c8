//! Frame-driven countdown timer

/// A one-shot timer decremented by `dt` inside `update` rather than scheduled on a wall clock.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Countdown {
    remaining: Option<f64>,
}

impl Countdown {
    /// An idle countdown that never fires
    pub const fn idle() -> Self {
        Self { remaining: None }
    }

    pub fn start(&mut self, seconds: f64) {
        self.remaining = Some(seconds.max(0.0));
    }

    pub fn cancel(&mut self) {
        self.remaining = None;
    }

    pub fn is_running(&self) -> bool {
        self.remaining.is_some()
    }

    pub fn remaining(&self) -> Option<f64> {
        self.remaining
    }

    /// Advance by `dt`. Returns true exactly once, on the tick the countdown expires.
    pub fn tick(&mut self, dt: f64) -> bool {
        match self.remaining {
            Some(left) if left - dt <= 0.0 => {
                self.remaining = None;
                true
            }
            Some(left) => {
                self.remaining = Some(left - dt);
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_when_elapsed() {
        let mut cd = Countdown::idle();
        cd.start(1.0);
        assert!(!cd.tick(0.5));
        assert!(cd.tick(0.5));
        assert!(!cd.is_running());
        assert!(!cd.tick(10.0));
    }

    #[test]
    fn cancel_prevents_firing() {
        let mut cd = Countdown::idle();
        cd.start(0.1);
        cd.cancel();
        assert!(!cd.tick(1.0));
    }

    #[test]
    fn restart_replaces_remaining_time() {
        let mut cd = Countdown::idle();
        cd.start(1.0);
        cd.tick(0.9);
        cd.start(1.0);
        assert!(!cd.tick(0.5));
        assert_eq!(cd.remaining(), Some(0.5));
    }
}
