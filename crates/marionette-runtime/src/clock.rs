//! Frame clock with fixed-timestep accumulator

use std::time::Instant;

/// Tracks virtual time for the frame loop.
///
/// Time only moves when the clock is ticked or advanced, so a paused host or a
/// test running faster than real time sees exactly the deltas it feeds in.
pub struct FrameClock {
    /// Total elapsed time in seconds
    pub total_time: f64,
    /// Time since last frame in seconds
    pub delta_time: f64,
    /// Fixed timestep interval (default: 1/60 second)
    pub fixed_timestep: f64,
    /// Largest delta accepted from a single frame
    pub max_delta: f64,
    frame_count: u64,
    last_instant: Option<Instant>,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self {
            total_time: 0.0,
            delta_time: 0.0,
            fixed_timestep: 1.0 / 60.0,
            max_delta: 0.25,
            frame_count: 0,
            last_instant: None,
        }
    }
}

impl FrameClock {
    /// Create a new clock with default 60Hz fixed timestep
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock with a custom fixed timestep
    pub fn with_fixed_timestep(hz: f64) -> Self {
        Self {
            fixed_timestep: 1.0 / hz,
            ..Self::default()
        }
    }

    /// Advance by the real time elapsed since the previous tick. The first tick yields 0.
    pub fn tick(&mut self) -> f64 {
        let now = Instant::now();
        let elapsed = match self.last_instant.replace(now) {
            Some(last) => now.duration_since(last).as_secs_f64(),
            None => 0.0,
        };
        self.advance(elapsed)
    }

    /// Advance by one fixed timestep. Used by headless simulation.
    pub fn step(&mut self) -> f64 {
        self.advance(self.fixed_timestep)
    }

    /// Advance by an explicit delta, clamped to `max_delta` to avoid huge catch-up jumps.
    pub fn advance(&mut self, dt: f64) -> f64 {
        self.delta_time = dt.clamp(0.0, self.max_delta);
        self.total_time += self.delta_time;
        self.frame_count += 1;
        self.delta_time
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
