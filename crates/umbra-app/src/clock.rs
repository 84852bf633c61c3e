//! Frame timing for the viewer.
//!
//! Rendering is variable rate: each frame gets the real elapsed time, clamped
//! so a stall (window drag, debugger break) does not produce one huge step.

use std::time::{Duration, Instant};

use tracing::warn;

/// Longest delta handed to the scene, in seconds.
pub const MAX_FRAME_TIME: f32 = 0.25;

/// Measures the time between successive frames.
#[derive(Debug)]
pub struct FrameClock {
    previous: Instant,
    started: Instant,
    frames: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            previous: now,
            started: now,
            frames: 0,
        }
    }

    /// Seconds since the previous call, clamped to [`MAX_FRAME_TIME`].
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    /// [`tick`](Self::tick) with an explicit timestamp.
    pub fn tick_at(&mut self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.previous).as_secs_f32();
        self.previous = now;
        self.frames += 1;
        if elapsed > MAX_FRAME_TIME {
            warn!(
                "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
                elapsed * 1000.0,
                MAX_FRAME_TIME * 1000.0
            );
            return MAX_FRAME_TIME;
        }
        elapsed
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn uptime(&self) -> Duration {
        self.previous.saturating_duration_since(self.started)
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_matches_elapsed_time() {
        let mut clock = FrameClock::new();
        let start = clock.previous;
        let delta = clock.tick_at(start + Duration::from_millis(16));
        assert!((delta - 0.016).abs() < 1e-4);
        assert_eq!(clock.frame_count(), 1);
    }

    #[test]
    fn test_long_frames_are_clamped() {
        let mut clock = FrameClock::new();
        let start = clock.previous;
        let delta = clock.tick_at(start + Duration::from_secs(3));
        assert_eq!(delta, MAX_FRAME_TIME);
        assert_eq!(clock.uptime(), Duration::from_secs(3));
    }

    #[test]
    fn test_time_going_backwards_yields_zero() {
        let mut clock = FrameClock::new();
        let start = clock.previous;
        clock.tick_at(start + Duration::from_millis(10));
        let delta = clock.tick_at(start);
        assert_eq!(delta, 0.0);
    }
}
