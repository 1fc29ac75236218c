//! Frame timing for the application loop.

use std::time::{Duration, Instant};

/// Upper bound on a single frame's delta, so a stall (window drag, swapchain
/// recreation, a minimized window) does not teleport animated state.
const MAX_DELTA: Duration = Duration::from_millis(250);

/// Measures per-frame delta time and a running frame rate.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    frames: u64,
    window_start: Instant,
    window_frames: u32,
    fps: f32,
}

impl FrameTimer {
    /// Create a timer starting now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frames: 0,
            window_start: now,
            window_frames: 0,
            fps: 0.0,
        }
    }

    /// Advance one frame and return the clamped delta in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        self.tick_at(now)
    }

    fn tick_at(&mut self, now: Instant) -> f32 {
        let delta = now.saturating_duration_since(self.last_tick).min(MAX_DELTA);
        self.last_tick = now;
        self.frames += 1;
        self.window_frames += 1;

        let window = now.saturating_duration_since(self.window_start);
        if window >= Duration::from_secs(1) {
            self.fps = self.window_frames as f32 / window.as_secs_f32();
            self.window_frames = 0;
            self.window_start = now;
        }

        delta.as_secs_f32()
    }

    /// Total time since creation.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Frames ticked so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Frame rate averaged over the last full second.
    pub fn fps(&self) -> f32 {
        self.fps
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_is_clamped() {
        let mut timer = FrameTimer::new();
        let later = timer.last_tick + Duration::from_secs(5);
        let delta = timer.tick_at(later);
        assert!((delta - MAX_DELTA.as_secs_f32()).abs() < 1e-6);
    }

    #[test]
    fn test_frame_count_and_fps() {
        let mut timer = FrameTimer::new();
        let base = timer.last_tick;
        for i in 1..=60 {
            timer.tick_at(base + Duration::from_millis(i * 17));
        }
        assert_eq!(timer.frame_count(), 60);
        // 60 frames over 1.02s
        assert!(timer.fps() > 50.0 && timer.fps() < 70.0);
    }
}
