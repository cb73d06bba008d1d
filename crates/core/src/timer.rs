//! Frame timer.

use std::time::{Duration, Instant};

/// Measures total run time and per-frame deltas.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    frame_count: u32,
    fps_window_start: Instant,
}

/// Frame statistics sampled over roughly one second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub fps: f32,
    pub ms_per_frame: f32,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frame_count: 0,
            fps_window_start: now,
        }
    }

    /// Total time since the timer was created or reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Total time in seconds.
    pub fn total_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Time elapsed since the previous call.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Delta time in seconds since the previous tick.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Counts one frame and returns fresh statistics once per second.
    pub fn count_frame(&mut self) -> Option<FrameStats> {
        self.frame_count += 1;
        let window = self.fps_window_start.elapsed().as_secs_f32();
        if window < 1.0 {
            return None;
        }

        let fps = self.frame_count as f32 / window;
        self.frame_count = 0;
        self.fps_window_start = Instant::now();
        Some(FrameStats {
            fps,
            ms_per_frame: 1000.0 / fps,
        })
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_is_monotonic() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(2));
        let first = timer.tick();
        assert!(first >= Duration::from_millis(2));
        assert!(timer.total_secs() >= first.as_secs_f32());
    }

    #[test]
    fn test_count_frame_waits_for_full_window() {
        let mut timer = Timer::new();
        assert!(timer.count_frame().is_none());
    }
}
