//! Simulation clock.
//!
//! The scheduler advances a [`Time`] once per frame and writes
//! [`Time::elapsed`] into the parameter block. A fixed delta makes stepping
//! deterministic (tests, headless runs); otherwise the wall clock is used.
//!
//! ```ignore
//! let mut time = Time::new();
//! time.set_fixed_delta(Some(1.0 / 60.0));
//! let (elapsed, delta) = time.update();
//! ```

use std::time::{Duration, Instant};

/// Frame timing: elapsed and delta seconds, frame count, fps, pause.
#[derive(Debug)]
pub struct Time {
    last_frame: Instant,
    elapsed_secs: f32,
    delta_secs: f32,
    frame_count: u64,
    fps: f32,
    fps_frame_count: u64,
    fps_update_time: Instant,
    fps_update_interval: Duration,
    paused: bool,
    fixed_delta: Option<f32>,
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_frame: now,
            elapsed_secs: 0.0,
            delta_secs: 0.0,
            frame_count: 0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: now,
            fps_update_interval: Duration::from_millis(500),
            paused: false,
            fixed_delta: None,
        }
    }

    /// Clock that advances by exactly `delta` seconds per update.
    pub fn fixed(delta: f32) -> Self {
        let mut time = Self::new();
        time.set_fixed_delta(Some(delta));
        time
    }

    /// Advance one frame. Returns `(elapsed, delta)` in seconds.
    ///
    /// Elapsed time accumulates deltas, so pausing stops it without any
    /// bookkeeping on resume.
    pub fn update(&mut self) -> (f32, f32) {
        let now = Instant::now();
        let raw_delta = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        if self.paused {
            self.delta_secs = 0.0;
            return (self.elapsed_secs, 0.0);
        }

        self.delta_secs = self.fixed_delta.unwrap_or(raw_delta);
        self.elapsed_secs += self.delta_secs;
        self.frame_count += 1;

        let fps_elapsed = now.duration_since(self.fps_update_time);
        if fps_elapsed >= self.fps_update_interval {
            let frames_since = self.frame_count - self.fps_frame_count;
            self.fps = frames_since as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = self.frame_count;
            self.fps_update_time = now;
        }

        (self.elapsed_secs, self.delta_secs)
    }

    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed_secs
    }

    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    /// Frames advanced since start (paused updates excluded).
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// `None` switches back to wall-clock deltas.
    pub fn set_fixed_delta(&mut self, delta: Option<f32>) {
        self.fixed_delta = delta.map(|d| d.max(0.0));
    }

    /// Back to zero, keeping the fixed-delta setting.
    pub fn reset(&mut self) {
        let fixed = self.fixed_delta;
        *self = Self::new();
        self.fixed_delta = fixed;
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}
