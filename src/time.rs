//! Frame clock shared by the simulation, the tweens and the VAT playback.
//!
//! The clock is advanced once per frame, either from wall time with
//! [`FrameClock::tick`] or by an explicit delta with [`FrameClock::advance`]
//! (deterministic stepping for tests and headless runs).
//!
//! # Example
//!
//! ```ignore
//! use vatflow::time::FrameClock;
//!
//! let mut clock = FrameClock::new();
//!
//! // In your frame callback:
//! let dt = clock.tick();
//!
//! println!("Elapsed: {:.2}s", clock.elapsed());
//! println!("Frame: {}", clock.frame());
//! ```

use std::time::{Duration, Instant};

/// Time tracking for the render loop.
///
/// Besides elapsed and delta time it keeps two frame counters: the integer
/// `frame`, whose parity selects the particle position buffer (see
/// [`PingPongPair::align_to_frame`](crate::target::PingPongPair::align_to_frame)),
/// and `scaled_frame`, which drives VAT playback and the focus animation.
#[derive(Debug)]
pub struct FrameClock {
    /// When the last frame occurred.
    last_frame: Instant,
    /// Total elapsed time in seconds.
    elapsed_secs: f32,
    /// Time since last frame in seconds.
    delta_secs: f32,
    /// Total frames since start or the last alignment.
    frame_count: u64,
    /// Frame counter scaled by playback speed.
    scaled_frame: f32,
    /// Calculated FPS (updated periodically).
    fps: f32,
    /// Frame count at last FPS update.
    fps_frame_count: u64,
    /// Time of last FPS calculation.
    fps_update_time: Instant,
    /// How often to update FPS calculation.
    fps_update_interval: Duration,
}

impl FrameClock {
    /// Create a new clock starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_frame: now,
            elapsed_secs: 0.0,
            delta_secs: 0.0,
            frame_count: 0,
            scaled_frame: 0.0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: now,
            fps_update_interval: Duration::from_millis(500),
        }
    }

    /// Advance by wall time since the previous tick. Returns the delta in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let delta = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        let fps_elapsed = now.duration_since(self.fps_update_time);
        if fps_elapsed >= self.fps_update_interval {
            let frames_since = self.frame_count - self.fps_frame_count;
            self.fps = frames_since as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = self.frame_count;
            self.fps_update_time = now;
        }

        self.advance(delta);
        delta
    }

    /// Advance by an explicit delta in seconds and count one frame.
    pub fn advance(&mut self, delta: f32) {
        let delta = delta.max(0.0);
        self.delta_secs = delta;
        self.elapsed_secs += delta;
        self.frame_count += 1;
        self.scaled_frame += 1.0;
    }

    /// Total elapsed time in seconds since start.
    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed_secs
    }

    /// Time since last frame in seconds (delta time).
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    /// Total frames since start.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    /// Frame counter driving VAT playback.
    #[inline]
    pub fn scaled_frame(&self) -> f32 {
        self.scaled_frame
    }

    /// Calculated frames per second.
    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Restart both frame counters at 0 or 1, keeping the current parity.
    ///
    /// A freshly bound animation then starts from its first frames without
    /// changing which ping-pong buffer the next frame reads.
    pub fn align_frame_parity(&mut self) {
        let parity = self.frame_count % 2;
        self.frame_count = parity;
        self.fps_frame_count = 0;
        self.scaled_frame = parity as f32;
    }

    /// Reset frame counters to zero. Elapsed time keeps running.
    pub fn reset_frames(&mut self) {
        self.frame_count = 0;
        self.fps_frame_count = 0;
        self.scaled_frame = 0.0;
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
    use std::thread;

    #[test]
    fn test_clock_new() {
        let clock = FrameClock::new();
        assert_eq!(clock.frame(), 0);
        assert_eq!(clock.scaled_frame(), 0.0);
        assert_eq!(clock.elapsed(), 0.0);
    }

    #[test]
    fn test_tick() {
        let mut clock = FrameClock::new();
        thread::sleep(Duration::from_millis(10));
        let delta = clock.tick();

        assert!(delta > 0.0);
        assert_eq!(clock.delta(), delta);
        assert_eq!(clock.frame(), 1);
    }

    #[test]
    fn test_advance_is_deterministic() {
        let mut clock = FrameClock::new();
        for _ in 0..3 {
            clock.advance(0.5);
        }
        assert_eq!(clock.elapsed(), 1.5);
        assert_eq!(clock.frame(), 3);
        assert_eq!(clock.scaled_frame(), 3.0);

        clock.advance(-1.0);
        assert_eq!(clock.delta(), 0.0);
        assert_eq!(clock.elapsed(), 1.5);
    }

    #[test]
    fn test_align_frame_parity() {
        let mut clock = FrameClock::new();
        for _ in 0..7 {
            clock.advance(0.016);
        }
        clock.align_frame_parity();
        assert_eq!(clock.frame(), 1);
        assert_eq!(clock.scaled_frame(), 1.0);

        clock.advance(0.016);
        clock.align_frame_parity();
        assert_eq!(clock.frame(), 0);
        assert_eq!(clock.scaled_frame(), 0.0);
    }

    #[test]
    fn test_reset_frames_keeps_elapsed() {
        let mut clock = FrameClock::new();
        clock.advance(0.25);
        clock.reset_frames();
        assert_eq!(clock.frame(), 0);
        assert_eq!(clock.elapsed(), 0.25);
    }
}
