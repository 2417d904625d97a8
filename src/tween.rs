//! Small tween engine driving section weights, the object rotation and the
//! camera.
//!
//! A [`Tween`] owns a playhead, an optional delay, a duration and an easing
//! curve. It does not hold a reference to the value it animates; the owner
//! passes the value to [`Tween::advance`] each frame. The start value is
//! captured the first time the tween moves past its delay, so a tween created
//! paused picks up wherever the value is when it finally plays.
//!
//! ```ignore
//! let mut weight = 0.0_f32;
//! let mut tween = Tween::new(1.0, 1.5, Ease::Power3In).with_delay(0.1);
//! tween.resume();
//! while !tween.is_finished() {
//!     tween.advance(1.0 / 60.0, &mut weight);
//! }
//! ```

use glam::Vec3;

/// Progress this close to 1 counts as finished. Frame-stepped playheads sum
/// to slightly less than the duration.
const END_TOLERANCE: f32 = 1e-4;

/// Easing curves.
///
/// Names follow the usual animation-library convention: `Power2In` is a cubic
/// ease-in and `Power3In` a quartic one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ease {
    #[default]
    Linear,
    Power2In,
    Power3In,
}

impl Ease {
    /// Map linear progress in `[0, 1]` onto the curve.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Ease::Linear => t,
            Ease::Power2In => t * t * t,
            Ease::Power3In => t * t * t * t,
        }
    }
}

/// Values a tween can animate.
pub trait Interpolate: Copy {
    fn interpolate(self, to: Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    fn interpolate(self, to: Self, t: f32) -> Self {
        self + (to - self) * t
    }
}

impl Interpolate for Vec3 {
    fn interpolate(self, to: Self, t: f32) -> Self {
        self.lerp(to, t)
    }
}

/// Playback state of a tween.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Finished or cancelled; never moves again.
    Idle,
    Playing,
    Paused,
}

/// A single animated transition toward `to`.
#[derive(Debug, Clone)]
pub struct Tween<T: Interpolate> {
    from: Option<T>,
    to: T,
    delay: f32,
    duration: f32,
    ease: Ease,
    playhead: f32,
    transport: Transport,
    cancelled: bool,
}

impl<T: Interpolate> Tween<T> {
    /// A paused tween to `to` over `duration` seconds.
    pub fn new(to: T, duration: f32, ease: Ease) -> Self {
        Self {
            from: None,
            to,
            delay: 0.0,
            duration: duration.max(0.0),
            ease,
            playhead: 0.0,
            transport: Transport::Paused,
            cancelled: false,
        }
    }

    /// A tween that is already playing.
    pub fn playing(to: T, duration: f32, ease: Ease) -> Self {
        let mut tween = Self::new(to, duration, ease);
        tween.transport = Transport::Playing;
        tween
    }

    /// Seconds to wait after playing starts before the value moves.
    pub fn with_delay(mut self, delay: f32) -> Self {
        self.delay = delay.max(0.0);
        self
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn target(&self) -> T {
        self.to
    }

    /// Seconds of playback so far, including the delay.
    pub fn playhead(&self) -> f32 {
        self.playhead
    }

    /// Value the tween started from, once captured.
    pub fn start_value(&self) -> Option<T> {
        self.from
    }

    pub fn is_playing(&self) -> bool {
        self.transport == Transport::Playing
    }

    pub fn is_finished(&self) -> bool {
        self.transport == Transport::Idle
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Start or continue playback. Returns `true` if the tween was paused.
    pub fn resume(&mut self) -> bool {
        if self.transport == Transport::Paused {
            self.transport = Transport::Playing;
            true
        } else {
            false
        }
    }

    pub fn pause(&mut self) {
        if self.transport == Transport::Playing {
            self.transport = Transport::Paused;
        }
    }

    /// Stop for good without touching the animated value.
    pub fn cancel(&mut self) {
        if self.transport != Transport::Idle {
            self.cancelled = true;
            self.transport = Transport::Idle;
        }
    }

    /// Move the playhead by `dt` seconds and write the eased value.
    ///
    /// Does nothing unless playing. Returns `true` when this call finished
    /// the tween.
    pub fn advance(&mut self, dt: f32, value: &mut T) -> bool {
        if self.transport != Transport::Playing {
            return false;
        }
        self.playhead += dt.max(0.0);
        let active = self.playhead - self.delay;
        if active < 0.0 {
            return false;
        }

        let from = *self.from.get_or_insert(*value);
        let progress = if self.duration > 0.0 {
            let t = active / self.duration;
            if t >= 1.0 - END_TOLERANCE {
                1.0
            } else {
                t
            }
        } else {
            1.0
        };
        *value = from.interpolate(self.to, self.ease.apply(progress));

        if progress >= 1.0 {
            *value = self.to;
            self.transport = Transport::Idle;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ease_endpoints() {
        for ease in [Ease::Linear, Ease::Power2In, Ease::Power3In] {
            assert_eq!(ease.apply(0.0), 0.0);
            assert_eq!(ease.apply(1.0), 1.0);
        }
        assert_eq!(Ease::Power2In.apply(0.5), 0.125);
        assert_eq!(Ease::Power3In.apply(0.5), 0.0625);
        assert_eq!(Ease::Linear.apply(2.0), 1.0);
    }

    #[test]
    fn test_new_tween_is_paused_and_inert() {
        let mut value = 0.25;
        let mut tween = Tween::new(1.0, 1.0, Ease::Linear);
        assert_eq!(tween.transport(), Transport::Paused);
        tween.advance(10.0, &mut value);
        assert_eq!(value, 0.25);
        assert!(tween.start_value().is_none());
    }

    #[test]
    fn test_delay_then_progress() {
        let mut value = 0.0;
        let mut tween = Tween::new(1.0, 1.0, Ease::Linear).with_delay(0.5);
        assert!(tween.resume());
        assert!(!tween.resume());

        tween.advance(0.25, &mut value);
        assert_eq!(value, 0.0);
        tween.advance(0.75, &mut value);
        assert!((value - 0.5).abs() < 1e-6);
        assert!(tween.advance(0.5, &mut value));
        assert_eq!(value, 1.0);
        assert!(tween.is_finished());
        assert!(!tween.is_cancelled());
    }

    #[test]
    fn test_start_value_captured_when_playing() {
        let mut value = 0.0;
        let mut tween = Tween::new(1.0, 1.0, Ease::Linear);
        value = 0.5;
        tween.resume();
        tween.advance(0.5, &mut value);
        assert_eq!(tween.start_value(), Some(0.5));
        assert!((value - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_pause_holds_playhead() {
        let mut value = 0.0;
        let mut tween = Tween::playing(1.0, 1.0, Ease::Linear);
        tween.advance(0.25, &mut value);
        tween.pause();
        tween.advance(1.0, &mut value);
        assert_eq!(tween.playhead(), 0.25);
        tween.resume();
        tween.advance(0.25, &mut value);
        assert!((value - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_cancel_leaves_value() {
        let mut value = 0.0;
        let mut tween = Tween::playing(1.0, 1.0, Ease::Linear);
        tween.advance(0.5, &mut value);
        tween.cancel();
        tween.advance(0.5, &mut value);
        assert!((value - 0.5).abs() < 1e-6);
        assert!(tween.is_cancelled());
        assert!(!tween.resume());
    }

    #[test]
    fn test_vec3_tween() {
        let mut value = Vec3::ZERO;
        let mut tween = Tween::playing(Vec3::new(0.0, std::f32::consts::PI, 0.0), 1.0, Ease::Power2In);
        tween.advance(0.5, &mut value);
        assert!((value.y - std::f32::consts::PI * 0.125).abs() < 1e-6);
        tween.advance(0.5, &mut value);
        assert_eq!(value.y, std::f32::consts::PI);
    }

    #[test]
    fn test_frame_steps_finish_on_time() {
        let mut value = 0.0;
        let mut tween = Tween::playing(-0.9, 1.0, Ease::Power3In);
        let mut finished = false;
        for _ in 0..60 {
            finished = tween.advance(1.0 / 60.0, &mut value);
        }
        assert!(finished);
        assert_eq!(value, -0.9);
        assert!(tween.is_finished());
    }

    #[test]
    fn test_zero_duration_jumps() {
        let mut value = 0.0;
        let mut tween = Tween::playing(2.0, 0.0, Ease::Linear);
        assert!(tween.advance(0.0, &mut value));
        assert_eq!(value, 2.0);
    }
}
