//! Per-section blend weights and the transitions between sections.
//!
//! Each section owns a weight in `[0, 1]` and at most one weight tween. A
//! section's tween is created paused when the section activates and only
//! plays once its position VAT is bound (see [`crate::registry`]).
//! Deactivation snaps the weight to 0 with no fade-out.
//!
//! Activation also retargets the object rotation and, for scroll-driven
//! activations, the camera's horizontal offset.

use glam::Vec3;

use crate::config::BlendSettings;
use crate::section::{SectionConfig, SectionKey, SectionMap};
use crate::tween::{Ease, Transport, Tween};

/// How a section became active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Scrolled into view at page position `index`.
    Scroll { index: usize },
    /// Chosen directly, e.g. a dedicated page for the section.
    Select,
}

/// Tweened weights, object rotation and camera offset.
#[derive(Debug, Clone)]
pub struct BlendScheduler {
    settings: BlendSettings,
    compact: bool,
    side_offset: f32,
    weights: SectionMap<f32>,
    tweens: SectionMap<Option<Tween<f32>>>,
    active: Option<SectionKey>,
    rotation: Vec3,
    rotation_tween: Option<Tween<Vec3>>,
    camera_x: f32,
    camera_tween: Option<Tween<f32>>,
}

impl BlendScheduler {
    pub fn new(settings: &BlendSettings, side_offset: f32, compact: bool) -> Self {
        Self {
            settings: settings.clone(),
            compact,
            side_offset,
            weights: SectionMap::splat(0.0),
            tweens: SectionMap::default(),
            active: None,
            rotation: Vec3::ZERO,
            rotation_tween: None,
            camera_x: 0.0,
            camera_tween: None,
        }
    }

    /// Current weight of every section.
    pub fn weights(&self) -> &SectionMap<f32> {
        &self.weights
    }

    pub fn weight(&self, key: SectionKey) -> f32 {
        self.weights[key]
    }

    pub fn active(&self) -> Option<SectionKey> {
        self.active
    }

    pub fn is_active(&self, key: SectionKey) -> bool {
        self.active == Some(key)
    }

    /// Object rotation as XYZ euler angles.
    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    /// Horizontal camera offset.
    pub fn camera_x(&self) -> f32 {
        self.camera_x
    }

    /// Transport of `key`'s weight tween, if it has one.
    pub fn tween_state(&self, key: SectionKey) -> Option<Transport> {
        self.tweens[key].as_ref().map(|t| t.transport())
    }

    /// Number of weights currently fading.
    pub fn fading_count(&self) -> usize {
        self.tweens
            .values()
            .iter()
            .flatten()
            .filter(|t| t.is_playing())
            .count()
    }

    /// Make `section` the active one.
    ///
    /// A different previously active section is deactivated first. The new
    /// weight tween replaces any previous tween of the same section and
    /// starts paused. Call [`resume`](Self::resume) once the section's
    /// animation texture is available.
    pub fn activate(&mut self, section: &SectionConfig, how: Activation) {
        let key = section.key;
        log::debug!("activating section {} ({:?})", key, how);
        if let Some(prev) = self.active.filter(|prev| *prev != key) {
            self.deactivate(prev);
        }
        self.active = Some(key);

        if let Some(old) = self.tweens[key].as_mut() {
            old.cancel();
        }
        self.tweens[key] = Some(
            Tween::new(1.0, self.settings.duration, Ease::Power3In).with_delay(self.settings.delay),
        );

        self.rotation_tween = Some(Tween::playing(
            section.rotation,
            self.settings.move_duration,
            Ease::Power2In,
        ));

        if let Activation::Scroll { index } = how {
            let x = if self.compact {
                0.0
            } else if index % 2 == 0 {
                -self.side_offset
            } else {
                self.side_offset
            };
            self.camera_tween = Some(Tween::playing(
                x,
                self.settings.move_duration,
                Ease::Power3In,
            ));
        }
    }

    /// Take `key` out of the blend.
    ///
    /// Every in-flight weight tween is cancelled except the active section's
    /// (unless that is `key` itself), and `key`'s weight drops to 0 at once.
    pub fn deactivate(&mut self, key: SectionKey) {
        log::debug!("deactivating section {}", key);
        let keep = self.active.filter(|active| *active != key);
        for (k, slot) in self.tweens.iter_mut() {
            if Some(k) == keep {
                continue;
            }
            if let Some(tween) = slot.take() {
                if !tween.is_finished() {
                    log::trace!("cancelled blend tween for {}", k);
                }
            }
        }
        self.weights[key] = 0.0;
        if self.active == Some(key) {
            self.active = None;
        }
    }

    /// Start `key`'s fade if it is active and waiting. Returns `true` if a
    /// paused tween started playing.
    pub fn resume(&mut self, key: SectionKey) -> bool {
        if !self.is_active(key) {
            return false;
        }
        match self.tweens[key].as_mut() {
            Some(tween) => tween.resume(),
            None => false,
        }
    }

    /// Advance every tween by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        for key in SectionKey::ALL {
            let finished = match self.tweens[key].as_mut() {
                Some(tween) => {
                    tween.advance(dt, &mut self.weights[key]);
                    tween.is_finished()
                }
                None => false,
            };
            if finished {
                self.tweens[key] = None;
            }
        }

        if let Some(tween) = self.rotation_tween.as_mut() {
            if tween.advance(dt, &mut self.rotation) {
                self.rotation_tween = None;
            }
        }
        if let Some(tween) = self.camera_tween.as_mut() {
            if tween.advance(dt, &mut self.camera_x) {
                self.camera_tween = None;
            }
        }
    }

    /// Cancel everything and return to the initial state.
    pub fn reset(&mut self) {
        self.tweens = SectionMap::default();
        self.rotation_tween = None;
        self.camera_tween = None;
        self.weights = SectionMap::splat(0.0);
        self.active = None;
        self.rotation = Vec3::ZERO;
        self.camera_x = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::SectionTable;

    fn scheduler() -> BlendScheduler {
        BlendScheduler::new(&BlendSettings::default(), 0.9, false)
    }

    fn run(blend: &mut BlendScheduler, seconds: f32) {
        let steps = (seconds * 60.0).round() as usize;
        for _ in 0..steps {
            blend.update(1.0 / 60.0);
        }
    }

    #[test]
    fn test_activation_creates_paused_tween() {
        let table = SectionTable::standard();
        let mut blend = scheduler();
        blend.activate(table.get(SectionKey::Dna), Activation::Select);

        assert_eq!(blend.tween_state(SectionKey::Dna), Some(Transport::Paused));
        run(&mut blend, 2.0);
        assert_eq!(blend.weight(SectionKey::Dna), 0.0);
    }

    #[test]
    fn test_resume_fades_in_after_delay() {
        let table = SectionTable::standard();
        let mut blend = scheduler();
        blend.activate(table.get(SectionKey::Dna), Activation::Select);
        assert!(blend.resume(SectionKey::Dna));
        assert!(!blend.resume(SectionKey::Dna));

        blend.update(0.05);
        assert_eq!(blend.weight(SectionKey::Dna), 0.0);
        run(&mut blend, 1.6);
        assert_eq!(blend.weight(SectionKey::Dna), 1.0);
        assert_eq!(blend.tween_state(SectionKey::Dna), None);
    }

    #[test]
    fn test_resume_ignores_inactive_sections() {
        let table = SectionTable::standard();
        let mut blend = scheduler();
        blend.activate(table.get(SectionKey::Dna), Activation::Select);
        blend.activate(table.get(SectionKey::Cells), Activation::Select);
        assert!(!blend.resume(SectionKey::Dna));
        assert!(blend.resume(SectionKey::Cells));
    }

    #[test]
    fn test_deactivation_snaps_to_zero_within_a_frame() {
        let table = SectionTable::standard();
        let mut blend = scheduler();
        blend.activate(table.get(SectionKey::Dna), Activation::Scroll { index: 2 });
        blend.resume(SectionKey::Dna);
        run(&mut blend, 1.0);
        assert!(blend.weight(SectionKey::Dna) > 0.0);

        blend.activate(table.get(SectionKey::Mitochondria), Activation::Scroll { index: 3 });
        blend.resume(SectionKey::Mitochondria);
        blend.deactivate(SectionKey::Dna);

        assert_eq!(blend.weight(SectionKey::Dna), 0.0);
        assert_eq!(blend.tween_state(SectionKey::Dna), None);
        // The newly active section keeps fading in.
        assert_eq!(
            blend.tween_state(SectionKey::Mitochondria),
            Some(Transport::Playing)
        );
        assert_eq!(blend.active(), Some(SectionKey::Mitochondria));
    }

    #[test]
    fn test_successive_selections_leave_one_full_weight() {
        let table = SectionTable::standard();
        let mut blend = scheduler();
        for key in [SectionKey::Dna, SectionKey::Cells, SectionKey::Insulin] {
            blend.activate(table.get(key), Activation::Select);
            assert!(blend.resume(key));
            run(&mut blend, 5.0);

            let full: Vec<SectionKey> = SectionKey::ALL
                .iter()
                .copied()
                .filter(|k| blend.weight(*k) > 0.99)
                .collect();
            assert_eq!(full, vec![key]);
            let rest: f32 = SectionKey::ALL
                .iter()
                .filter(|k| **k != key)
                .map(|k| blend.weight(*k))
                .sum();
            assert_eq!(rest, 0.0);
        }
    }

    #[test]
    fn test_leaving_another_section_keeps_the_active_fade() {
        let table = SectionTable::standard();
        let mut blend = scheduler();
        blend.activate(table.get(SectionKey::Intro), Activation::Scroll { index: 0 });
        blend.resume(SectionKey::Intro);
        run(&mut blend, 2.0);

        // Selecting DNA takes Intro out of the blend straight away.
        blend.activate(table.get(SectionKey::Dna), Activation::Select);
        assert_eq!(blend.weight(SectionKey::Intro), 0.0);
        blend.resume(SectionKey::Dna);
        run(&mut blend, 0.5);
        let partial = blend.weight(SectionKey::Dna);
        assert!(partial > 0.0 && partial < 1.0);

        // A late scroll leave of Intro does not cancel DNA's fade.
        blend.deactivate(SectionKey::Intro);
        assert_eq!(blend.weight(SectionKey::Dna), partial);
        assert_eq!(blend.tween_state(SectionKey::Dna), Some(Transport::Playing));
        assert_eq!(blend.active(), Some(SectionKey::Dna));
        run(&mut blend, 1.5);
        assert_eq!(blend.weight(SectionKey::Dna), 1.0);
    }

    #[test]
    fn test_at_most_two_sections_fade_through_a_scroll() {
        let table = SectionTable::standard();
        let mut blend = scheduler();
        let mut previous: Option<SectionKey> = None;
        for (index, key) in SectionKey::ALL.iter().copied().enumerate() {
            blend.activate(table.get(key), Activation::Scroll { index });
            blend.resume(key);
            if let Some(prev) = previous {
                blend.deactivate(prev);
                assert_eq!(blend.weight(prev), 0.0);
            }
            for _ in 0..30 {
                blend.update(1.0 / 60.0);
                assert!(blend.fading_count() <= 2);
            }
            previous = Some(key);
        }
    }

    #[test]
    fn test_scroll_moves_camera_select_does_not() {
        let table = SectionTable::standard();
        let mut blend = scheduler();
        blend.activate(table.get(SectionKey::Intro), Activation::Scroll { index: 0 });
        run(&mut blend, 1.0);
        assert!((blend.camera_x() + 0.9).abs() < 1e-6);

        blend.activate(table.get(SectionKey::Telomere), Activation::Scroll { index: 1 });
        run(&mut blend, 1.0);
        assert!((blend.camera_x() - 0.9).abs() < 1e-6);

        blend.activate(table.get(SectionKey::Dna), Activation::Select);
        run(&mut blend, 1.0);
        assert!((blend.camera_x() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_compact_layout_keeps_camera_centred() {
        let table = SectionTable::standard();
        let mut blend = BlendScheduler::new(&BlendSettings::default(), 0.9, true);
        blend.activate(table.get(SectionKey::Intro), Activation::Scroll { index: 0 });
        run(&mut blend, 1.0);
        assert_eq!(blend.camera_x(), 0.0);
    }

    #[test]
    fn test_rotation_reaches_section_target() {
        let table = SectionTable::standard();
        let mut blend = scheduler();
        blend.activate(table.get(SectionKey::Proteostasis), Activation::Select);
        run(&mut blend, 0.5);
        let halfway = blend.rotation().y;
        assert!(halfway > 0.0 && halfway < std::f32::consts::PI * 0.5);
        run(&mut blend, 0.6);
        assert_eq!(blend.rotation(), table.get(SectionKey::Proteostasis).rotation);
    }

    #[test]
    fn test_reset_clears_everything() {
        let table = SectionTable::standard();
        let mut blend = scheduler();
        blend.activate(table.get(SectionKey::Dna), Activation::Scroll { index: 2 });
        blend.resume(SectionKey::Dna);
        run(&mut blend, 2.0);
        blend.reset();
        assert!(blend.weights().values().iter().all(|w| *w == 0.0));
        assert_eq!(blend.active(), None);
        assert_eq!(blend.fading_count(), 0);
        assert_eq!(blend.camera_x(), 0.0);
    }
}
