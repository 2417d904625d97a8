//! A virtual scroll track standing in for the page's scroll triggers.
//!
//! Sections are laid out one page apart. Section `i` is active while the
//! scroll offset (in pages) is inside `[i, i + SECTION_SPAN)`; crossing a
//! window's edge emits a [`SectionSignal::Scroll`] toggle.

use crate::scene::SectionSignal;
use crate::section::SectionKey;

/// Fraction of a page during which a section stays active.
pub const SECTION_SPAN: f32 = 0.7;

#[derive(Debug, Clone)]
pub struct ScrollTrack {
    order: Vec<SectionKey>,
    offset: f32,
    active: Option<usize>,
}

impl Default for ScrollTrack {
    fn default() -> Self {
        Self::new(SectionKey::ALL.to_vec())
    }
}

impl ScrollTrack {
    /// A track over `order`, starting above the first section.
    pub fn new(order: Vec<SectionKey>) -> Self {
        Self {
            order,
            offset: -1.0,
            active: None,
        }
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// Page index of the active section.
    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn order(&self) -> &[SectionKey] {
        &self.order
    }

    fn section_at(&self, offset: f32) -> Option<usize> {
        if offset < 0.0 {
            return None;
        }
        let index = offset.floor() as usize;
        let within = offset - index as f32;
        (index < self.order.len() && within < SECTION_SPAN).then_some(index)
    }

    /// Move by `pages` and return the toggles crossed, leave before enter.
    pub fn scroll_by(&mut self, pages: f32) -> Vec<SectionSignal> {
        self.scroll_to(self.offset + pages)
    }

    /// Jump to `offset` (clamped to the track) and return the toggles crossed.
    pub fn scroll_to(&mut self, offset: f32) -> Vec<SectionSignal> {
        let end = self.order.len() as f32;
        self.offset = if offset.is_finite() {
            offset.clamp(-1.0, end)
        } else {
            self.offset
        };

        let next = self.section_at(self.offset);
        let mut signals = Vec::new();
        if next != self.active {
            if let Some(prev) = self.active {
                signals.push(SectionSignal::Scroll {
                    key: self.order[prev],
                    index: prev,
                    active: false,
                });
            }
            if let Some(index) = next {
                signals.push(SectionSignal::Scroll {
                    key: self.order[index],
                    index,
                    active: true,
                });
            }
            self.active = next;
        }
        signals
    }

    /// Jump to the start of section `index`.
    pub fn scroll_to_section(&mut self, index: usize) -> Vec<SectionSignal> {
        self.scroll_to(index as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_and_leave() {
        let mut track = ScrollTrack::default();
        assert!(track.scroll_by(0.5).is_empty());

        let signals = track.scroll_by(0.6);
        assert_eq!(
            signals,
            vec![SectionSignal::Scroll { key: SectionKey::Intro, index: 0, active: true }]
        );

        let signals = track.scroll_by(0.8);
        assert_eq!(
            signals,
            vec![SectionSignal::Scroll { key: SectionKey::Intro, index: 0, active: false }]
        );
    }

    #[test]
    fn test_jump_leaves_before_entering() {
        let mut track = ScrollTrack::default();
        track.scroll_to(0.0);
        let signals = track.scroll_to(2.1);
        assert_eq!(
            signals,
            vec![
                SectionSignal::Scroll { key: SectionKey::Intro, index: 0, active: false },
                SectionSignal::Scroll { key: SectionKey::Dna, index: 2, active: true },
            ]
        );
        assert_eq!(track.active(), Some(2));
    }

    #[test]
    fn test_clamped_to_track() {
        let mut track = ScrollTrack::default();
        track.scroll_to(100.0);
        assert_eq!(track.offset(), SectionKey::COUNT as f32);
        assert_eq!(track.active(), None);
        track.scroll_to(f32::NAN);
        assert_eq!(track.offset(), SectionKey::COUNT as f32);
    }
}
