//! Section keys and the per-section configuration table.
//!
//! Every vignette on the page is a section. Each one owns a position VAT, an
//! optional color VAT, a blend weight and a target object rotation. Sections
//! are identified by [`SectionKey`] and per-section data lives in a dense
//! [`SectionMap`] so lookups can never miss.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use glam::Vec3;

use crate::error::ConfigError;
use crate::textures::FilterMode;

/// Identifies one section of the experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionKey {
    Intro,
    Telomere,
    Dna,
    Mitochondria,
    Cells,
    StemCells,
    Exosomes,
    Insulin,
    Proteostasis,
    Histones,
    Macro,
    Dysbiosis,
    Inflammation,
}

impl SectionKey {
    /// Number of sections.
    pub const COUNT: usize = 13;

    /// All sections in page order.
    pub const ALL: [SectionKey; Self::COUNT] = [
        SectionKey::Intro,
        SectionKey::Telomere,
        SectionKey::Dna,
        SectionKey::Mitochondria,
        SectionKey::Cells,
        SectionKey::StemCells,
        SectionKey::Exosomes,
        SectionKey::Insulin,
        SectionKey::Proteostasis,
        SectionKey::Histones,
        SectionKey::Macro,
        SectionKey::Dysbiosis,
        SectionKey::Inflammation,
    ];

    /// Sections whose weights reach the simulation shader without smoothing.
    pub const UNSMOOTHED: [SectionKey; 2] = [SectionKey::Intro, SectionKey::Telomere];

    /// Dense index of this key, matching its position in [`SectionKey::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// The key used by the page content to refer to this section.
    pub fn name(self) -> &'static str {
        match self {
            SectionKey::Intro => "intro",
            SectionKey::Telomere => "telomere",
            SectionKey::Dna => "DNA",
            SectionKey::Mitochondria => "mit",
            SectionKey::Cells => "cells",
            SectionKey::StemCells => "stemCells",
            SectionKey::Exosomes => "exosomes",
            SectionKey::Insulin => "insulin",
            SectionKey::Proteostasis => "proteostasis",
            SectionKey::Histones => "histones",
            SectionKey::Macro => "macro",
            SectionKey::Dysbiosis => "dysbiosis",
            SectionKey::Inflammation => "inflammation",
        }
    }

    /// Whether the simulation pass smooths this section's weight.
    pub fn is_smoothed(self) -> bool {
        !Self::UNSMOOTHED.contains(&self)
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SectionKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionKey::ALL
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| ConfigError::UnknownSection(s.to_string()))
    }
}

/// A value for every section, indexed by [`SectionKey`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionMap<T> {
    values: [T; SectionKey::COUNT],
}

impl<T: Copy> SectionMap<T> {
    /// A map with every section set to `value`.
    pub fn splat(value: T) -> Self {
        Self {
            values: [value; SectionKey::COUNT],
        }
    }
}

impl<T> SectionMap<T> {
    /// Build a map by evaluating `f` for every key in page order.
    pub fn from_fn(mut f: impl FnMut(SectionKey) -> T) -> Self {
        Self {
            values: SectionKey::ALL.map(&mut f),
        }
    }

    /// Iterate `(key, value)` pairs in page order.
    pub fn iter(&self) -> impl Iterator<Item = (SectionKey, &T)> {
        SectionKey::ALL.iter().copied().zip(self.values.iter())
    }

    /// Iterate `(key, value)` pairs mutably in page order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SectionKey, &mut T)> {
        SectionKey::ALL.iter().copied().zip(self.values.iter_mut())
    }

    /// Raw values in page order.
    pub fn values(&self) -> &[T; SectionKey::COUNT] {
        &self.values
    }
}

impl<T: Default> Default for SectionMap<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<SectionKey> for SectionMap<T> {
    type Output = T;

    fn index(&self, key: SectionKey) -> &T {
        &self.values[key.index()]
    }
}

impl<T> IndexMut<SectionKey> for SectionMap<T> {
    fn index_mut(&mut self, key: SectionKey) -> &mut T {
        &mut self.values[key.index()]
    }
}

/// Location and sampling of one VAT asset.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureSource {
    /// Path relative to the asset root.
    pub path: String,
    /// Filter used when the particle passes sample this texture.
    pub filter: FilterMode,
}

impl TextureSource {
    pub fn linear(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            filter: FilterMode::Linear,
        }
    }

    pub fn nearest(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            filter: FilterMode::Nearest,
        }
    }
}

/// Static configuration of one section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionConfig {
    pub key: SectionKey,
    /// Position VAT.
    pub position: TextureSource,
    /// Color VAT, if the section tints its particles.
    pub color: Option<TextureSource>,
    /// Object rotation (XYZ euler, radians) the rig turns to on activation.
    pub rotation: Vec3,
}

/// The validated set of section configurations.
#[derive(Debug, Clone)]
pub struct SectionTable {
    sections: Vec<SectionConfig>,
}

impl SectionTable {
    /// Build a table, checking that every [`SectionKey`] appears exactly once.
    pub fn new(mut sections: Vec<SectionConfig>) -> Result<Self, ConfigError> {
        sections.sort_by_key(|s| s.key);
        for key in SectionKey::ALL {
            let count = sections.iter().filter(|s| s.key == key).count();
            if count != 1 {
                return Err(ConfigError::SectionTable(format!(
                    "section '{}' configured {} times",
                    key, count
                )));
            }
        }
        Ok(Self { sections })
    }

    /// The standard table with the asset layout `vat/<dir>/pos.png` and
    /// `vat/<dir>/col.png`.
    pub fn standard() -> Self {
        use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};
        use SectionKey::*;

        fn entry(
            key: SectionKey,
            dir: &str,
            color: Option<FilterMode>,
            rotation: Vec3,
        ) -> SectionConfig {
            SectionConfig {
                key,
                position: TextureSource::linear(format!("vat/{dir}/pos.png")),
                color: color.map(|filter| TextureSource {
                    path: format!("vat/{dir}/col.png"),
                    filter,
                }),
                rotation,
            }
        }

        let linear = Some(FilterMode::Linear);
        let nearest = Some(FilterMode::Nearest);
        let sections = vec![
            entry(Intro, "intro", None, Vec3::new(0.0, -FRAC_PI_2, 0.0)),
            entry(Telomere, "telomere", None, Vec3::ZERO),
            entry(Dna, "dna", linear, Vec3::new(0.0, FRAC_PI_4, 0.0)),
            entry(Mitochondria, "mitochondria", None, Vec3::new(-FRAC_PI_2, 0.0, 0.0)),
            entry(Cells, "cells", linear, Vec3::ZERO),
            entry(StemCells, "stem-cells", linear, Vec3::ZERO),
            entry(Exosomes, "exosomes", None, Vec3::ZERO),
            entry(Insulin, "insulin", linear, Vec3::ZERO),
            entry(Proteostasis, "proteostasis", linear, Vec3::new(0.0, PI, 0.0)),
            entry(Histones, "histones", linear, Vec3::new(0.0, -PI, 0.0)),
            entry(Macro, "macroautophagy", linear, Vec3::ZERO),
            entry(Dysbiosis, "dysbiosis", nearest, Vec3::ZERO),
            entry(Inflammation, "inflammation", nearest, Vec3::ZERO),
        ];

        Self { sections }
    }

    /// Configuration of `key`.
    pub fn get(&self, key: SectionKey) -> &SectionConfig {
        // Sorted by key and validated to be complete, so the index is the key.
        &self.sections[key.index()]
    }

    /// All sections in page order.
    pub fn iter(&self) -> impl Iterator<Item = &SectionConfig> {
        self.sections.iter()
    }

    /// Keys of the sections that carry a color VAT.
    pub fn color_keys(&self) -> impl Iterator<Item = SectionKey> + '_ {
        self.sections
            .iter()
            .filter(|s| s.color.is_some())
            .map(|s| s.key)
    }
}

impl Default for SectionTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_round_trip() {
        for key in SectionKey::ALL {
            assert_eq!(key.name().parse::<SectionKey>().unwrap(), key);
        }
        assert!("spleen".parse::<SectionKey>().is_err());
    }

    #[test]
    fn test_index_matches_page_order() {
        for (i, key) in SectionKey::ALL.iter().enumerate() {
            assert_eq!(key.index(), i);
        }
    }

    #[test]
    fn test_standard_table_is_complete() {
        let table = SectionTable::standard();
        let validated = SectionTable::new(table.iter().cloned().collect()).unwrap();
        for key in SectionKey::ALL {
            assert_eq!(validated.get(key).key, key);
        }
        assert_eq!(table.color_keys().count(), 9);
        assert_eq!(
            table.get(SectionKey::Dysbiosis).color.as_ref().unwrap().filter,
            FilterMode::Nearest
        );
    }

    #[test]
    fn test_table_rejects_missing_and_duplicate_keys() {
        let mut sections: Vec<_> = SectionTable::standard().iter().cloned().collect();
        sections.pop();
        assert!(SectionTable::new(sections.clone()).is_err());

        sections.push(sections[0].clone());
        assert!(SectionTable::new(sections).is_err());
    }

    #[test]
    fn test_section_map_indexing() {
        let mut map = SectionMap::splat(0.0f32);
        map[SectionKey::Histones] = 0.5;
        assert_eq!(map[SectionKey::Histones], 0.5);
        assert_eq!(map.iter().filter(|(_, v)| **v > 0.0).count(), 1);
    }

    #[test]
    fn test_unsmoothed_sections() {
        assert!(!SectionKey::Intro.is_smoothed());
        assert!(!SectionKey::Telomere.is_smoothed());
        assert!(SectionKey::Dna.is_smoothed());
    }
}
