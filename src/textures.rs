//! Decoded VAT image data and sampling modes.
//!
//! Vertex animation textures arrive as PNG/JPEG images. They are decoded to
//! RGBA8 and flipped vertically so row 0 is the bottom of the image, which
//! matches the texture coordinate convention used by every pass.

use std::path::Path;

use crate::error::TextureError;

/// Filter mode for texture sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Smooth linear filtering (default). Interpolates between VAT frames.
    #[default]
    Linear,
    /// Sharp nearest-neighbor filtering. Holds each VAT frame.
    Nearest,
}

impl From<FilterMode> for wgpu::FilterMode {
    fn from(mode: FilterMode) -> Self {
        match mode {
            FilterMode::Linear => wgpu::FilterMode::Linear,
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
        }
    }
}

/// A decoded RGBA8 image ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    /// Raw RGBA pixel data (width * height * 4 bytes), bottom row first.
    pub data: Vec<u8>,
    /// Texture width in pixels.
    pub width: u32,
    /// Texture height in pixels.
    pub height: u32,
    /// Filter mode the texture is sampled with.
    pub filter: FilterMode,
}

impl TextureData {
    /// Create texture data from raw RGBA rows that are already bottom-first.
    ///
    /// # Panics
    ///
    /// Panics if `data` is not `width * height * 4` bytes long.
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32, filter: FilterMode) -> Self {
        assert_eq!(
            data.len(),
            (width * height * 4) as usize,
            "RGBA data size mismatch"
        );
        Self {
            data,
            width,
            height,
            filter,
        }
    }

    /// Decode an encoded image held in memory, flipping it vertically.
    pub fn decode(bytes: &[u8], filter: FilterMode, label: &str) -> Result<Self, TextureError> {
        let img = image::load_from_memory(bytes)?;
        Self::from_image(img, filter, label)
    }

    /// Load and decode an image file, flipping it vertically.
    pub fn from_file<P: AsRef<Path>>(path: P, filter: FilterMode) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes, filter, &path.display().to_string())
    }

    fn from_image(img: image::DynamicImage, filter: FilterMode, label: &str) -> Result<Self, TextureError> {
        let img = img.flipv().into_rgba8();
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(TextureError::Empty {
                path: label.to_string(),
            });
        }
        Ok(Self {
            data: img.into_raw(),
            width,
            height,
            filter,
        })
    }

    /// A 1x1 texture used while a section's real VAT is not bound yet.
    ///
    /// Mid-grey decodes to the origin for position VATs.
    pub fn placeholder() -> Self {
        Self {
            data: vec![128, 128, 128, 255],
            width: 1,
            height: 1,
            filter: FilterMode::Nearest,
        }
    }

    /// RGBA bytes of the texel at `(x, y)`, where `y = 0` is the bottom row.
    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }
}
