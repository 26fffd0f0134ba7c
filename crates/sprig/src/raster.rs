//! Glyph rasterization provider interface.
//!
//! A rasterizer turns a font plus a pixel size into coverage bitmaps and metrics.
//! All values are in pixels with Y pointing down: `offset` is the top-left corner of
//! the bitmap relative to the pen on the baseline.

use glam::{UVec2, Vec2};
use thiserror::Error;

/// Glyph index reported for characters the font has no outline for.
pub const MISSING_GLYPH: u32 = 0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FontMetrics {
    /// Distance from the baseline to the top of the line, positive.
    pub ascent: f32,
    /// Distance from the baseline to the bottom of the line, negative.
    pub descent: f32,
    pub line_gap: f32,
}

impl FontMetrics {
    pub fn line_height(&self) -> f32 {
        self.ascent - self.descent
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RasterizedGlyph {
    /// Row-major coverage, `bitmap_size.x * bitmap_size.y` bytes.
    pub bitmap: Vec<u8>,
    pub bitmap_size: UVec2,
    pub offset: Vec2,
    pub advance: f32,
}

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("glyph {glyph} could not be rasterized at {size}px: {reason}")]
    Glyph {
        glyph: u32,
        size: u32,
        reason: String,
    },
    #[error("bitmap for glyph {glyph} is {actual} bytes, expected {expected}")]
    BitmapSize {
        glyph: u32,
        expected: usize,
        actual: usize,
    },
}

pub trait GlyphRasterizer {
    /// Glyph index for `ch`, or [`MISSING_GLYPH`].
    fn glyph_index(&self, ch: char) -> u32;

    fn rasterize(&self, glyph: u32, size: u32) -> Result<RasterizedGlyph, RasterError>;

    fn metrics(&self, size: u32) -> FontMetrics;

    /// Horizontal adjustment between two glyph indices, zero when the font has none.
    fn kerning(&self, left: u32, right: u32, size: u32) -> f32;
}
