//! Glyph rasterizer backends for `sprig`.
//!
//! Each backend implements [`GlyphRasterizer`] over raw font bytes; [`Rasterizer`] holds
//! whichever one was picked when the font was loaded. Backends are cargo features:
//! `fontdue` (default) and `swash`.
//!
//! ```ignore
//! let mut font = sprig_text::load_font_file("DejaVuSans.ttf", FontConfig::default())?;
//! font.set_active_size(renderer.gpu_mut(), 32);
//!
//! let bytes = std::fs::read("DejaVuSans.ttf")?;
//! let hinted = sprig_text::load_font_with(Backend::Swash, bytes, FontConfig::default())?;
//! ```

#[cfg(any(feature = "fontdue", feature = "swash"))]
use std::path::Path;

#[cfg(any(feature = "fontdue", feature = "swash"))]
use sprig::{Font, FontConfig, FontMetrics, GlyphRasterizer, RasterError, RasterizedGlyph};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FontLoadError {
    #[error("failed to read font file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font data: {0}")]
    InvalidFontData(String),
}

/// Which rasterizer to build a font with.
#[cfg(any(feature = "fontdue", feature = "swash"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    #[cfg(feature = "fontdue")]
    Fontdue,
    #[cfg(feature = "swash")]
    Swash,
}

#[cfg(any(feature = "fontdue", feature = "swash"))]
impl Default for Backend {
    /// fontdue when enabled, otherwise swash.
    fn default() -> Self {
        #[cfg(feature = "fontdue")]
        return Self::Fontdue;
        #[cfg(not(feature = "fontdue"))]
        return Self::Swash;
    }
}

/// Concrete rasterizer selection.
#[cfg(any(feature = "fontdue", feature = "swash"))]
pub enum Rasterizer {
    #[cfg(feature = "fontdue")]
    Fontdue(fontdue_backend::FontdueRasterizer),
    #[cfg(feature = "swash")]
    Swash(swash_backend::SwashRasterizer),
}

#[cfg(any(feature = "fontdue", feature = "swash"))]
impl Rasterizer {
    /// Parse `data` with the default backend.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FontLoadError> {
        Self::with_backend(Backend::default(), data)
    }

    pub fn with_backend(backend: Backend, data: &[u8]) -> Result<Self, FontLoadError> {
        match backend {
            #[cfg(feature = "fontdue")]
            Backend::Fontdue => {
                fontdue_backend::FontdueRasterizer::from_bytes(data).map(Self::Fontdue)
            }
            #[cfg(feature = "swash")]
            Backend::Swash => swash_backend::SwashRasterizer::from_bytes(data).map(Self::Swash),
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            #[cfg(feature = "fontdue")]
            Self::Fontdue(_) => Backend::Fontdue,
            #[cfg(feature = "swash")]
            Self::Swash(_) => Backend::Swash,
        }
    }
}

#[cfg(any(feature = "fontdue", feature = "swash"))]
impl GlyphRasterizer for Rasterizer {
    fn glyph_index(&self, ch: char) -> u32 {
        match self {
            #[cfg(feature = "fontdue")]
            Self::Fontdue(raster) => raster.glyph_index(ch),
            #[cfg(feature = "swash")]
            Self::Swash(raster) => raster.glyph_index(ch),
        }
    }

    fn rasterize(&self, glyph: u32, size: u32) -> Result<RasterizedGlyph, RasterError> {
        match self {
            #[cfg(feature = "fontdue")]
            Self::Fontdue(raster) => raster.rasterize(glyph, size),
            #[cfg(feature = "swash")]
            Self::Swash(raster) => raster.rasterize(glyph, size),
        }
    }

    fn metrics(&self, size: u32) -> FontMetrics {
        match self {
            #[cfg(feature = "fontdue")]
            Self::Fontdue(raster) => raster.metrics(size),
            #[cfg(feature = "swash")]
            Self::Swash(raster) => raster.metrics(size),
        }
    }

    fn kerning(&self, left: u32, right: u32, size: u32) -> f32 {
        match self {
            #[cfg(feature = "fontdue")]
            Self::Fontdue(raster) => raster.kerning(left, right, size),
            #[cfg(feature = "swash")]
            Self::Swash(raster) => raster.kerning(left, right, size),
        }
    }
}

/// Build a [`Font`] over `data` using the default backend.
#[cfg(any(feature = "fontdue", feature = "swash"))]
pub fn load_font(data: Vec<u8>, config: FontConfig) -> Result<Font<Rasterizer>, FontLoadError> {
    load_font_with(Backend::default(), data, config)
}

#[cfg(any(feature = "fontdue", feature = "swash"))]
pub fn load_font_with(
    backend: Backend,
    data: Vec<u8>,
    config: FontConfig,
) -> Result<Font<Rasterizer>, FontLoadError> {
    let rasterizer = Rasterizer::with_backend(backend, &data)?;
    Ok(Font::new(data, rasterizer, config))
}

/// Read a font file and build a [`Font`] over it with the default backend.
#[cfg(any(feature = "fontdue", feature = "swash"))]
pub fn load_font_file(
    path: impl AsRef<Path>,
    config: FontConfig,
) -> Result<Font<Rasterizer>, FontLoadError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| FontLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let font = load_font(data, config)?;
    log::info!(
        "✓ Loaded font {} ({:?})",
        path.display(),
        font.rasterizer().backend()
    );
    Ok(font)
}

#[cfg(feature = "fontdue")]
pub mod fontdue_backend {
    //! `fontdue` implementation of glyph rasterization.
    //!
    //! fontdue reports bitmap placement Y-up from the baseline (`ymin` is the bottom
    //! edge); offsets are converted to the Y-down convention of [`RasterizedGlyph`].

    use super::FontLoadError;

    use glam::{UVec2, Vec2};
    use sprig::{FontMetrics, GlyphRasterizer, RasterError, RasterizedGlyph};

    pub struct FontdueRasterizer {
        font: fontdue::Font,
    }

    impl FontdueRasterizer {
        pub fn from_bytes(data: &[u8]) -> Result<Self, FontLoadError> {
            let font = fontdue::Font::from_bytes(data, fontdue::FontSettings::default())
                .map_err(|err| FontLoadError::InvalidFontData(err.to_string()))?;
            Ok(Self { font })
        }

        pub fn font(&self) -> &fontdue::Font {
            &self.font
        }
    }

    fn to_index(glyph: u32, size: u32) -> Result<u16, RasterError> {
        u16::try_from(glyph).map_err(|_| RasterError::Glyph {
            glyph,
            size,
            reason: "glyph index out of range".to_string(),
        })
    }

    impl GlyphRasterizer for FontdueRasterizer {
        fn glyph_index(&self, ch: char) -> u32 {
            self.font.lookup_glyph_index(ch) as u32
        }

        fn rasterize(&self, glyph: u32, size: u32) -> Result<RasterizedGlyph, RasterError> {
            let index = to_index(glyph, size)?;
            let (metrics, bitmap) = self.font.rasterize_indexed(index, size as f32);

            let bitmap_size = UVec2::new(metrics.width as u32, metrics.height as u32);
            Ok(RasterizedGlyph {
                bitmap,
                bitmap_size,
                offset: Vec2::new(
                    metrics.xmin as f32,
                    -((metrics.ymin + metrics.height as i32) as f32),
                ),
                advance: metrics.advance_width,
            })
        }

        fn metrics(&self, size: u32) -> FontMetrics {
            match self.font.horizontal_line_metrics(size as f32) {
                Some(lm) => FontMetrics {
                    ascent: lm.ascent,
                    descent: lm.descent,
                    line_gap: lm.line_gap,
                },
                None => {
                    log::warn!("font has no horizontal line metrics");
                    FontMetrics {
                        ascent: size as f32,
                        descent: 0.0,
                        line_gap: 0.0,
                    }
                }
            }
        }

        fn kerning(&self, left: u32, right: u32, size: u32) -> f32 {
            match (to_index(left, size), to_index(right, size)) {
                (Ok(left), Ok(right)) => self
                    .font
                    .horizontal_kern_indexed(left, right, size as f32)
                    .unwrap_or(0.0),
                _ => 0.0,
            }
        }
    }
}

#[cfg(feature = "swash")]
pub mod swash_backend {
    //! `swash` implementation of glyph rasterization, hinted outlines only.
    //!
    //! Pair kerning in swash lives behind its shaper, so [`GlyphRasterizer::kerning`]
    //! reports none.

    use std::cell::RefCell;

    use glam::{UVec2, Vec2};
    use sprig::{FontMetrics, GlyphRasterizer, RasterError, RasterizedGlyph};
    use swash::scale::{Render, ScaleContext, Source};
    use swash::zeno::Format;
    use swash::{CacheKey, FontRef};

    use super::FontLoadError;

    pub struct SwashRasterizer {
        data: Vec<u8>,
        offset: u32,
        key: CacheKey,
        context: RefCell<ScaleContext>,
    }

    impl SwashRasterizer {
        pub fn from_bytes(data: &[u8]) -> Result<Self, FontLoadError> {
            let font = FontRef::from_index(data, 0).ok_or_else(|| {
                FontLoadError::InvalidFontData("no font face at index 0".to_string())
            })?;
            if font.metrics(&[]).units_per_em == 0 {
                return Err(FontLoadError::InvalidFontData(
                    "font has no units per em".to_string(),
                ));
            }

            Ok(Self {
                offset: font.offset,
                key: font.key,
                data: data.to_vec(),
                context: RefCell::new(ScaleContext::new()),
            })
        }

        pub fn font(&self) -> FontRef<'_> {
            FontRef {
                data: &self.data,
                offset: self.offset,
                key: self.key,
            }
        }
    }

    impl GlyphRasterizer for SwashRasterizer {
        fn glyph_index(&self, ch: char) -> u32 {
            self.font().charmap().map(ch) as u32
        }

        fn rasterize(&self, glyph: u32, size: u32) -> Result<RasterizedGlyph, RasterError> {
            let id = u16::try_from(glyph).map_err(|_| RasterError::Glyph {
                glyph,
                size,
                reason: "glyph index out of range".to_string(),
            })?;
            let font = self.font();
            let advance = font.glyph_metrics(&[]).scale(size as f32).advance_width(id);

            let mut context = self.context.borrow_mut();
            let mut scaler = context.builder(font).size(size as f32).hint(true).build();
            let image = Render::new(&[Source::Outline])
                .format(Format::Alpha)
                .render(&mut scaler, id)
                .ok_or_else(|| RasterError::Glyph {
                    glyph,
                    size,
                    reason: "swash produced no outline image".to_string(),
                })?;

            // Placement is Y-up from the baseline to the bitmap's top edge.
            Ok(RasterizedGlyph {
                bitmap: image.data,
                bitmap_size: UVec2::new(image.placement.width, image.placement.height),
                offset: Vec2::new(image.placement.left as f32, -image.placement.top as f32),
                advance,
            })
        }

        fn metrics(&self, size: u32) -> FontMetrics {
            let metrics = self.font().metrics(&[]).scale(size as f32);
            FontMetrics {
                ascent: metrics.ascent,
                descent: -metrics.descent.abs(),
                line_gap: metrics.leading,
            }
        }

        fn kerning(&self, _left: u32, _right: u32, _size: u32) -> f32 {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_bytes_are_rejected() {
        let result = load_font(b"definitely not a font".to_vec(), FontConfig::default());
        assert!(matches!(result, Err(FontLoadError::InvalidFontData(_))));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = match load_font_file("/nonexistent/sprig-test.ttf", FontConfig::default()) {
            Err(err) => err,
            Ok(_) => panic!("loading a missing file should fail"),
        };
        assert!(matches!(err, FontLoadError::Io { .. }));
        assert!(err.to_string().contains("sprig-test.ttf"));
    }

    #[cfg(feature = "fontdue")]
    #[test]
    fn test_fontdue_is_the_default_backend() {
        assert_eq!(Backend::default(), Backend::Fontdue);
    }

    #[cfg(feature = "swash")]
    #[test]
    fn test_swash_rejects_empty_data() {
        let result = load_font_with(Backend::Swash, Vec::new(), FontConfig::default());
        assert!(matches!(result, Err(FontLoadError::InvalidFontData(_))));
    }
}
