//! Fonts and their per-size glyph caches.
//!
//! Each pixel size owns an independent [`BinPackingAtlas`] mirrored into a single-channel
//! GPU texture. Glyphs are rasterized on first request and kept forever; when an atlas
//! fills up it is doubled and every stored bitmap is packed again, so nothing is ever
//! rasterized twice.
//!
//! The request that triggers a growth is not served: it returns an empty [`Glyph`] and
//! the glyph appears on the next request. Text drawn in that frame simply misses it.

use std::collections::{HashMap, HashSet};

use glam::{UVec2, Vec2};

use crate::atlas::{AtlasRectPx, BinPackingAtlas, UvRect};
use crate::batch::{BatchRenderer, Quad};
use crate::color::{mocha, Color};
use crate::config::FontConfig;
use crate::gpu::{GpuBackend, TextureDesc, TextureFormat, TextureId, TextureWrite};
use crate::raster::{FontMetrics, GlyphRasterizer, RasterError, MISSING_GLYPH};

/// Placement of one glyph at one pixel size. All lengths are in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Glyph {
    /// Bitmap size.
    pub size: Vec2,
    /// Top-left of the bitmap relative to the pen on the baseline, Y down.
    pub offset: Vec2,
    pub advance: f32,
    /// Top-left and bottom-right UVs inside the size's atlas texture.
    pub uv: [Vec2; 2],
}

/// Cached glyph plus the bitmap it was built from.
#[derive(Clone, Debug)]
pub struct GlyphRecord {
    pub glyph: Glyph,
    bitmap: Vec<u8>,
    bitmap_size: UVec2,
}

impl GlyphRecord {
    pub fn bitmap(&self) -> &[u8] {
        &self.bitmap
    }

    pub fn bitmap_size(&self) -> UVec2 {
        self.bitmap_size
    }

    fn is_empty(&self) -> bool {
        self.bitmap_size.x == 0 || self.bitmap_size.y == 0
    }
}

/// Glyphs of one font at one pixel size.
pub struct SizedGlyphCache {
    size: u32,
    atlas: BinPackingAtlas,
    texture: TextureId,
    metrics: FontMetrics,
    glyphs: HashMap<u32, GlyphRecord>,
}

impl SizedGlyphCache {
    fn new<R: GlyphRasterizer>(
        gpu: &mut dyn GpuBackend,
        rasterizer: &R,
        size: u32,
        config: &FontConfig,
    ) -> Self {
        let atlas = BinPackingAtlas::new(UVec2::splat(config.initial_atlas_size));
        let texture = gpu.create_texture(&TextureDesc {
            size: atlas.size(),
            format: TextureFormat::R8,
            data: None,
        });

        Self {
            size,
            atlas,
            texture,
            metrics: rasterizer.metrics(size),
            glyphs: HashMap::new(),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn atlas(&self) -> &BinPackingAtlas {
        &self.atlas
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn metrics(&self) -> FontMetrics {
        self.metrics
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    pub fn record(&self, glyph: u32) -> Option<&GlyphRecord> {
        self.glyphs.get(&glyph)
    }

    fn glyph<R: GlyphRasterizer>(
        &mut self,
        gpu: &mut dyn GpuBackend,
        rasterizer: &R,
        index: u32,
        config: &FontConfig,
    ) -> Glyph {
        if let Some(record) = self.glyphs.get(&index) {
            return record.glyph;
        }

        let mut record = match self.rasterize(rasterizer, index) {
            Ok(record) => record,
            Err(err) => {
                log::warn!("{err}");
                return Glyph::default();
            }
        };

        // Whitespace: metrics only, no atlas space.
        if record.is_empty() {
            let glyph = record.glyph;
            self.glyphs.insert(index, record);
            return glyph;
        }

        let Some(rect) = self.atlas.insert(record.bitmap_size) else {
            self.expand(gpu, config);
            return Glyph::default();
        };

        self.atlas.blit(rect.min, record.bitmap_size, &record.bitmap);
        gpu.write_texture(
            self.texture,
            &TextureWrite {
                origin: rect.min,
                size: record.bitmap_size,
                format: TextureFormat::R8,
                alignment: 1,
                data: &record.bitmap,
            },
        );
        record.glyph.uv = self.atlas.uv_rect(rect.min, record.bitmap_size).to_array();

        let glyph = record.glyph;
        self.glyphs.insert(index, record);
        glyph
    }

    fn rasterize<R: GlyphRasterizer>(
        &self,
        rasterizer: &R,
        index: u32,
    ) -> Result<GlyphRecord, RasterError> {
        let raster = rasterizer.rasterize(index, self.size)?;

        let expected = (raster.bitmap_size.x * raster.bitmap_size.y) as usize;
        if raster.bitmap.len() != expected {
            return Err(RasterError::BitmapSize {
                glyph: index,
                expected,
                actual: raster.bitmap.len(),
            });
        }

        Ok(GlyphRecord {
            glyph: Glyph {
                size: raster.bitmap_size.as_vec2(),
                offset: raster.offset,
                advance: raster.advance,
                uv: [Vec2::ZERO; 2],
            },
            bitmap: raster.bitmap,
            bitmap_size: raster.bitmap_size,
        })
    }

    /// Double the atlas and repack every stored bitmap. Returns `false` at the size cap.
    fn expand(&mut self, gpu: &mut dyn GpuBackend, config: &FontConfig) -> bool {
        let old_size = self.atlas.size();
        let mut size = old_size * 2;

        let (atlas, placements) = loop {
            if size.max_element() > config.max_atlas_size {
                log::warn!(
                    "glyph atlas for {}px is full at {}x{} (limit {})",
                    self.size,
                    old_size.x,
                    old_size.y,
                    config.max_atlas_size
                );
                return false;
            }

            match self.repack(size) {
                Some(packed) => break packed,
                None => {
                    log::warn!(
                        "repacking {}px glyphs into {}x{} failed, doubling again",
                        self.size,
                        size.x,
                        size.y
                    );
                    size *= 2;
                }
            }
        };

        for (index, rect) in placements {
            if let Some(record) = self.glyphs.get_mut(&index) {
                record.glyph.uv = atlas.uv_rect(rect.min, record.bitmap_size).to_array();
            }
        }
        self.atlas = atlas;
        gpu.resize_texture(self.texture, size, self.atlas.pixels());

        log::debug!(
            "glyph atlas for {}px grew {}x{} -> {}x{} ({} glyphs)",
            self.size,
            old_size.x,
            old_size.y,
            size.x,
            size.y,
            self.glyphs.len()
        );
        true
    }

    /// Pack every non-empty record into a fresh atlas of `size`, tallest first.
    fn repack(&self, size: UVec2) -> Option<(BinPackingAtlas, Vec<(u32, AtlasRectPx)>)> {
        let mut order: Vec<(&u32, &GlyphRecord)> =
            self.glyphs.iter().filter(|(_, r)| !r.is_empty()).collect();
        order.sort_by_key(|(index, record)| (std::cmp::Reverse(record.bitmap_size.y), **index));

        let mut atlas = BinPackingAtlas::new(size);
        let mut placements = Vec::with_capacity(order.len());
        for (&index, record) in order {
            let rect = atlas.insert(record.bitmap_size)?;
            atlas.blit(rect.min, record.bitmap_size, &record.bitmap);
            placements.push((index, rect));
        }
        Some((atlas, placements))
    }
}

/// A font: raw data, a rasterizer over it, and one glyph cache per pixel size used.
///
/// Methods that may create or update GPU textures take the backend explicitly.
pub struct Font<R: GlyphRasterizer> {
    data: Vec<u8>,
    rasterizer: R,
    config: FontConfig,
    active_size: Option<u32>,
    sizes: HashMap<u32, SizedGlyphCache>,
    reported_missing: HashSet<char>,
}

impl<R: GlyphRasterizer> Font<R> {
    pub fn new(data: Vec<u8>, rasterizer: R, config: FontConfig) -> Self {
        Self {
            data,
            rasterizer,
            config,
            active_size: None,
            sizes: HashMap::new(),
            reported_missing: HashSet::new(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    pub fn config(&self) -> &FontConfig {
        &self.config
    }

    pub fn active_size(&self) -> Option<u32> {
        self.active_size
    }

    /// Select the pixel size used by subsequent calls, creating its cache on first use.
    pub fn set_active_size(&mut self, gpu: &mut dyn GpuBackend, size: u32) {
        assert!(size > 0, "font size must be positive");

        if !self.sizes.contains_key(&size) {
            let cache = SizedGlyphCache::new(gpu, &self.rasterizer, size, &self.config);
            self.sizes.insert(size, cache);
        }
        self.active_size = Some(size);
    }

    pub fn cache(&self, size: u32) -> Option<&SizedGlyphCache> {
        self.sizes.get(&size)
    }

    pub fn active_cache(&self) -> Option<&SizedGlyphCache> {
        self.active_size.and_then(|size| self.sizes.get(&size))
    }

    fn expect_active(&self) -> u32 {
        match self.active_size {
            Some(size) => size,
            None => panic!("Font used before set_active_size"),
        }
    }

    /// Glyph for `ch` at the active size. Missing or failed glyphs come back empty.
    pub fn get_glyph(&mut self, gpu: &mut dyn GpuBackend, ch: char) -> Glyph {
        let size = self.expect_active();

        let index = self.rasterizer.glyph_index(ch);
        if index == MISSING_GLYPH {
            if self.reported_missing.insert(ch) {
                log::warn!("font has no glyph for {ch:?} (U+{:04X})", ch as u32);
            }
            return Glyph::default();
        }

        match self.sizes.get_mut(&size) {
            Some(cache) => cache.glyph(gpu, &self.rasterizer, index, &self.config),
            None => Glyph::default(),
        }
    }

    pub fn get_metrics(&self) -> FontMetrics {
        let size = self.expect_active();
        self.sizes
            .get(&size)
            .map(SizedGlyphCache::metrics)
            .unwrap_or_default()
    }

    pub fn get_kerning(&self, left: char, right: char) -> f32 {
        let size = self.expect_active();
        let left = self.rasterizer.glyph_index(left);
        let right = self.rasterizer.glyph_index(right);
        if left == MISSING_GLYPH || right == MISSING_GLYPH {
            return 0.0;
        }
        self.rasterizer.kerning(left, right, size)
    }

    /// Pixel extent of `text` on one line.
    ///
    /// The last glyph contributes its bitmap width rather than its advance, so trailing
    /// side bearing is not counted.
    pub fn measure_string(&mut self, gpu: &mut dyn GpuBackend, text: &str) -> Vec2 {
        let metrics = self.get_metrics();

        let mut width = 0.0;
        let mut prev = None;
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            let glyph = self.get_glyph(gpu, ch);
            if let Some(prev) = prev {
                width += self.get_kerning(prev, ch);
            }
            width += if chars.peek().is_some() {
                glyph.advance
            } else {
                glyph.size.x
            };
            prev = Some(ch);
        }

        Vec2::new(width, metrics.line_height())
    }

    /// Texture holding the active size's atlas.
    pub fn atlas_texture(&self) -> TextureId {
        let size = self.expect_active();
        match self.sizes.get(&size) {
            Some(cache) => cache.texture(),
            None => panic!("no glyph cache for active size {size}"),
        }
    }

    /// Draw the active atlas with `top_left` at its top-left corner, then outline every
    /// packing node: occupied ones in green, free ones in grey.
    pub fn debug_draw_atlas<G: GpuBackend>(
        &self,
        renderer: &mut BatchRenderer<G>,
        top_left: Vec2,
        size: Vec2,
    ) {
        let Some(cache) = self.active_cache() else {
            return;
        };

        let invert_y = renderer.camera().is_some_and(|c| c.invert_y);
        let down = if invert_y { 1.0 } else { -1.0 };
        let pivot = Vec2::new(-1.0, -down);

        renderer.draw_quad(
            Quad::new(top_left, size)
                .with_pivot(pivot)
                .with_color(mocha::CRUST),
        );
        renderer.draw_quad_textured_with_uv(
            Quad::new(top_left, size)
                .with_pivot(pivot)
                .with_color(Color::WHITE),
            Some(cache.texture()),
            UvRect::FULL.to_array(),
        );

        let atlas_size = cache.atlas().size().as_vec2();
        for node in cache.atlas().nodes() {
            let rect = node.rect();
            let min = rect.min.as_vec2() / atlas_size * size;
            let node_size = rect.size.as_vec2() / atlas_size * size;
            let color = if node.is_occupied() {
                mocha::GREEN
            } else {
                mocha::OVERLAY0
            };

            renderer.draw_quad_outline(
                Quad::new(top_left + Vec2::new(min.x, down * min.y), node_size)
                    .with_pivot(pivot)
                    .with_color(color),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BlockRasterizer, RecordingBackend};

    const SMALL: FontConfig = FontConfig {
        initial_atlas_size: 16,
        max_atlas_size: 64,
    };

    fn font(rasterizer: BlockRasterizer, config: FontConfig) -> Font<BlockRasterizer> {
        Font::new(Vec::new(), rasterizer, config)
    }

    /// Ask twice: the first request may be the one that grows the atlas.
    fn glyph(font: &mut Font<BlockRasterizer>, gpu: &mut RecordingBackend, ch: char) -> Glyph {
        let glyph = font.get_glyph(gpu, ch);
        if glyph == Glyph::default() {
            font.get_glyph(gpu, ch)
        } else {
            glyph
        }
    }

    /// Texture bytes covered by a glyph's UV rectangle.
    fn sample(gpu: &RecordingBackend, texture: TextureId, glyph: &Glyph) -> Vec<u8> {
        let tex = gpu.texture(texture);
        let min = (glyph.uv[0] * tex.size.as_vec2()).round().as_uvec2();
        let size = glyph.size.as_uvec2();
        let mut out = Vec::new();
        for y in 0..size.y {
            for x in 0..size.x {
                out.push(tex.pixel(min.x + x, min.y + y));
            }
        }
        out
    }

    #[test]
    fn test_first_glyph_is_uploaded() {
        let mut gpu = RecordingBackend::default();
        let mut font = font(BlockRasterizer::new(), FontConfig::default());
        font.set_active_size(&mut gpu, 32);

        let g = font.get_glyph(&mut gpu, 'A');
        assert_eq!(g.size, BlockRasterizer::bitmap_size('A' as u32, 32).as_vec2());
        assert_eq!(g.uv[0], Vec2::ZERO);
        assert_eq!(g.uv[1], g.size / 256.0);

        let texture = font.atlas_texture();
        assert_eq!(gpu.texture(texture).size, UVec2::splat(256));
        assert_eq!(gpu.texture(texture).format, TextureFormat::R8);
        assert_eq!(gpu.texture(texture).pixel(3, 2), BlockRasterizer::pattern('A' as u32, 3, 2));
        assert_eq!(gpu.writes, 1);
    }

    #[test]
    fn test_cached_glyph_is_not_rasterized_twice() {
        let mut gpu = RecordingBackend::default();
        let mut font = font(BlockRasterizer::new(), FontConfig::default());
        font.set_active_size(&mut gpu, 32);

        let first = font.get_glyph(&mut gpu, 'x');
        let second = font.get_glyph(&mut gpu, 'x');
        assert_eq!(first, second);
        assert_eq!(gpu.writes, 1);
    }

    #[test]
    fn test_full_atlas_expands_and_skips_triggering_glyph() {
        let mut gpu = RecordingBackend::default();
        let mut font = font(BlockRasterizer::new(), SMALL);
        font.set_active_size(&mut gpu, 20);

        // 11x15 -> 12x16, fills most of the 16x16 atlas.
        assert_ne!(font.get_glyph(&mut gpu, 'A'), Glyph::default());

        assert_eq!(font.get_glyph(&mut gpu, 'B'), Glyph::default());
        let cache = font.active_cache().unwrap();
        assert_eq!(cache.atlas().size(), UVec2::splat(32));
        assert_eq!(cache.glyph_count(), 1);
        assert_eq!(gpu.texture(cache.texture()).size, UVec2::splat(32));
        assert_eq!(gpu.resizes, 1);

        let b = font.get_glyph(&mut gpu, 'B');
        assert_eq!(b.size, Vec2::new(12.0, 15.0));
        assert_eq!(font.active_cache().unwrap().glyph_count(), 2);
    }

    #[test]
    fn test_expansion_preserves_sampled_pixels() {
        let mut gpu = RecordingBackend::default();
        let mut font = font(BlockRasterizer::new(), SMALL);
        font.set_active_size(&mut gpu, 20);

        let before = font.get_glyph(&mut gpu, 'A');
        let texture = font.atlas_texture();
        let pixels_before = sample(&gpu, texture, &before);

        font.get_glyph(&mut gpu, 'B');
        let after = font.get_glyph(&mut gpu, 'A');

        assert_ne!(before.uv, after.uv);
        assert_eq!(sample(&gpu, texture, &after), pixels_before);
        assert_eq!(font.atlas_texture(), texture);
    }

    #[test]
    fn test_growth_stops_at_limit() {
        let mut gpu = RecordingBackend::default();
        let config = FontConfig {
            initial_atlas_size: 16,
            max_atlas_size: 16,
        };
        let mut font = font(BlockRasterizer::new(), config);
        font.set_active_size(&mut gpu, 20);

        font.get_glyph(&mut gpu, 'A');
        for _ in 0..3 {
            assert_eq!(font.get_glyph(&mut gpu, 'B'), Glyph::default());
        }
        assert_eq!(font.active_cache().unwrap().atlas().size(), UVec2::splat(16));
        assert_eq!(gpu.resizes, 0);
    }

    #[test]
    fn test_sizes_do_not_share_atlases() {
        let mut gpu = RecordingBackend::default();
        let config = FontConfig {
            initial_atlas_size: 32,
            max_atlas_size: 1024,
        };
        let mut font = font(BlockRasterizer::new(), config);

        font.set_active_size(&mut gpu, 32);
        glyph(&mut font, &mut gpu, 'A');
        let small_b = glyph(&mut font, &mut gpu, 'B');
        let small_a = font.get_glyph(&mut gpu, 'A');
        let small_texture = font.atlas_texture();
        let small_size = font.active_cache().unwrap().atlas().size();

        font.set_active_size(&mut gpu, 64);
        let resizes = gpu.resizes;
        for ch in 'C'..='Z' {
            glyph(&mut font, &mut gpu, ch);
        }
        assert!(gpu.resizes > resizes);
        assert_ne!(font.atlas_texture(), small_texture);

        font.set_active_size(&mut gpu, 32);
        assert_eq!(font.get_glyph(&mut gpu, 'A'), small_a);
        assert_eq!(font.get_glyph(&mut gpu, 'B'), small_b);
        assert_eq!(font.active_cache().unwrap().atlas().size(), small_size);
    }

    #[test]
    fn test_shared_glyph_index_shares_record() {
        let mut gpu = RecordingBackend::default();
        let mut font = font(BlockRasterizer::new().with_alias('Å', 'A'), FontConfig::default());
        font.set_active_size(&mut gpu, 32);

        let a = font.get_glyph(&mut gpu, 'A');
        let aring = font.get_glyph(&mut gpu, 'Å');
        assert_eq!(a, aring);
        assert_eq!(font.active_cache().unwrap().glyph_count(), 1);
    }

    #[test]
    fn test_missing_and_failing_glyphs_return_empty() {
        let mut gpu = RecordingBackend::default();
        let rasterizer = BlockRasterizer::new().with_missing('?').with_failing('!');
        let mut font = font(rasterizer, FontConfig::default());
        font.set_active_size(&mut gpu, 32);

        for _ in 0..2 {
            assert_eq!(font.get_glyph(&mut gpu, '?'), Glyph::default());
            assert_eq!(font.get_glyph(&mut gpu, '!'), Glyph::default());
        }
        assert_eq!(font.active_cache().unwrap().glyph_count(), 0);
        assert_eq!(font.active_cache().unwrap().atlas().nodes().count(), 1);
        assert_eq!(gpu.writes, 0);
    }

    #[test]
    fn test_whitespace_uses_no_atlas_space() {
        let mut gpu = RecordingBackend::default();
        let mut font = font(BlockRasterizer::new(), FontConfig::default());
        font.set_active_size(&mut gpu, 32);

        let space = font.get_glyph(&mut gpu, ' ');
        assert_eq!(space.size, Vec2::ZERO);
        assert_eq!(space.advance, 18.0);
        assert_eq!(space.uv, [Vec2::ZERO; 2]);

        let cache = font.active_cache().unwrap();
        assert_eq!(cache.glyph_count(), 1);
        assert_eq!(cache.atlas().nodes().count(), 1);
    }

    #[test]
    fn test_measure_empty_string() {
        let mut gpu = RecordingBackend::default();
        let mut font = font(BlockRasterizer::new(), FontConfig::default());
        font.set_active_size(&mut gpu, 40);

        assert_eq!(font.measure_string(&mut gpu, ""), Vec2::new(0.0, 40.0));
    }

    #[test]
    fn test_measure_uses_last_glyph_width_and_kerning() {
        let mut gpu = RecordingBackend::default();
        let rasterizer = BlockRasterizer::new().with_kerning('A', 'B', -1.5);
        let mut font = font(rasterizer, FontConfig::default());
        font.set_active_size(&mut gpu, 20);

        // advance(A) = 12, kern(A, B) = -1.5, width(B) = 12.
        let size = font.measure_string(&mut gpu, "AB");
        assert_eq!(size, Vec2::new(22.5, 20.0));
        assert_eq!(font.get_kerning('A', 'B'), -1.5);
        assert_eq!(font.get_kerning('B', 'A'), 0.0);
    }

    #[test]
    fn test_metrics_follow_active_size() {
        let mut gpu = RecordingBackend::default();
        let mut font = font(BlockRasterizer::new(), FontConfig::default());

        font.set_active_size(&mut gpu, 16);
        assert_eq!(font.get_metrics().ascent, 12.0);
        font.set_active_size(&mut gpu, 64);
        assert_eq!(font.get_metrics().ascent, 48.0);
        assert_eq!(font.get_metrics().descent, -16.0);
    }

    #[test]
    #[should_panic(expected = "set_active_size")]
    fn test_glyph_without_active_size_panics() {
        let mut gpu = RecordingBackend::default();
        let mut font = font(BlockRasterizer::new(), FontConfig::default());
        font.get_glyph(&mut gpu, 'A');
    }
}
