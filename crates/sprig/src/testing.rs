//! Test doubles: a GPU backend that records everything and a synthetic rasterizer.

use std::collections::{HashMap, HashSet};

use glam::{UVec2, Vec2};

use crate::camera::CameraUniform;
use crate::gpu::{DrawBatch, GpuBackend, TextureDesc, TextureFormat, TextureId, TextureWrite};
use crate::raster::{FontMetrics, GlyphRasterizer, RasterError, RasterizedGlyph, MISSING_GLYPH};
use crate::vertex::BatchVertex;

#[derive(Clone, Debug)]
pub struct RecordedTexture {
    pub size: UVec2,
    pub format: TextureFormat,
    pub pixels: Vec<u8>,
}

impl RecordedTexture {
    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        let bpp = self.format.bytes_per_pixel();
        self.pixels[((y * self.size.x + x) * bpp) as usize]
    }
}

#[derive(Clone, Debug)]
pub struct RecordedDraw {
    pub vertices: Vec<BatchVertex>,
    pub textures: Vec<TextureId>,
    pub camera: CameraUniform,
    pub index_count: u32,
}

#[derive(Default)]
pub struct RecordingBackend {
    pub textures: Vec<RecordedTexture>,
    pub indices: Vec<u32>,
    pub draws: Vec<RecordedDraw>,
    pub writes: usize,
    pub resizes: usize,
}

impl RecordingBackend {
    pub fn texture(&self, id: TextureId) -> &RecordedTexture {
        &self.textures[id.0 as usize]
    }
}

impl GpuBackend for RecordingBackend {
    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> TextureId {
        let len = (desc.size.x * desc.size.y * desc.format.bytes_per_pixel()) as usize;
        let pixels = match desc.data {
            Some(data) => data.to_vec(),
            None => vec![0; len],
        };
        assert_eq!(pixels.len(), len);

        self.textures.push(RecordedTexture {
            size: desc.size,
            format: desc.format,
            pixels,
        });
        TextureId(self.textures.len() as u32 - 1)
    }

    fn resize_texture(&mut self, texture: TextureId, size: UVec2, data: &[u8]) {
        let texture = &mut self.textures[texture.0 as usize];
        assert_eq!(
            data.len(),
            (size.x * size.y * texture.format.bytes_per_pixel()) as usize
        );
        texture.size = size;
        texture.pixels = data.to_vec();
        self.resizes += 1;
    }

    fn write_texture(&mut self, texture: TextureId, write: &TextureWrite<'_>) {
        let texture = &mut self.textures[texture.0 as usize];
        assert_eq!(texture.format, write.format);
        assert!(write.origin.x + write.size.x <= texture.size.x);
        assert!(write.origin.y + write.size.y <= texture.size.y);

        let bpp = write.format.bytes_per_pixel() as usize;
        let row = write.size.x as usize * bpp;
        let stride = row.div_ceil(write.alignment as usize) * write.alignment as usize;
        for y in 0..write.size.y as usize {
            let dst = ((write.origin.y as usize + y) * texture.size.x as usize
                + write.origin.x as usize)
                * bpp;
            texture.pixels[dst..dst + row].copy_from_slice(&write.data[y * stride..y * stride + row]);
        }
        self.writes += 1;
    }

    fn texture_size(&self, texture: TextureId) -> UVec2 {
        self.textures[texture.0 as usize].size
    }

    fn create_index_buffer(&mut self, indices: &[u32]) {
        self.indices = indices.to_vec();
    }

    fn draw_batch(&mut self, batch: &DrawBatch<'_>) {
        self.draws.push(RecordedDraw {
            vertices: batch.vertices.to_vec(),
            textures: batch.textures.to_vec(),
            camera: batch.camera,
            index_count: batch.index_count,
        });
    }
}

/// Deterministic rasterizer producing rectangular glyphs.
///
/// The glyph index is the codepoint. Bitmaps are `size / 2 + index % 4` wide and
/// `size * 3 / 4` tall with a per-pixel pattern, so relocated pixels can be told apart.
/// Spaces rasterize to an empty bitmap.
#[derive(Default)]
pub struct BlockRasterizer {
    aliases: HashMap<char, char>,
    missing: HashSet<char>,
    failing: HashSet<u32>,
    kerning: HashMap<(u32, u32), f32>,
}

impl BlockRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `ch` onto the glyph of `target`.
    pub fn with_alias(mut self, ch: char, target: char) -> Self {
        self.aliases.insert(ch, target);
        self
    }

    pub fn with_missing(mut self, ch: char) -> Self {
        self.missing.insert(ch);
        self
    }

    pub fn with_failing(mut self, ch: char) -> Self {
        self.failing.insert(ch as u32);
        self
    }

    pub fn with_kerning(mut self, left: char, right: char, amount: f32) -> Self {
        self.kerning.insert((left as u32, right as u32), amount);
        self
    }

    pub fn bitmap_size(glyph: u32, size: u32) -> UVec2 {
        if glyph == ' ' as u32 {
            UVec2::ZERO
        } else {
            UVec2::new(size / 2 + glyph % 4, size * 3 / 4)
        }
    }

    pub fn pattern(glyph: u32, x: u32, y: u32) -> u8 {
        ((glyph * 31 + x * 7 + y * 13) % 255 + 1) as u8
    }
}

impl GlyphRasterizer for BlockRasterizer {
    fn glyph_index(&self, ch: char) -> u32 {
        if self.missing.contains(&ch) {
            return MISSING_GLYPH;
        }
        *self.aliases.get(&ch).unwrap_or(&ch) as u32
    }

    fn rasterize(&self, glyph: u32, size: u32) -> Result<RasterizedGlyph, RasterError> {
        if self.failing.contains(&glyph) {
            return Err(RasterError::Glyph {
                glyph,
                size,
                reason: "synthetic failure".to_string(),
            });
        }

        let bitmap_size = Self::bitmap_size(glyph, size);
        let mut bitmap = Vec::with_capacity((bitmap_size.x * bitmap_size.y) as usize);
        for y in 0..bitmap_size.y {
            for x in 0..bitmap_size.x {
                bitmap.push(Self::pattern(glyph, x, y));
            }
        }

        Ok(RasterizedGlyph {
            bitmap,
            bitmap_size,
            offset: Vec2::new(1.0, -(bitmap_size.y as f32)),
            advance: (size / 2 + 2) as f32,
        })
    }

    fn metrics(&self, size: u32) -> FontMetrics {
        let size = size as f32;
        FontMetrics {
            ascent: size * 0.75,
            descent: size * -0.25,
            line_gap: size * 0.125,
        }
    }

    fn kerning(&self, left: u32, right: u32, _size: u32) -> f32 {
        self.kerning.get(&(left, right)).copied().unwrap_or(0.0)
    }
}
