//! Narrow GPU seam used by the batch renderer and the glyph caches.
//!
//! Keeps `sprig` free of any graphics API; `sprig-wgpu` provides the real backend.

use glam::UVec2;

use crate::camera::CameraUniform;
use crate::vertex::BatchVertex;

/// Opaque handle to a texture owned by a [`GpuBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    /// Single channel coverage, sampled as white with the coverage in alpha.
    R8,
    Rgba8,
}

impl TextureFormat {
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8 => 1,
            Self::Rgba8 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TextureDesc<'a> {
    pub size: UVec2,
    pub format: TextureFormat,
    /// Initial contents, tightly packed. `None` leaves the texture zeroed.
    pub data: Option<&'a [u8]>,
}

/// Sub-rectangle upload.
#[derive(Clone, Copy, Debug)]
pub struct TextureWrite<'a> {
    pub origin: UVec2,
    pub size: UVec2,
    pub format: TextureFormat,
    /// Row alignment of `data` in bytes.
    pub alignment: u32,
    pub data: &'a [u8],
}

/// One flushed sub-batch.
#[derive(Clone, Copy, Debug)]
pub struct DrawBatch<'a> {
    /// Four vertices per quad.
    pub vertices: &'a [BatchVertex],
    /// Slot table; `BatchVertex::texture_index` indexes into it.
    pub textures: &'a [TextureId],
    pub camera: CameraUniform,
    pub index_count: u32,
}

pub trait GpuBackend {
    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> TextureId;

    /// Reallocate `texture` at `size` with `data` as its full contents.
    fn resize_texture(&mut self, texture: TextureId, size: UVec2, data: &[u8]);

    fn write_texture(&mut self, texture: TextureId, write: &TextureWrite<'_>);

    fn texture_size(&self, texture: TextureId) -> UVec2;

    /// Upload the static quad index pattern shared by every draw.
    fn create_index_buffer(&mut self, indices: &[u32]);

    /// Issue one indexed draw for `batch`.
    fn draw_batch(&mut self, batch: &DrawBatch<'_>);
}
