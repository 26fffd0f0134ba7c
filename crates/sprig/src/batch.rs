//! Quad batching.
//!
//! Quads are staged CPU-side between [`BatchRenderer::begin`] and [`BatchRenderer::end`]
//! and submitted with as few draws as the GPU limits allow. A draw is flushed early when
//! the staging array holds `max_quads` quads, or when a quad needs a texture and all
//! [`MAX_TEXTURE_SLOTS`] slots are taken. Callers never see the split.
//!
//! Slot 0 always holds a 1x1 white texture so untextured quads share the textured path.
//! Slot lookup is a linear scan; with at most 32 entries this beats hashing.

use glam::{UVec2, Vec2};

use crate::atlas::UvRect;
use crate::camera::Camera;
use crate::color::Color;
use crate::config::RendererConfig;
use crate::gpu::{DrawBatch, GpuBackend, TextureDesc, TextureFormat, TextureId};
use crate::vertex::BatchVertex;

/// Textures bound per draw, white slot included.
pub const MAX_TEXTURE_SLOTS: usize = 32;

const VERTICES_PER_QUAD: usize = 4;
const INDICES_PER_QUAD: u32 = 6;

/// Unit quad corners: bottom-left, bottom-right, top-left, top-right.
const CORNERS: [Vec2; 4] = [
    Vec2::new(-0.5, -0.5),
    Vec2::new(0.5, -0.5),
    Vec2::new(-0.5, 0.5),
    Vec2::new(0.5, 0.5),
];

/// A rectangle to draw.
///
/// `pivot` picks the anchor inside the quad: `(0, 0)` is the centre, `(-1, -1)` the
/// bottom-left and `(1, 1)` the top-right corner. `rotation` is counter-clockwise in
/// radians around that anchor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quad {
    pub position: Vec2,
    pub size: Vec2,
    pub pivot: Vec2,
    pub rotation: f32,
    pub color: Color,
}

impl Quad {
    pub fn new(position: Vec2, size: Vec2) -> Self {
        Self {
            position,
            size,
            pivot: Vec2::ZERO,
            rotation: 0.0,
            color: Color::WHITE,
        }
    }

    pub fn with_pivot(mut self, pivot: Vec2) -> Self {
        self.pivot = pivot;
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }
}

/// Pixel rectangle inside a sprite sheet texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sprite {
    pub sheet: TextureId,
    pub min: UVec2,
    pub size: UVec2,
}

/// Counters for the frame started by the last `begin`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub draw_calls: u32,
    pub quads: u32,
    /// Texture slots filled across all draws, white slot excluded.
    pub texture_slots: u32,
}

pub struct BatchRenderer<G: GpuBackend> {
    gpu: G,
    config: RendererConfig,
    white_texture: TextureId,
    vertices: Vec<BatchVertex>,
    textures: Vec<TextureId>,
    camera: Option<Camera>,
    stats: BatchStats,
}

impl<G: GpuBackend> BatchRenderer<G> {
    pub fn new(mut gpu: G, config: RendererConfig) -> Self {
        assert!(config.max_quads > 0, "max_quads must be at least 1");

        let white_texture = gpu.create_texture(&TextureDesc {
            size: UVec2::ONE,
            format: TextureFormat::Rgba8,
            data: Some(&[255, 255, 255, 255]),
        });
        gpu.create_index_buffer(&quad_indices(config.max_quads));

        let mut textures = Vec::with_capacity(MAX_TEXTURE_SLOTS);
        textures.push(white_texture);

        Self {
            gpu,
            config,
            white_texture,
            vertices: Vec::with_capacity(config.max_quads as usize * VERTICES_PER_QUAD),
            textures,
            camera: None,
            stats: BatchStats::default(),
        }
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn white_texture(&self) -> TextureId {
        self.white_texture
    }

    /// Camera of the frame in progress.
    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    pub fn begin(&mut self, camera: Camera) {
        self.reset();
        self.camera = Some(camera);
        self.stats = BatchStats::default();
    }

    /// Submit everything staged since the last flush and close the frame.
    pub fn end(&mut self) {
        let camera = self.frame_camera();
        self.flush(&camera);
        self.reset();
        self.camera = None;
    }

    pub fn draw_quad(&mut self, quad: Quad) {
        self.draw_quad_textured_with_uv(quad, None, UvRect::FULL.to_array());
    }

    pub fn draw_quad_textured(&mut self, quad: Quad, texture: TextureId) {
        self.draw_quad_textured_with_uv(quad, Some(texture), UvRect::FULL.to_array());
    }

    /// Draw a region of a sprite sheet.
    pub fn draw_sprite(&mut self, quad: Quad, sprite: Sprite) {
        let sheet = self.gpu.texture_size(sprite.sheet).max(UVec2::ONE).as_vec2();
        let uv = [
            sprite.min.as_vec2() / sheet,
            (sprite.min + sprite.size).as_vec2() / sheet,
        ];
        self.draw_quad_textured_with_uv(quad, Some(sprite.sheet), uv);
    }

    /// Draw `quad` sampling `texture` between `uv[0]` (top-left) and `uv[1]`
    /// (bottom-right). `None` draws with the white texture.
    pub fn draw_quad_textured_with_uv(
        &mut self,
        quad: Quad,
        texture: Option<TextureId>,
        uv: [Vec2; 2],
    ) {
        let camera = self.frame_camera();

        let mut slot = texture.and_then(|t| self.find_slot(t));
        let slots_full =
            texture.is_some() && slot.is_none() && self.textures.len() == MAX_TEXTURE_SLOTS;
        if slots_full || self.quad_count() == self.config.max_quads as usize {
            self.flush(&camera);
            self.reset();
            slot = None;
        }

        let slot = match (texture, slot) {
            (None, _) => 0,
            (Some(_), Some(slot)) => slot,
            (Some(texture), None) => {
                self.textures.push(texture);
                self.textures.len() - 1
            }
        };

        let [nw, se] = uv;
        let uvs = [
            Vec2::new(nw.x, se.y),
            Vec2::new(se.x, se.y),
            Vec2::new(nw.x, nw.y),
            Vec2::new(se.x, nw.y),
        ];
        let color = quad.color.to_array();
        for (pos, uv) in world_corners(&quad, camera.invert_y).into_iter().zip(uvs) {
            self.vertices.push(BatchVertex {
                pos: pos.to_array(),
                uv: uv.to_array(),
                color,
                texture_index: slot as u32,
            });
        }
        self.stats.quads += 1;
    }

    /// One-pixel outline of `quad`.
    pub fn draw_quad_outline(&mut self, quad: Quad) {
        let camera = self.frame_camera();
        let [bl, br, tl, tr] = world_corners(&quad, camera.invert_y);
        let thickness = camera.world_units_per_pixel();

        for (a, b) in [(bl, br), (br, tr), (tr, tl), (tl, bl)] {
            self.line_world(a, b, thickness, quad.color);
        }
    }

    /// One-pixel line between two points.
    pub fn draw_line(&mut self, from: Vec2, to: Vec2, color: Color) {
        let camera = self.frame_camera();
        let flip = if camera.invert_y {
            Vec2::new(1.0, -1.0)
        } else {
            Vec2::ONE
        };
        self.line_world(
            from * flip,
            to * flip,
            camera.world_units_per_pixel(),
            color,
        );
    }

    /// One-pixel line of `length` from `start` in direction `angle` (radians, CCW).
    pub fn draw_line_angle(&mut self, start: Vec2, angle: f32, length: f32, color: Color) {
        self.draw_line(start, start + Vec2::from_angle(angle) * length, color);
    }

    fn line_world(&mut self, a: Vec2, b: Vec2, thickness: f32, color: Color) {
        let diff = b - a;
        let quad = Quad::new((a + b) * 0.5, Vec2::new(diff.length(), thickness))
            .with_rotation(diff.y.atan2(diff.x))
            .with_color(color);

        // Already in world space; pre-flip so the vertical flip cancels out.
        let quad = match self.camera {
            Some(camera) if camera.invert_y => Quad {
                position: Vec2::new(quad.position.x, -quad.position.y),
                ..quad
            },
            _ => quad,
        };
        self.draw_quad(quad);
    }

    fn find_slot(&self, texture: TextureId) -> Option<usize> {
        self.textures
            .iter()
            .skip(1)
            .position(|t| *t == texture)
            .map(|i| i + 1)
    }

    fn quad_count(&self) -> usize {
        self.vertices.len() / VERTICES_PER_QUAD
    }

    fn frame_camera(&self) -> Camera {
        match self.camera {
            Some(camera) => camera,
            None => panic!("BatchRenderer used outside begin/end"),
        }
    }

    fn reset(&mut self) {
        self.vertices.clear();
        self.textures.truncate(1);
    }

    fn flush(&mut self, camera: &Camera) {
        if self.vertices.is_empty() {
            return;
        }

        let quads = self.quad_count() as u32;
        self.gpu.draw_batch(&DrawBatch {
            vertices: &self.vertices,
            textures: &self.textures,
            camera: camera.to_uniform(),
            index_count: quads * INDICES_PER_QUAD,
        });

        self.stats.draw_calls += 1;
        self.stats.texture_slots += self.textures.len() as u32 - 1;
        log::debug!(
            "flushed {} quads with {} textures",
            quads,
            self.textures.len()
        );
    }
}

/// Vertex positions of `quad` in world space, in [`CORNERS`] order.
fn world_corners(quad: &Quad, invert_y: bool) -> [Vec2; 4] {
    let (mut position, mut pivot) = (quad.position, quad.pivot);
    if invert_y {
        position.y = -position.y;
        pivot.y = -pivot.y;
    }

    let rotation = Vec2::from_angle(quad.rotation);
    CORNERS.map(|corner| rotation.rotate((corner - pivot * 0.5) * quad.size) + position)
}

/// Two triangles per quad over its four vertices: (0, 1, 2) and (2, 3, 1).
pub fn quad_indices(max_quads: u32) -> Vec<u32> {
    (0..max_quads)
        .flat_map(|q| {
            let j = q * VERTICES_PER_QUAD as u32;
            [j, j + 1, j + 2, j + 2, j + 3, j + 1]
        })
        .collect()
}
