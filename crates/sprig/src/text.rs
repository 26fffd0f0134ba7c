//! Single-line text drawing on top of the batch renderer.

use glam::Vec2;

use crate::batch::{BatchRenderer, Quad};
use crate::color::Color;
use crate::font::Font;
use crate::gpu::GpuBackend;
use crate::raster::GlyphRasterizer;

/// Draw `text` as one quad per glyph, anchored at `position` by `pivot`.
///
/// `pivot` works like [`Quad::pivot`] over the measured text box: `(0, 0)` centres
/// the text, `(-1, 1)` puts its top-left corner on `position`. Font sizes are pixels,
/// converted to world units with the camera of the frame in progress.
pub fn draw_text<G: GpuBackend, R: GlyphRasterizer>(
    renderer: &mut BatchRenderer<G>,
    font: &mut Font<R>,
    text: &str,
    pivot: Vec2,
    position: Vec2,
    color: Color,
) {
    let Some(camera) = renderer.camera().copied() else {
        panic!("BatchRenderer used outside begin/end");
    };
    let scale = camera.world_units_per_pixel();

    let text_size = font.measure_string(renderer.gpu_mut(), text);
    let metrics = font.get_metrics();

    // Pen in pixels, Y down, starting on the first baseline.
    let mut pivot = pivot * 0.5;
    if !camera.invert_y {
        pivot.y = -pivot.y;
    }
    let mut pen = Vec2::new(0.0, metrics.ascent) - text_size * (pivot + 0.5);

    let (flip, glyph_pivot) = if camera.invert_y {
        (Vec2::ONE, Vec2::new(-1.0, -1.0))
    } else {
        (Vec2::new(1.0, -1.0), Vec2::new(-1.0, 1.0))
    };

    let mut prev = None;
    for ch in text.chars() {
        let glyph = font.get_glyph(renderer.gpu_mut(), ch);
        if let Some(prev) = prev {
            pen.x += font.get_kerning(prev, ch);
        }
        prev = Some(ch);

        let glyph_pos = (pen + glyph.offset) * scale * flip + position;
        renderer.draw_quad_textured_with_uv(
            Quad::new(glyph_pos, glyph.size * scale)
                .with_pivot(glyph_pivot)
                .with_color(color),
            Some(font.atlas_texture()),
            glyph.uv,
        );
        pen.x += glyph.advance;
    }
}
