//! Tunables for the renderer and the glyph caches

/// Batch renderer configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RendererConfig {
    /// Quads accumulated before an implicit flush. Fixes the size of the staging
    /// vertex array and the static index buffer.
    pub max_quads: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self { max_quads: 4096 }
    }
}

/// Glyph cache configuration, shared by every pixel size of a font.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FontConfig {
    /// Edge length of a freshly created atlas, in pixels.
    pub initial_atlas_size: u32,
    /// Atlas growth stops once an edge would exceed this many pixels.
    pub max_atlas_size: u32,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            initial_atlas_size: 256,
            // Matches wgpu's default `max_texture_dimension_2d`.
            max_atlas_size: 8192,
        }
    }
}
