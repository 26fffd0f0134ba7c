//! # sprig
//!
//! Quad-batching 2D renderer with a growable glyph atlas.
//!
//! This crate holds the batching, atlas packing and glyph caching logic with no
//! dependency on a graphics API or a font library. GPU access goes through
//! [`GpuBackend`] (see `sprig-wgpu`) and rasterization through [`GlyphRasterizer`]
//! (see `sprig-text`).

mod atlas;
mod batch;
mod camera;
mod color;
mod config;
mod font;
mod gpu;
mod raster;
pub mod text;
mod vertex;

#[cfg(test)]
mod testing;

pub use atlas::*;
pub use batch::*;
pub use camera::*;
pub use color::*;
pub use config::*;
pub use font::*;
pub use gpu::*;
pub use raster::*;
pub use text::*;
pub use vertex::*;
