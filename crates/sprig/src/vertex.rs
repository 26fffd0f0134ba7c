use bytemuck::{Pod, Zeroable};

/// Vertex emitted by the batch renderer, four per quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct BatchVertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
    /// Slot in the batch's texture table.
    pub texture_index: u32,
}
