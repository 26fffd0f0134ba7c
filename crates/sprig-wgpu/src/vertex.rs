use sprig::BatchVertex;

/// Buffer layout of [`BatchVertex`]: position, UV, color, texture slot.
pub const fn batch_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: &[wgpu::VertexAttribute] = &[
        wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x2,
        },
        wgpu::VertexAttribute {
            offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
            shader_location: 1,
            format: wgpu::VertexFormat::Float32x2,
        },
        wgpu::VertexAttribute {
            offset: std::mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
            shader_location: 2,
            format: wgpu::VertexFormat::Float32x4,
        },
        wgpu::VertexAttribute {
            offset: std::mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
            shader_location: 3,
            format: wgpu::VertexFormat::Uint32,
        },
    ];

    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<BatchVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: ATTRIBUTES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_vertex_struct() {
        let layout = batch_vertex_layout();
        assert_eq!(layout.array_stride, 36);
        assert_eq!(
            layout.attributes.last().map(|a| a.offset),
            Some(std::mem::offset_of!(BatchVertex, texture_index) as u64)
        );
        assert_eq!(
            layout.attributes[2].offset,
            std::mem::offset_of!(BatchVertex, color) as u64
        );
    }
}
