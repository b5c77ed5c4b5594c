use std::mem::{offset_of, size_of};

use ash::vk::{
    Format, VertexInputAttributeDescription, VertexInputBindingDescription, VertexInputRate,
};
use bytemuck::{Pod, Zeroable};

/// One corner of the quad as the vertex shader consumes it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 3],
}

impl Vertex {
    pub fn binding_description() -> VertexInputBindingDescription {
        VertexInputBindingDescription::default()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(VertexInputRate::VERTEX)
    }

    pub fn attribute_descriptions() -> [VertexInputAttributeDescription; 2] {
        [
            VertexInputAttributeDescription::default()
                .binding(0)
                .location(0)
                .format(Format::R32G32_SFLOAT)
                .offset(offset_of!(Vertex, position) as u32),
            VertexInputAttributeDescription::default()
                .binding(0)
                .location(1)
                .format(Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Vertex, color) as u32),
        ]
    }
}

/// The quad corners, wound clockwise per triangle to match the pipeline's
/// front-face setting.
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex {
        position: [-0.5, -0.5],
        color: [1.0, 0.2, 0.2],
    },
    Vertex {
        position: [0.5, -0.5],
        color: [0.2, 1.0, 0.2],
    },
    Vertex {
        position: [0.5, 0.5],
        color: [0.2, 0.2, 1.0],
    },
    Vertex {
        position: [-0.5, 0.5],
        color: [1.0, 1.0, 1.0],
    },
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Per-frame shader globals, written through the slot's mapped uniform
/// region every frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct QuadUniforms {
    pub transform: [[f32; 4]; 4],
}

impl QuadUniforms {
    /// Scales x by height/width so the quad stays square whatever the
    /// window shape.
    pub fn aspect_corrected(width: u32, height: u32) -> Self {
        let aspect = if width == 0 {
            1.0
        } else {
            height as f32 / width as f32
        };
        Self {
            transform: [
                [aspect, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }
}
