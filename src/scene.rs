// Vertex format and the default scene
//
// The core uploads whatever fixed vertex list the caller hands it. The
// triangle below is the scene the binary draws.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Interleaved vertex: 2D position followed by RGBA color
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec2,
    pub color: [f32; 4],
}

impl Vertex {
    pub const fn new(position: [f32; 2], color: [f32; 4]) -> Self {
        Self {
            position: Vec2::new(position[0], position[1]),
            color,
        }
    }

    /// One per-vertex binding at slot 0
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(std::mem::size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    /// Position at location 0, color at location 1
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(0)
                .build(),
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32A32_SFLOAT)
                .offset(std::mem::size_of::<Vec2>() as u32)
                .build(),
        ]
    }
}

/// Red/green/blue triangle centered on the viewport
pub const DEFAULT_TRIANGLE: [Vertex; 3] = [
    Vertex::new([-0.5, -0.5], [1.0, 0.0, 0.0, 1.0]),
    Vertex::new([0.5, -0.5], [0.0, 1.0, 0.0, 1.0]),
    Vertex::new([0.0, 0.5], [0.0, 0.0, 1.0, 1.0]),
];

/// Exact byte size of a vertex list as uploaded to the GPU
pub fn byte_size(vertices: &[Vertex]) -> vk::DeviceSize {
    std::mem::size_of_val(vertices) as vk::DeviceSize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_tightly_packed() {
        // 2 floats + 4 floats, no padding
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
        assert_eq!(Vertex::binding_description().stride, 24);
    }

    #[test]
    fn test_attribute_layout() {
        let [position, color] = Vertex::attribute_descriptions();
        assert_eq!(position.location, 0);
        assert_eq!(position.offset, 0);
        assert_eq!(position.format, vk::Format::R32G32_SFLOAT);
        assert_eq!(color.location, 1);
        assert_eq!(color.offset, 8);
        assert_eq!(color.format, vk::Format::R32G32B32A32_SFLOAT);
    }

    #[test]
    fn test_default_triangle_bytes() {
        assert_eq!(byte_size(&DEFAULT_TRIANGLE), 3 * 24);

        let bytes: &[u8] = bytemuck::cast_slice(&DEFAULT_TRIANGLE);
        let first_x = f32::from_ne_bytes(bytes[0..4].try_into().unwrap());
        let last_blue = f32::from_ne_bytes(bytes[64..68].try_into().unwrap());
        assert_eq!(first_x, -0.5);
        assert_eq!(last_blue, 1.0);
    }
}
