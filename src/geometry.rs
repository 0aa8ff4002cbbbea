// Geometry - vertex format and the static triangle
//
// Vertices are interleaved position + colour, one binding, uploaded once into a
// host-visible vertex buffer.

use anyhow::Result;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use std::mem::{offset_of, size_of};
use std::sync::Arc;

use crate::backend::{Buffer, VulkanDevice};

/// Interleaved vertex: position at location 0, colour at location 1.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
}

impl Vertex {
    pub const fn new(position: Vec3, color: Vec3) -> Self {
        Self { position, color }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
        ]
    }
}

/// Top red, bottom-right green, bottom-left blue. Y points up.
pub const TRIANGLE: [Vertex; 3] = [
    Vertex::new(Vec3::new(0.0, 0.5, 0.0), Vec3::new(1.0, 0.0, 0.0)),
    Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::new(0.0, 1.0, 0.0)),
    Vertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::new(0.0, 0.0, 1.0)),
];

/// Vertex data living on the GPU.
pub struct Mesh {
    buffer: Buffer,
    vertex_count: u32,
    device: Arc<VulkanDevice>,
}

impl Mesh {
    pub fn upload(device: Arc<VulkanDevice>, vertices: &[Vertex]) -> Result<Self> {
        if vertices.is_empty() {
            anyhow::bail!("Cannot upload a mesh with no vertices");
        }

        let buffer = Buffer::with_data(
            &device,
            "vertices",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vertices,
        )?;

        log::info!("Uploaded {} vertices ({} bytes)", vertices.len(), buffer.size);

        Ok(Self {
            buffer,
            vertex_count: vertices.len() as u32,
            device,
        })
    }

    /// Bind the vertex buffer and draw every vertex once.
    pub fn draw(&self, cmd: vk::CommandBuffer) -> Result<()> {
        if self.buffer.buffer == vk::Buffer::null() {
            anyhow::bail!("Mesh has been destroyed");
        }

        unsafe {
            self.device
                .device
                .cmd_bind_vertex_buffers(cmd, 0, &[self.buffer.buffer], &[0]);
            self.device.device.cmd_draw(cmd, self.vertex_count, 1, 0, 0);
        }
        Ok(())
    }

    /// Free the vertex buffer. Safe to call twice.
    pub fn destroy(&mut self) {
        self.buffer.destroy(&self.device);
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_six_tightly_packed_floats() {
        assert_eq!(size_of::<Vertex>(), 6 * size_of::<f32>());
        assert_eq!(Vertex::binding_description().stride, 24);
    }

    #[test]
    fn attributes_point_at_position_then_color() {
        let [position, color] = Vertex::attribute_descriptions();
        assert_eq!((position.location, position.offset), (0, 0));
        assert_eq!((color.location, color.offset), (1, 12));
        assert_eq!(position.format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(color.binding, Vertex::binding_description().binding);
    }

    #[test]
    fn triangle_bytes_match_interleaved_layout() {
        let floats: &[f32] = bytemuck::cast_slice(&TRIANGLE);
        assert_eq!(
            floats,
            &[
                0.0, 0.5, 0.0, 1.0, 0.0, 0.0, //
                0.5, -0.5, 0.0, 0.0, 1.0, 0.0, //
                -0.5, -0.5, 0.0, 0.0, 0.0, 1.0,
            ]
        );
    }

    #[test]
    fn triangle_winds_clockwise_with_y_up() {
        let [a, b, c] = TRIANGLE.map(|v| v.position);
        assert!((b - a).cross(c - a).z < 0.0);
    }
}
