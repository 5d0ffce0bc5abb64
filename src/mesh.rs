// Mesh data and its GPU buffers

use anyhow::Result;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem::{offset_of, size_of};
use std::sync::Arc;

use crate::backend::buffer;
use crate::backend::{VertexLayout, VulkanDevice};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub const fn new(position: [f32; 3], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Locations 0, 1, 2 match the vertex shader inputs
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, tex_coord) as u32,
            },
        ]
    }

    pub fn layout() -> VertexLayout {
        VertexLayout {
            bindings: vec![Self::binding_description()],
            attributes: Self::attribute_descriptions().to_vec(),
        }
    }
}

const CUBE_VERTICES: [Vertex; 8] = [
    // Top
    Vertex::new([0.5, -0.5, 0.5], [1.0, 0.0, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, 0.5, 0.5], [0.0, 1.0, 0.0], [0.0, 0.0]),
    Vertex::new([-0.5, 0.5, 0.5], [0.0, 0.0, 1.0], [0.0, 1.0]),
    Vertex::new([-0.5, -0.5, 0.5], [1.0, 1.0, 1.0], [1.0, 1.0]),
    // Bottom
    Vertex::new([0.5, -0.5, -0.5], [1.0, 0.0, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, 0.5, -0.5], [0.0, 1.0, 0.0], [0.0, 0.0]),
    Vertex::new([-0.5, 0.5, -0.5], [0.0, 0.0, 1.0], [0.0, 1.0]),
    Vertex::new([-0.5, -0.5, -0.5], [1.0, 1.0, 1.0], [1.0, 1.0]),
];

#[rustfmt::skip]
const CUBE_INDICES: [u16; 36] = [
    0, 1, 2, 2, 3, 0,
    0, 4, 5, 5, 1, 0,
    1, 5, 6, 6, 2, 1,
    2, 6, 7, 7, 3, 2,
    3, 7, 4, 4, 0, 3,
    4, 7, 6, 6, 5, 4,
];

/// Unit cube centred on the origin, colored per corner
pub fn cube() -> (Vec<Vertex>, Vec<u16>) {
    (CUBE_VERTICES.to_vec(), CUBE_INDICES.to_vec())
}

/// Device-local vertex and index buffers
pub struct Mesh {
    device: Arc<VulkanDevice>,
    vertex_buffer: vk::Buffer,
    vertex_memory: vk::DeviceMemory,
    index_buffer: vk::Buffer,
    index_memory: vk::DeviceMemory,
    index_count: u32,
}

impl Mesh {
    pub fn new(device: Arc<VulkanDevice>, vertices: &[Vertex], indices: &[u16]) -> Result<Self> {
        anyhow::ensure!(vertices.len() >= 3, "Mesh needs at least 3 vertices");
        anyhow::ensure!(!indices.is_empty(), "Mesh needs at least one index");

        let (vertex_buffer, vertex_memory) = buffer::create_device_local_buffer(
            &device,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vertices,
        )?;

        let (index_buffer, index_memory) = match buffer::create_device_local_buffer(
            &device,
            vk::BufferUsageFlags::INDEX_BUFFER,
            indices,
        ) {
            Ok(created) => created,
            Err(e) => {
                buffer::destroy_buffer(&device, vertex_buffer, vertex_memory);
                return Err(e);
            }
        };

        log::debug!(
            "Uploaded mesh: {} vertices, {} indices",
            vertices.len(),
            indices.len()
        );

        Ok(Self {
            device,
            vertex_buffer,
            vertex_memory,
            index_buffer,
            index_memory,
            index_count: indices.len() as u32,
        })
    }

    pub fn cube(device: Arc<VulkanDevice>) -> Result<Self> {
        let (vertices, indices) = cube();
        Self::new(device, &vertices, &indices)
    }

    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer
    }

    pub fn index_type(&self) -> vk::IndexType {
        vk::IndexType::UINT16
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        buffer::destroy_buffer(&self.device, self.index_buffer, self.index_memory);
        buffer::destroy_buffer(&self.device, self.vertex_buffer, self.vertex_memory);
    }
}
