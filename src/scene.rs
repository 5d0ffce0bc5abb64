// Mesh render system
//
// Owns everything the mesh draw needs besides the pipeline: geometry,
// texture, descriptor sets and one persistently mapped uniform buffer per
// frame slot. The pipeline itself lives in the Renderer, which rebuilds it
// with the swapchain.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::mem::size_of;
use std::sync::Arc;

use crate::backend::pipeline::FixedFunctionConfig;
use crate::backend::{record_draw, DrawCall, PipelineBuilder, Renderer, VulkanDevice};
use crate::camera::CameraUniform;
use crate::config::{SceneConfig, ShaderConfig};
use crate::mesh::{Mesh, Vertex};
use crate::texture::Texture;

/// Binding 0: camera uniform (vertex), binding 1: texture (fragment)
pub fn descriptor_bindings() -> [vk::DescriptorSetLayoutBinding; 2] {
    [
        vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build(),
        vk::DescriptorSetLayoutBinding::builder()
            .binding(1)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build(),
    ]
}

/// Fixed-function state for the mesh pipeline
pub fn fixed_function() -> FixedFunctionConfig {
    FixedFunctionConfig {
        vertex_layout: Vertex::layout(),
        ..FixedFunctionConfig::default()
    }
}

struct UniformBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
}

pub struct MeshRenderer {
    device: Arc<VulkanDevice>,
    uniforms: Vec<UniformBuffer>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    pipeline_layout: vk::PipelineLayout,
    descriptor_set_layout: vk::DescriptorSetLayout,
    texture: Texture,
    mesh: Mesh,
}

impl MeshRenderer {
    /// `slots` must match the renderer's frames in flight
    pub fn new(device: Arc<VulkanDevice>, scene: &SceneConfig, slots: usize) -> Result<Self> {
        let mesh = Mesh::cube(Arc::clone(&device))?;
        let texture = Texture::from_optional_path(Arc::clone(&device), scene.texture.as_deref())?;

        let bindings = descriptor_bindings();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let descriptor_set_layout =
            unsafe { device.device.create_descriptor_set_layout(&layout_info, None) }
                .context("Failed to create descriptor set layout")?;

        // Drop handles partial construction from here on
        let mut system = Self {
            device: Arc::clone(&device),
            uniforms: Vec::with_capacity(slots),
            descriptor_sets: Vec::new(),
            pipeline_layout: vk::PipelineLayout::null(),
            descriptor_set_layout,
            texture,
            mesh,
        };

        let set_layouts = [descriptor_set_layout];
        let pipeline_layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        system.pipeline_layout =
            unsafe { device.device.create_pipeline_layout(&pipeline_layout_info, None) }
                .context("Failed to create pipeline layout")?;

        for _ in 0..slots {
            let uniform = system.create_uniform_buffer()?;
            system.uniforms.push(uniform);
        }

        system.allocate_descriptor_sets(slots)?;

        log::info!("Mesh render system ready ({} frame slots)", slots);
        Ok(system)
    }

    fn create_uniform_buffer(&self) -> Result<UniformBuffer> {
        let device = &self.device;
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size_of::<CameraUniform>() as vk::DeviceSize)
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .context("Failed to create uniform buffer")?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };
        let allocated = device.allocator().allocate(&AllocationCreateDesc {
            name: "camera_uniform",
            requirements,
            location: MemoryLocation::CpuToGpu,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });

        let allocation = match allocated {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e).context("Failed to allocate uniform buffer memory");
            }
        };

        let bound = unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };

        let uniform = UniformBuffer {
            buffer,
            allocation: Some(allocation),
        };
        if let Err(e) = bound {
            self.destroy_uniform(uniform);
            return Err(e).context("Failed to bind uniform buffer memory");
        }
        Ok(uniform)
    }

    fn destroy_uniform(&self, mut uniform: UniformBuffer) {
        if let Some(allocation) = uniform.allocation.take() {
            if let Err(e) = self.device.allocator().free(allocation) {
                log::error!("Failed to free uniform allocation: {:?}", e);
            }
        }
        unsafe { self.device.device.destroy_buffer(uniform.buffer, None) };
    }

    fn allocate_descriptor_sets(&mut self, slots: usize) -> Result<()> {
        let layouts = vec![self.descriptor_set_layout; slots];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.device.descriptor_pool)
            .set_layouts(&layouts);

        self.descriptor_sets = unsafe { self.device.device.allocate_descriptor_sets(&alloc_info) }
            .context("Failed to allocate descriptor sets")?;

        for (set, uniform) in self.descriptor_sets.iter().zip(&self.uniforms) {
            let buffer_info = [vk::DescriptorBufferInfo {
                buffer: uniform.buffer,
                offset: 0,
                range: size_of::<CameraUniform>() as vk::DeviceSize,
            }];
            let image_info = [vk::DescriptorImageInfo {
                sampler: self.texture.sampler(),
                image_view: self.texture.view(),
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }];

            let writes = [
                vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_info)
                    .build(),
                vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(1)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_info)
                    .build(),
            ];

            unsafe { self.device.device.update_descriptor_sets(&writes, &[]) };
        }
        Ok(())
    }

    /// Pipeline description the renderer rebuilds with every swapchain
    pub fn pipeline_builder(&self, shaders: &ShaderConfig) -> PipelineBuilder {
        PipelineBuilder::new(
            shaders.vertex.clone(),
            shaders.fragment.clone(),
            fixed_function(),
            self.pipeline_layout,
        )
    }

    /// Write the camera for `slot`. Only call once that slot's fence has been
    /// waited on, i.e. after `start_frame`.
    pub fn update_uniform(&mut self, slot: usize, uniform: &CameraUniform) -> Result<()> {
        let allocation = self
            .uniforms
            .get_mut(slot)
            .and_then(|u| u.allocation.as_mut())
            .with_context(|| format!("No uniform buffer for frame slot {}", slot))?;

        let mapped = allocation
            .mapped_slice_mut()
            .context("Uniform buffer memory is not mapped")?;

        let bytes = bytemuck::bytes_of(uniform);
        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Record the mesh draw into the renderer's open frame
    pub fn record(&self, renderer: &Renderer<VulkanDevice>, cmd: vk::CommandBuffer) -> Result<()> {
        let pipeline = renderer
            .pipeline()
            .context("Renderer has no pipeline to draw with")?;
        let slot = renderer.frame_index();
        let descriptor_set = *self
            .descriptor_sets
            .get(slot)
            .with_context(|| format!("No descriptor set for frame slot {}", slot))?;

        record_draw(
            self.device.as_ref(),
            cmd,
            &DrawCall {
                pipeline: pipeline.handle(),
                layout: pipeline.layout(),
                vertex_buffer: self.mesh.vertex_buffer(),
                index_buffer: self.mesh.index_buffer(),
                index_type: self.mesh.index_type(),
                index_count: self.mesh.index_count(),
                descriptor_set,
                extent: renderer.extent(),
            },
        );
        Ok(())
    }
}

impl Drop for MeshRenderer {
    fn drop(&mut self) {
        // Descriptor sets go back with the pool when the device is destroyed
        for uniform in std::mem::take(&mut self.uniforms) {
            self.destroy_uniform(uniform);
        }
        unsafe {
            if self.pipeline_layout != vk::PipelineLayout::null() {
                self.device
                    .device
                    .destroy_pipeline_layout(self.pipeline_layout, None);
            }
            self.device
                .device
                .destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        }
        log::debug!("Mesh render system destroyed");
    }
}
