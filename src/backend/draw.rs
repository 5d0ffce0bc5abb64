// Per-frame draw recording
//
// Everything one indexed draw needs, recorded into an open render pass.

use ash::vk;
use super::gpu::Gpu;

#[derive(Debug, Clone, Copy)]
pub struct DrawCall {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_type: vk::IndexType,
    pub index_count: u32,
    /// Descriptor set of the current frame slot
    pub descriptor_set: vk::DescriptorSet,
    pub extent: vk::Extent2D,
}

/// Full-extent viewport with the standard 0..1 depth range
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn record_draw<D: Gpu + ?Sized>(device: &D, cmd: vk::CommandBuffer, draw: &DrawCall) {
    device.cmd_set_viewport(cmd, full_viewport(draw.extent));
    device.cmd_set_scissor(
        cmd,
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: draw.extent,
        },
    );
    device.cmd_bind_pipeline(cmd, draw.pipeline);
    device.cmd_bind_vertex_buffer(cmd, draw.vertex_buffer);
    device.cmd_bind_index_buffer(cmd, draw.index_buffer, draw.index_type);
    if draw.descriptor_set != vk::DescriptorSet::null() {
        device.cmd_bind_descriptor_set(cmd, draw.layout, draw.descriptor_set);
    }
    device.cmd_draw_indexed(cmd, draw.index_count);
}
