// Test doubles for the frame lifecycle
//
// MockGpu implements Gpu entirely in memory: it hands out fake handles, counts
// which ones are still alive, records every command and lets tests script the
// results of acquire/present. MockWindow replays a scripted extent sequence.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use winit::event::MouseButton;
use winit::keyboard::KeyCode;

use super::gpu::{Gpu, SurfaceSupport, SwapchainDesc};
use crate::window::{InputState, WindowSurface};

/// A command recorded into a command buffer
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Reset,
    Begin,
    End,
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: (u32, u32),
        clear: [f32; 4],
    },
    EndRenderPass,
    SetViewport {
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    },
    SetScissor {
        extent: (u32, u32),
    },
    BindPipeline(vk::Pipeline),
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer, vk::IndexType),
    BindDescriptorSet(vk::DescriptorSet),
    DrawIndexed(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct SwapchainCreation {
    pub handle: vk::SwapchainKHR,
    pub extent: (u32, u32),
    pub min_image_count: u32,
    pub format: vk::Format,
    pub present_mode: vk::PresentModeKHR,
    pub old_swapchain: vk::SwapchainKHR,
}

#[derive(Debug, Clone, Copy)]
pub struct Submission {
    pub command_buffer: vk::CommandBuffer,
    pub wait: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal: vk::Semaphore,
    pub fence: vk::Fence,
    /// Whether the fence had been reset before this submit
    pub fence_was_reset: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Presentation {
    pub swapchain: vk::SwapchainKHR,
    pub image_index: u32,
    pub wait: vk::Semaphore,
}

/// Fields read back out of the last VkRenderPassCreateInfo
#[derive(Debug, Clone, Copy)]
pub struct RenderPassSummary {
    pub attachment_count: u32,
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
    pub dependency_src: u32,
    pub dependency_dst: u32,
    pub dependency_dst_stage: vk::PipelineStageFlags,
    pub dependency_dst_access: vk::AccessFlags,
}

/// Fields read back out of the last VkGraphicsPipelineCreateInfo
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub stage_count: u32,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub blend_enable: bool,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub vertex_bindings: u32,
    pub vertex_attributes: u32,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub layout: vk::PipelineLayout,
}

struct MockState {
    next_handle: u64,
    support: SurfaceSupport,
    surface_extents: VecDeque<(u32, u32)>,

    swapchains: HashMap<u64, u32>,
    image_views: HashSet<u64>,
    render_passes: HashSet<u64>,
    framebuffers: HashMap<u64, u64>,
    semaphores: HashSet<u64>,
    fences: HashMap<u64, bool>,
    command_buffers: HashSet<u64>,
    shader_modules: HashSet<u64>,
    pipelines: HashSet<u64>,

    swapchain_log: Vec<SwapchainCreation>,
    acquire_script: VecDeque<VkResult<(u32, bool)>>,
    present_script: VecDeque<VkResult<bool>>,
    acquire_counter: HashMap<u64, u32>,
    commands: Vec<(vk::CommandBuffer, Recorded)>,
    calls: Vec<&'static str>,
    submissions: Vec<Submission>,
    presentations: Vec<Presentation>,
    command_buffer_allocations: u32,
    last_render_pass: Option<RenderPassSummary>,
    last_pipeline: Option<PipelineSummary>,

    framebuffers_created: usize,
    fail_framebuffer_after: Option<usize>,
    fail_fence: bool,
    reject_shaders: bool,
    fail_pipeline: Option<vk::Result>,
}

pub struct MockGpu {
    state: RefCell<MockState>,
}

impl Default for MockGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGpu {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(MockState {
                next_handle: 0x1000,
                support: Self::default_support(),
                surface_extents: VecDeque::new(),
                swapchains: HashMap::new(),
                image_views: HashSet::new(),
                render_passes: HashSet::new(),
                framebuffers: HashMap::new(),
                semaphores: HashSet::new(),
                fences: HashMap::new(),
                command_buffers: HashSet::new(),
                shader_modules: HashSet::new(),
                pipelines: HashSet::new(),
                swapchain_log: Vec::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                acquire_counter: HashMap::new(),
                commands: Vec::new(),
                calls: Vec::new(),
                submissions: Vec::new(),
                presentations: Vec::new(),
                command_buffer_allocations: 0,
                last_render_pass: None,
                last_pipeline: None,
                framebuffers_created: 0,
                fail_framebuffer_after: None,
                fail_fence: false,
                reject_shaders: false,
                fail_pipeline: None,
            }),
        }
    }

    /// Window-system style surface: extent follows the request, 2..=unbounded images
    pub fn default_support() -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    fn next<H: Handle>(state: &mut MockState) -> H {
        state.next_handle += 1;
        H::from_raw(state.next_handle)
    }

    // ── scripting ──────────────────────────────────────────────────────────

    pub fn set_surface_support(&self, support: SurfaceSupport) {
        self.state.borrow_mut().support = support;
    }

    /// Each surface query takes the next `current_extent`; the last one sticks
    pub fn script_surface_extents(&self, extents: &[(u32, u32)]) {
        self.state.borrow_mut().surface_extents.extend(extents.iter().copied());
    }

    pub fn script_acquire(&self, result: VkResult<(u32, bool)>) {
        self.state.borrow_mut().acquire_script.push_back(result);
    }

    pub fn script_present(&self, result: VkResult<bool>) {
        self.state.borrow_mut().present_script.push_back(result);
    }

    /// Framebuffer creation fails once `n` framebuffers have been created
    pub fn fail_framebuffer_after(&self, n: usize) {
        let mut s = self.state.borrow_mut();
        s.fail_framebuffer_after = Some(s.framebuffers_created + n);
    }

    pub fn fail_fence_creation(&self, fail: bool) {
        self.state.borrow_mut().fail_fence = fail;
    }

    pub fn reject_shaders(&self, reject: bool) {
        self.state.borrow_mut().reject_shaders = reject;
    }

    pub fn fail_pipeline(&self, result: Option<vk::Result>) {
        self.state.borrow_mut().fail_pipeline = result;
    }

    // ── inspection ─────────────────────────────────────────────────────────

    pub fn live_swapchains(&self) -> usize {
        self.state.borrow().swapchains.len()
    }
    pub fn live_image_views(&self) -> usize {
        self.state.borrow().image_views.len()
    }
    pub fn live_render_passes(&self) -> usize {
        self.state.borrow().render_passes.len()
    }
    pub fn live_framebuffers(&self) -> usize {
        self.state.borrow().framebuffers.len()
    }
    pub fn live_semaphores(&self) -> usize {
        self.state.borrow().semaphores.len()
    }
    pub fn live_fences(&self) -> usize {
        self.state.borrow().fences.len()
    }
    pub fn live_command_buffers(&self) -> usize {
        self.state.borrow().command_buffers.len()
    }
    pub fn live_shader_modules(&self) -> usize {
        self.state.borrow().shader_modules.len()
    }
    pub fn live_pipelines(&self) -> usize {
        self.state.borrow().pipelines.len()
    }

    /// Every fake handle that has not been destroyed
    pub fn live_total(&self) -> usize {
        self.live_swapchains()
            + self.live_image_views()
            + self.live_render_passes()
            + self.live_framebuffers()
            + self.live_semaphores()
            + self.live_fences()
            + self.live_command_buffers()
            + self.live_shader_modules()
            + self.live_pipelines()
    }

    pub fn is_live_swapchain(&self, swapchain: vk::SwapchainKHR) -> bool {
        self.state.borrow().swapchains.contains_key(&swapchain.as_raw())
    }

    pub fn fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state
            .borrow()
            .fences
            .get(&fence.as_raw())
            .copied()
            .unwrap_or(false)
    }

    pub fn framebuffer_render_pass(&self, framebuffer: vk::Framebuffer) -> Option<vk::RenderPass> {
        self.state
            .borrow()
            .framebuffers
            .get(&framebuffer.as_raw())
            .map(|&rp| vk::RenderPass::from_raw(rp))
    }

    pub fn swapchain_log(&self) -> Vec<SwapchainCreation> {
        self.state.borrow().swapchain_log.clone()
    }

    pub fn commands(&self) -> Vec<(vk::CommandBuffer, Recorded)> {
        self.state.borrow().commands.clone()
    }

    pub fn commands_for(&self, cmd: vk::CommandBuffer) -> Vec<Recorded> {
        self.state
            .borrow()
            .commands
            .iter()
            .filter(|(c, _)| *c == cmd)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn clear_commands(&self) {
        self.state.borrow_mut().commands.clear();
    }

    /// Names of the lifecycle calls in the order they happened
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.borrow().calls.clone()
    }

    pub fn count_calls(&self, name: &str) -> usize {
        self.state.borrow().calls.iter().filter(|c| **c == name).count()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.borrow().submissions.clone()
    }

    pub fn presentations(&self) -> Vec<Presentation> {
        self.state.borrow().presentations.clone()
    }

    pub fn command_buffer_allocations(&self) -> u32 {
        self.state.borrow().command_buffer_allocations
    }

    pub fn last_render_pass(&self) -> Option<RenderPassSummary> {
        self.state.borrow().last_render_pass
    }

    pub fn last_pipeline(&self) -> Option<PipelineSummary> {
        self.state.borrow().last_pipeline.clone()
    }

    fn call(&self, name: &'static str) {
        self.state.borrow_mut().calls.push(name);
    }

    fn record(&self, cmd: vk::CommandBuffer, what: Recorded) {
        self.state.borrow_mut().commands.push((cmd, what));
    }
}

impl Gpu for MockGpu {
    fn surface_support(&self) -> VkResult<SurfaceSupport> {
        let mut s = self.state.borrow_mut();
        if let Some((width, height)) = s.surface_extents.pop_front() {
            s.support.capabilities.current_extent = vk::Extent2D { width, height };
        }
        Ok(s.support.clone())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        self.call("create_swapchain");
        let mut s = self.state.borrow_mut();
        let handle: vk::SwapchainKHR = Self::next(&mut s);
        s.swapchains.insert(handle.as_raw(), desc.min_image_count);
        s.swapchain_log.push(SwapchainCreation {
            handle,
            extent: (desc.extent.width, desc.extent.height),
            min_image_count: desc.min_image_count,
            format: desc.format.format,
            present_mode: desc.present_mode,
            old_swapchain: desc.old_swapchain,
        });
        Ok(handle)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let mut s = self.state.borrow_mut();
        let count = *s
            .swapchains
            .get(&swapchain.as_raw())
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)?;
        Ok((0..count).map(|_| Self::next(&mut s)).collect())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.call("destroy_swapchain");
        self.state.borrow_mut().swapchains.remove(&swapchain.as_raw());
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        self.call("acquire");
        let mut s = self.state.borrow_mut();
        if let Some(scripted) = s.acquire_script.pop_front() {
            return scripted;
        }
        let count = *s
            .swapchains
            .get(&swapchain.as_raw())
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)?;
        let counter = s.acquire_counter.entry(swapchain.as_raw()).or_insert(0);
        let index = *counter % count;
        *counter += 1;
        Ok((index, false))
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        self.call("present");
        let mut s = self.state.borrow_mut();
        s.presentations.push(Presentation {
            swapchain,
            image_index,
            wait,
        });
        s.present_script.pop_front().unwrap_or(Ok(false))
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        let mut s = self.state.borrow_mut();
        let view: vk::ImageView = Self::next(&mut s);
        s.image_views.insert(view.as_raw());
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.borrow_mut().image_views.remove(&view.as_raw());
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        let summary = unsafe {
            let attachment = &*info.p_attachments;
            let dependency = &*info.p_dependencies;
            RenderPassSummary {
                attachment_count: info.attachment_count,
                format: attachment.format,
                load_op: attachment.load_op,
                store_op: attachment.store_op,
                initial_layout: attachment.initial_layout,
                final_layout: attachment.final_layout,
                dependency_src: dependency.src_subpass,
                dependency_dst: dependency.dst_subpass,
                dependency_dst_stage: dependency.dst_stage_mask,
                dependency_dst_access: dependency.dst_access_mask,
            }
        };
        let mut s = self.state.borrow_mut();
        let render_pass: vk::RenderPass = Self::next(&mut s);
        s.render_passes.insert(render_pass.as_raw());
        s.last_render_pass = Some(summary);
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state
            .borrow_mut()
            .render_passes
            .remove(&render_pass.as_raw());
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer> {
        let mut s = self.state.borrow_mut();
        if s.fail_framebuffer_after == Some(s.framebuffers_created) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        s.framebuffers_created += 1;
        let framebuffer: vk::Framebuffer = Self::next(&mut s);
        s.framebuffers
            .insert(framebuffer.as_raw(), info.render_pass.as_raw());
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state
            .borrow_mut()
            .framebuffers
            .remove(&framebuffer.as_raw());
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut s = self.state.borrow_mut();
        let semaphore: vk::Semaphore = Self::next(&mut s);
        s.semaphores.insert(semaphore.as_raw());
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state.borrow_mut().semaphores.remove(&semaphore.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut s = self.state.borrow_mut();
        if s.fail_fence {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        let fence: vk::Fence = Self::next(&mut s);
        s.fences.insert(fence.as_raw(), signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.state.borrow_mut().fences.remove(&fence.as_raw());
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.call("wait_for_fence");
        // Work completes instantly, so an unsignaled fence that was never
        // submitted would deadlock on real hardware.
        match self.state.borrow().fences.get(&fence.as_raw()) {
            Some(true) => Ok(()),
            Some(false) => Err(vk::Result::TIMEOUT),
            None => Err(vk::Result::ERROR_DEVICE_LOST),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.call("reset_fence");
        if let Some(signaled) = self.state.borrow_mut().fences.get_mut(&fence.as_raw()) {
            *signaled = false;
        }
        Ok(())
    }

    fn wait_idle(&self) -> VkResult<()> {
        self.call("wait_idle");
        Ok(())
    }

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut s = self.state.borrow_mut();
        s.command_buffer_allocations += 1;
        let buffers: Vec<vk::CommandBuffer> = (0..count).map(|_| Self::next(&mut s)).collect();
        for cmd in &buffers {
            s.command_buffers.insert(cmd.as_raw());
        }
        Ok(buffers)
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        let mut s = self.state.borrow_mut();
        for cmd in buffers {
            s.command_buffers.remove(&cmd.as_raw());
        }
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(cmd, Recorded::Reset);
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(cmd, Recorded::Begin);
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(cmd, Recorded::End);
        Ok(())
    }

    fn queue_submit(
        &self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()> {
        self.call("submit");
        let mut s = self.state.borrow_mut();
        let fence_was_reset = s.fences.get(&fence.as_raw()) == Some(&false);
        // Completes immediately
        if let Some(signaled) = s.fences.get_mut(&fence.as_raw()) {
            *signaled = true;
        }
        s.submissions.push(Submission {
            command_buffer: cmd,
            wait,
            wait_stage,
            signal,
            fence,
            fence_was_reset,
        });
        Ok(())
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo) {
        let clear = if info.clear_value_count > 0 {
            unsafe { (*info.p_clear_values).color.float32 }
        } else {
            [0.0; 4]
        };
        self.record(
            cmd,
            Recorded::BeginRenderPass {
                render_pass: info.render_pass,
                framebuffer: info.framebuffer,
                extent: (info.render_area.extent.width, info.render_area.extent.height),
                clear,
            },
        );
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.record(cmd, Recorded::EndRenderPass);
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        self.record(
            cmd,
            Recorded::SetViewport {
                width: viewport.width,
                height: viewport.height,
                min_depth: viewport.min_depth,
                max_depth: viewport.max_depth,
            },
        );
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.record(
            cmd,
            Recorded::SetScissor {
                extent: (scissor.extent.width, scissor.extent.height),
            },
        );
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(cmd, Recorded::BindPipeline(pipeline));
    }

    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.record(cmd, Recorded::BindVertexBuffer(buffer));
    }

    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    ) {
        self.record(cmd, Recorded::BindIndexBuffer(buffer, index_type));
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        self.record(cmd, Recorded::BindDescriptorSet(set));
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32) {
        self.record(cmd, Recorded::DrawIndexed(index_count));
    }

    fn create_shader_module(&self, _code: &[u32]) -> VkResult<vk::ShaderModule> {
        let mut s = self.state.borrow_mut();
        if s.reject_shaders {
            return Err(vk::Result::ERROR_INVALID_SHADER_NV);
        }
        let module: vk::ShaderModule = Self::next(&mut s);
        s.shader_modules.insert(module.as_raw());
        Ok(module)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state
            .borrow_mut()
            .shader_modules
            .remove(&module.as_raw());
    }

    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        self.call("create_pipeline");
        let summary = unsafe {
            let input_assembly = &*info.p_input_assembly_state;
            let raster = &*info.p_rasterization_state;
            let depth = &*info.p_depth_stencil_state;
            let blend = &*info.p_color_blend_state;
            let dynamic = &*info.p_dynamic_state;
            let vertex_input = &*info.p_vertex_input_state;
            let dynamic_states = std::slice::from_raw_parts(
                dynamic.p_dynamic_states,
                dynamic.dynamic_state_count as usize,
            )
            .to_vec();
            PipelineSummary {
                stage_count: info.stage_count,
                topology: input_assembly.topology,
                polygon_mode: raster.polygon_mode,
                cull_mode: raster.cull_mode,
                front_face: raster.front_face,
                depth_test: depth.depth_test_enable == vk::TRUE,
                blend_enable: (*blend.p_attachments).blend_enable == vk::TRUE,
                dynamic_states,
                vertex_bindings: vertex_input.vertex_binding_description_count,
                vertex_attributes: vertex_input.vertex_attribute_description_count,
                render_pass: info.render_pass,
                subpass: info.subpass,
                layout: info.layout,
            }
        };

        let mut s = self.state.borrow_mut();
        if let Some(result) = s.fail_pipeline {
            return Err(result);
        }
        let pipeline: vk::Pipeline = Self::next(&mut s);
        s.pipelines.insert(pipeline.as_raw());
        s.last_pipeline = Some(summary);
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.call("destroy_pipeline");
        self.state.borrow_mut().pipelines.remove(&pipeline.as_raw());
    }
}

/// Window double replaying a scripted extent sequence. Each `wait_events`
/// moves to the next extent; once the script runs out the window asks to close.
pub struct MockWindow {
    extent: vk::Extent2D,
    pending: VecDeque<(u32, u32)>,
    resized: bool,
    close_requested: bool,
    pub waits: usize,
    pub keys: HashSet<KeyCode>,
    pub buttons: HashSet<MouseButton>,
    pub mouse_delta: (f64, f64),
}

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            extent: vk::Extent2D { width, height },
            pending: VecDeque::new(),
            resized: false,
            close_requested: false,
            waits: 0,
            keys: HashSet::new(),
            buttons: HashSet::new(),
            mouse_delta: (0.0, 0.0),
        }
    }

    /// Starts at the first extent, later ones are reached through `wait_events`
    pub fn scripted(extents: &[(u32, u32)]) -> Self {
        let mut pending: VecDeque<_> = extents.iter().copied().collect();
        let (width, height) = pending.pop_front().unwrap_or((0, 0));
        let mut window = Self::new(width, height);
        window.pending = pending;
        window
    }

    /// Simulates a user resize
    pub fn resize(&mut self, width: u32, height: u32) {
        self.extent = vk::Extent2D { width, height };
        self.resized = true;
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }
}

impl WindowSurface for MockWindow {
    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn should_close(&self) -> bool {
        self.close_requested
    }

    fn was_resized(&self) -> bool {
        self.resized
    }

    fn reset_resized_flag(&mut self) {
        self.resized = false;
    }

    fn wait_events(&mut self) {
        self.waits += 1;
        match self.pending.pop_front() {
            Some((width, height)) => self.extent = vk::Extent2D { width, height },
            None => self.close_requested = true,
        }
    }
}

impl InputState for MockWindow {
    fn key_held(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    fn mouse_button_held(&self, button: MouseButton) -> bool {
        self.buttons.contains(&button)
    }

    fn take_mouse_delta(&mut self) -> (f64, f64) {
        std::mem::take(&mut self.mouse_delta)
    }
}

/// A pair of minimal SPIR-V files in the temp directory, removed on drop
pub struct TestShaders {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl TestShaders {
    pub fn write() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir();
        let pid = std::process::id();
        let vertex = dir.join(format!("mesh-renderer-{pid}-{id}.vert.spv"));
        let fragment = dir.join(format!("mesh-renderer-{pid}-{id}.frag.spv"));

        // Header only: magic, version 1.0, generator, bound, schema
        let words: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 1, 0];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        std::fs::write(&vertex, &bytes).unwrap();
        std::fs::write(&fragment, &bytes).unwrap();

        Self { vertex, fragment }
    }
}

impl Drop for TestShaders {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.vertex);
        let _ = std::fs::remove_file(&self.fragment);
    }
}
