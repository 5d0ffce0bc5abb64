// Renderer - frame state machine
//
// Idle --start_frame--> FrameOpen --end_frame--> Idle
//
// start_frame acquires an image and opens the slot's command buffer, the
// caller records between begin_render_pass/end_render_pass, and end_frame
// submits + presents. Out-of-date surfaces and window resizes lead to a full
// swapchain rebuild, which also re-derives the command buffers and pipeline.

use ash::vk;
use std::sync::Arc;

use super::error::{RenderError, RenderResult, VkResultExt};
use super::gpu::Gpu;
use super::pipeline::{Pipeline, PipelineBuilder};
use super::swapchain::{choose_extent, Acquire, Swapchain, SwapchainConfig};
use crate::window::WindowSurface;

#[derive(Debug, Clone, Copy)]
pub struct RendererConfig {
    pub swapchain: SwapchainConfig,
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            swapchain: SwapchainConfig::default(),
            clear_color: [0.01, 0.01, 0.01, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Idle,
    FrameOpen {
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        /// Acquire reported suboptimal; rebuild once this frame is presented
        suboptimal: bool,
    },
}

fn is_degenerate(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

pub struct Renderer<D: Gpu> {
    // Dropped before the swapchain whose render pass it was built against
    pipeline: Option<Pipeline<D>>,
    swapchain: Option<Swapchain<D>>,
    command_buffers: Vec<vk::CommandBuffer>,
    pipeline_builder: PipelineBuilder,
    config: RendererConfig,
    state: FrameState,
    generation: u64,
    device: Arc<D>,
}

impl<D: Gpu> Renderer<D> {
    /// Builds the first swapchain, command buffers and pipeline.
    ///
    /// If the window is closed while still minimized no swapchain exists
    /// afterwards and `start_frame` keeps returning `None`.
    pub fn new<W: WindowSurface + ?Sized>(
        device: Arc<D>,
        window: &mut W,
        config: RendererConfig,
        pipeline_builder: PipelineBuilder,
    ) -> RenderResult<Self> {
        let mut renderer = Self {
            pipeline: None,
            swapchain: None,
            command_buffers: Vec::new(),
            pipeline_builder,
            config,
            state: FrameState::Idle,
            generation: 0,
            device,
        };
        renderer.recreate_swapchain(window)?;
        Ok(renderer)
    }

    /// Wait idle, wait out a minimized window, then rebuild everything that
    /// depends on the surface.
    fn recreate_swapchain<W: WindowSurface + ?Sized>(&mut self, window: &mut W) -> RenderResult<()> {
        self.device.wait_idle().or_device("vkDeviceWaitIdle")?;

        let extent = loop {
            let extent = window.extent();
            if !is_degenerate(extent) && !self.surface_is_degenerate(extent)? {
                break extent;
            }
            if window.should_close() {
                log::debug!("Window closed while minimized, skipping swapchain rebuild");
                return Ok(());
            }
            window.wait_events();
        };

        // The old pipeline belongs to the old render pass
        self.pipeline = None;

        let previous = self.swapchain.take();
        let chain = Swapchain::new(
            Arc::clone(&self.device),
            &self.config.swapchain,
            extent,
            previous,
        )?;

        let target = chain.image_count().max(chain.frames_in_flight());
        if self.command_buffers.len() != target {
            self.free_command_buffers();
            self.command_buffers = self
                .device
                .allocate_command_buffers(target as u32)
                .or_device("vkAllocateCommandBuffers")?;
            log::debug!("Allocated {} command buffers", target);
        }

        let render_pass = chain.render_pass();
        self.swapchain = Some(chain);
        self.pipeline = Some(self.pipeline_builder.build(&self.device, render_pass, 0)?);
        self.generation += 1;

        log::info!(
            "Swapchain generation {} at {}x{}",
            self.generation,
            extent.width,
            extent.height
        );
        Ok(())
    }

    /// The surface can report 0x0 (minimized) before the window has seen the
    /// matching resize event
    fn surface_is_degenerate(&self, requested: vk::Extent2D) -> RenderResult<bool> {
        let support = self
            .device
            .surface_support()
            .or_device("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        Ok(is_degenerate(choose_extent(&support.capabilities, requested)))
    }

    fn free_command_buffers(&mut self) {
        if !self.command_buffers.is_empty() {
            self.device.free_command_buffers(&self.command_buffers);
            self.command_buffers.clear();
        }
    }

    fn open_frame(&self, operation: &'static str) -> RenderResult<(vk::CommandBuffer, u32)> {
        match self.state {
            FrameState::FrameOpen {
                command_buffer,
                image_index,
                ..
            } => Ok((command_buffer, image_index)),
            FrameState::Idle => Err(RenderError::ProtocolViolation(operation)),
        }
    }

    fn check_command_buffer(&self, cb: vk::CommandBuffer, operation: &'static str) -> RenderResult<u32> {
        let (open, image_index) = self.open_frame(operation)?;
        if cb != open {
            return Err(RenderError::ProtocolViolation(
                "command buffer does not belong to the open frame",
            ));
        }
        Ok(image_index)
    }

    /// Acquire an image and open the current slot's command buffer.
    /// Returns `None` when the surface was stale and has been rebuilt; nothing
    /// should be recorded for that tick.
    pub fn start_frame<W: WindowSurface + ?Sized>(
        &mut self,
        window: &mut W,
    ) -> RenderResult<Option<vk::CommandBuffer>> {
        if self.is_frame_in_progress() {
            return Err(RenderError::ProtocolViolation(
                "start_frame called while a frame is in progress",
            ));
        }

        let Some(chain) = &self.swapchain else {
            self.recreate_swapchain(window)?;
            return Ok(None);
        };

        let (image_index, suboptimal) = match chain.acquire_next_image()? {
            Acquire::Ready(index) => (index, false),
            Acquire::Suboptimal(index) => (index, true),
            Acquire::Stale => {
                log::debug!("Swapchain out of date on acquire");
                self.recreate_swapchain(window)?;
                return Ok(None);
            }
        };

        let command_buffer = self.command_buffers[chain.current_frame()];
        self.device
            .reset_command_buffer(command_buffer)
            .or_device("vkResetCommandBuffer")?;
        self.device
            .begin_command_buffer(command_buffer)
            .or_device("vkBeginCommandBuffer")?;

        self.state = FrameState::FrameOpen {
            command_buffer,
            image_index,
            suboptimal,
        };
        Ok(Some(command_buffer))
    }

    pub fn begin_render_pass(&self, cb: vk::CommandBuffer) -> RenderResult<()> {
        let image_index = self.check_command_buffer(cb, "begin_render_pass called outside a frame")?;
        let chain = self
            .swapchain
            .as_ref()
            .ok_or(RenderError::ProtocolViolation("no swapchain"))?;
        let framebuffer = chain
            .framebuffer(image_index)
            .ok_or(RenderError::ProtocolViolation("acquired image index out of range"))?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.config.clear_color,
            },
        }];
        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(chain.render_pass())
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: chain.extent(),
            })
            .clear_values(&clear_values);

        self.device.cmd_begin_render_pass(cb, &render_pass_info);
        Ok(())
    }

    pub fn end_render_pass(&self, cb: vk::CommandBuffer) -> RenderResult<()> {
        self.check_command_buffer(cb, "end_render_pass called outside a frame")?;
        self.device.cmd_end_render_pass(cb);
        Ok(())
    }

    /// Finish recording, submit and present. Rebuilds the swapchain when
    /// acquire or present reported the surface stale or suboptimal, or the
    /// window was resized.
    pub fn end_frame<W: WindowSurface + ?Sized>(&mut self, window: &mut W) -> RenderResult<()> {
        let (command_buffer, image_index) = self.open_frame("end_frame called outside a frame")?;
        let acquired_suboptimal = matches!(
            self.state,
            FrameState::FrameOpen {
                suboptimal: true,
                ..
            }
        );
        self.state = FrameState::Idle;

        self.device
            .end_command_buffer(command_buffer)
            .or_device("vkEndCommandBuffer")?;

        let chain = self
            .swapchain
            .as_mut()
            .ok_or(RenderError::ProtocolViolation("no swapchain"))?;
        let status = chain.submit(command_buffer, image_index)?;

        if status.needs_rebuild() || acquired_suboptimal || window.was_resized() {
            log::debug!(
                "Rebuilding swapchain after present ({:?}, acquire suboptimal: {})",
                status,
                acquired_suboptimal
            );
            window.reset_resized_flag();
            self.recreate_swapchain(window)?;
        }
        Ok(())
    }

    /// Rebuild the pipeline from the stored builder, e.g. after a shader
    /// change. On failure the current pipeline stays in place.
    pub fn rebuild_pipeline(&mut self) -> RenderResult<()> {
        if self.is_frame_in_progress() {
            return Err(RenderError::ProtocolViolation(
                "rebuild_pipeline called while a frame is in progress",
            ));
        }
        let Some(chain) = &self.swapchain else {
            return Ok(());
        };

        self.device.wait_idle().or_device("vkDeviceWaitIdle")?;
        let pipeline = self
            .pipeline_builder
            .build(&self.device, chain.render_pass(), 0)?;
        self.pipeline = Some(pipeline);
        log::info!("Graphics pipeline rebuilt");
        Ok(())
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain
            .as_ref()
            .map_or(vk::Extent2D::default(), |chain| chain.extent())
    }

    /// Frame slot used by the frame being prepared
    pub fn frame_index(&self) -> usize {
        self.swapchain.as_ref().map_or(0, |chain| chain.current_frame())
    }

    pub fn image_index(&self) -> Option<u32> {
        match self.state {
            FrameState::FrameOpen { image_index, .. } => Some(image_index),
            FrameState::Idle => None,
        }
    }

    pub fn pipeline(&self) -> Option<&Pipeline<D>> {
        self.pipeline.as_ref()
    }

    /// Number of swapchains built so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn command_buffer_count(&self) -> usize {
        self.command_buffers.len()
    }

    pub fn is_frame_in_progress(&self) -> bool {
        matches!(self.state, FrameState::FrameOpen { .. })
    }

    pub fn swapchain(&self) -> Option<&Swapchain<D>> {
        self.swapchain.as_ref()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.config.swapchain.frames_in_flight.max(1)
    }
}

impl<D: Gpu> Drop for Renderer<D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device wait failed during renderer teardown: {:?}", e);
        }
        self.free_command_buffers();
        log::debug!("Renderer destroyed");
    }
}
