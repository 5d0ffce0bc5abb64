// Swapchain - Window presentation
//
// Owns everything whose lifetime is tied to one presentable surface
// configuration: images, views, the render pass, one framebuffer per image,
// and one FrameSync per frame in flight.
//
// A new chain is built from its predecessor (passed as oldSwapchain), and the
// predecessor is only dropped once the replacement is complete.

use ash::vk;
use std::sync::Arc;

use super::error::{RenderError, RenderResult, VkResultExt};
use super::gpu::{Gpu, SwapchainDesc};
use super::sync::FrameSync;

/// Immutable per-chain settings, built from `Config`
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    pub frames_in_flight: usize,
    pub present_mode: vk::PresentModeKHR,
    pub surface_format: vk::SurfaceFormatKHR,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            present_mode: vk::PresentModeKHR::MAILBOX,
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        }
    }
}

/// Outcome of acquiring an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Ready(u32),
    /// Usable for this frame, but the chain should be rebuilt afterwards
    Suboptimal(u32),
    /// Out of date; no image was acquired
    Stale,
}

/// Outcome of submit + present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    Optimal,
    Suboptimal,
    Stale,
}

impl SurfaceStatus {
    pub fn needs_rebuild(self) -> bool {
        self != SurfaceStatus::Optimal
    }
}

pub struct Swapchain<D: Gpu> {
    device: Arc<D>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    frames: Vec<FrameSync>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    current_frame: usize,
}

impl<D: Gpu> Swapchain<D> {
    pub fn new(
        device: Arc<D>,
        config: &SwapchainConfig,
        requested: vk::Extent2D,
        previous: Option<Swapchain<D>>,
    ) -> RenderResult<Self> {
        let support = device
            .surface_support()
            .or_device("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;

        let format = choose_surface_format(&support.formats, config.surface_format)
            .ok_or(RenderError::NoSuitableSurfaceConfig("surface reports no formats"))?;
        let present_mode = choose_present_mode(&support.present_modes, config.present_mode)
            .ok_or(RenderError::NoSuitableSurfaceConfig("surface reports no present modes"))?;
        let extent = choose_extent(&support.capabilities, requested);
        if extent.width == 0 || extent.height == 0 {
            return Err(RenderError::NoSuitableSurfaceConfig("surface extent is zero"));
        }
        let image_count = choose_image_count(&support.capabilities);

        let old_swapchain = previous
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |p| p.swapchain);

        // Filled in step by step; Drop skips whatever is still null
        let mut chain = Self {
            device: Arc::clone(&device),
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            frames: Vec::new(),
            format,
            present_mode,
            extent,
            current_frame: 0,
        };

        chain.swapchain = device
            .create_swapchain(&SwapchainDesc {
                min_image_count: image_count,
                format,
                extent,
                present_mode,
                pre_transform: support.capabilities.current_transform,
                old_swapchain,
            })
            .or_device("vkCreateSwapchainKHR")?;
        chain.images = device
            .swapchain_images(chain.swapchain)
            .or_device("vkGetSwapchainImagesKHR")?;

        chain.create_image_views()?;
        chain.render_pass = create_render_pass(&*device, format.format)?;
        chain.create_framebuffers()?;

        for _ in 0..config.frames_in_flight.max(1) {
            chain.frames.push(FrameSync::new(&*device)?);
        }

        // The replacement is complete, retire the predecessor
        drop(previous);

        log::info!(
            "Swapchain ready: {}x{} {:?} {:?}, {} images, {} frames in flight",
            extent.width,
            extent.height,
            format.format,
            present_mode,
            chain.images.len(),
            chain.frames.len()
        );

        Ok(chain)
    }

    fn create_image_views(&mut self) -> RenderResult<()> {
        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = self
                .device
                .create_image_view(&create_info)
                .or_device("vkCreateImageView")?;
            self.image_views.push(view);
        }
        Ok(())
    }

    fn create_framebuffers(&mut self) -> RenderResult<()> {
        for &view in &self.image_views {
            let attachments = [view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            let framebuffer = self
                .device
                .create_framebuffer(&framebuffer_info)
                .or_device("vkCreateFramebuffer")?;
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    /// Waits for the current slot's previous work, then acquires an image.
    pub fn acquire_next_image(&self) -> RenderResult<Acquire> {
        let sync = &self.frames[self.current_frame];

        self.device
            .wait_for_fence(sync.in_flight_fence)
            .or_presentation("vkWaitForFences")?;
        self.device
            .reset_fence(sync.in_flight_fence)
            .or_presentation("vkResetFences")?;

        match self
            .device
            .acquire_next_image(self.swapchain, sync.image_available)
        {
            Ok((index, false)) => Ok(Acquire::Ready(index)),
            Ok((index, true)) => Ok(Acquire::Suboptimal(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::Stale),
            Err(result) => Err(RenderError::Presentation {
                what: "vkAcquireNextImageKHR",
                result,
            }),
        }
    }

    /// Submits the recorded frame and presents `image_index`.
    /// The frame slot advances whatever present reports.
    pub fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RenderResult<SurfaceStatus> {
        let sync = self.frames[self.current_frame];

        let submitted = self.device.queue_submit(
            command_buffer,
            sync.image_available,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            sync.render_finished,
            sync.in_flight_fence,
        );
        self.current_frame = (self.current_frame + 1) % self.frames.len();
        submitted.or_presentation("vkQueueSubmit")?;

        match self
            .device
            .queue_present(self.swapchain, image_index, sync.render_finished)
        {
            Ok(false) => Ok(SurfaceStatus::Optimal),
            Ok(true) => Ok(SurfaceStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::Stale),
            Err(result) => Err(RenderError::Presentation {
                what: "vkQueuePresentKHR",
                result,
            }),
        }
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn image_view_count(&self) -> usize {
        self.image_views.len()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }
}

impl<D: Gpu> Drop for Swapchain<D> {
    fn drop(&mut self) {
        for sync in &self.frames {
            sync.destroy(&*self.device);
        }
        for &framebuffer in &self.framebuffers {
            self.device.destroy_framebuffer(framebuffer);
        }
        if self.render_pass != vk::RenderPass::null() {
            self.device.destroy_render_pass(self.render_pass);
        }
        for &view in &self.image_views {
            self.device.destroy_image_view(view);
        }
        if self.swapchain != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(self.swapchain);
        }
        log::debug!("Swapchain destroyed");
    }
}

/// Preferred format/color-space pair if offered, else the first reported one
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
        .or_else(|| formats.first())
        .copied()
}

/// Preferred mode if offered, else FIFO (always supported)
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> Option<vk::PresentModeKHR> {
    if modes.is_empty() {
        return None;
    }
    Some(
        modes
            .iter()
            .copied()
            .find(|&mode| mode == preferred)
            .unwrap_or(vk::PresentModeKHR::FIFO),
    )
}

/// `current_extent` unless the surface leaves the choice to us (width == u32::MAX)
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: requested
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: requested
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum when there is one
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// Single color attachment, cleared on load and handed to the presentation engine
pub fn create_render_pass<D: Gpu + ?Sized>(
    device: &D,
    format: vk::Format,
) -> RenderResult<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = [color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachments)
        .build();

    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build();

    let attachments = [color_attachment];
    let subpasses = [subpass];
    let dependencies = [dependency];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    device
        .create_render_pass(&render_pass_info)
        .or_device("vkCreateRenderPass")
}
