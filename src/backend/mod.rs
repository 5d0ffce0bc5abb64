// Backend module - Vulkan abstraction layer
//
// The frame lifecycle (swapchain, sync, pipeline, renderer) talks to the GPU
// only through the `Gpu` trait; `VulkanDevice` is the real implementation.

pub mod buffer;
pub mod device;
pub mod draw;
pub mod error;
pub mod gpu;
pub mod pipeline;
pub mod renderer;
pub mod shader;
pub mod swapchain;
pub mod sync;

#[cfg(test)]
pub mod testing;

pub use device::{DeviceConfig, VulkanDevice};
pub use draw::{record_draw, DrawCall};
pub use error::{RenderError, RenderResult};
pub use gpu::Gpu;
pub use pipeline::{FixedFunctionConfig, Pipeline, PipelineBuilder, VertexLayout};
pub use renderer::{Renderer, RendererConfig};
pub use swapchain::{Swapchain, SwapchainConfig};
