// Synchronization primitives
//
// One FrameSync per frame in flight. The fence starts signaled so the first
// wait on a fresh slot returns immediately.

use ash::vk;
use super::error::{RenderResult, VkResultExt};
use super::gpu::Gpu;

/// Frame synchronization - one per frame in flight
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    /// Creates the three primitives. On failure whatever was already created
    /// is destroyed before returning.
    pub fn new<D: Gpu + ?Sized>(device: &D) -> RenderResult<Self> {
        let mut sync = Self::default();
        let result = (|| -> RenderResult<()> {
            sync.image_available = device.create_semaphore().or_device("vkCreateSemaphore")?;
            sync.render_finished = device.create_semaphore().or_device("vkCreateSemaphore")?;
            sync.in_flight_fence = device.create_fence(true).or_device("vkCreateFence")?;
            Ok(())
        })();

        match result {
            Ok(()) => Ok(sync),
            Err(e) => {
                sync.destroy(device);
                Err(e)
            }
        }
    }

    /// Null handles are skipped
    pub fn destroy<D: Gpu + ?Sized>(&self, device: &D) {
        if self.image_available != vk::Semaphore::null() {
            device.destroy_semaphore(self.image_available);
        }
        if self.render_finished != vk::Semaphore::null() {
            device.destroy_semaphore(self.render_finished);
        }
        if self.in_flight_fence != vk::Fence::null() {
            device.destroy_fence(self.in_flight_fence);
        }
    }
}
