// Render error taxonomy
//
// Expected surface conditions (out of date, suboptimal) are NOT errors; they
// travel as statuses (see swapchain::Acquire / swapchain::SurfaceStatus).
// Everything here is fatal for the frame loop.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// A create/allocate call failed
    #[error("{what} failed: {result:?}")]
    Device {
        what: &'static str,
        result: vk::Result,
    },

    /// Acquire, submit or present failed for a reason other than staleness
    #[error("{what} failed: {result:?}")]
    Presentation {
        what: &'static str,
        result: vk::Result,
    },

    #[error("no suitable surface configuration: {0}")]
    NoSuitableSurfaceConfig(&'static str),

    #[error("shader {path:?}: {reason}")]
    ShaderCompile { path: PathBuf, reason: String },

    #[error("graphics pipeline creation failed: {0:?}")]
    PipelineCreate(vk::Result),

    /// Frame state machine misuse (programmer error)
    #[error("frame protocol violated: {0}")]
    ProtocolViolation(&'static str),
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Tags a raw `VkResult` with the error kind the call site belongs to.
pub trait VkResultExt<T> {
    fn or_device(self, what: &'static str) -> RenderResult<T>;
    fn or_presentation(self, what: &'static str) -> RenderResult<T>;
}

impl<T> VkResultExt<T> for ash::prelude::VkResult<T> {
    fn or_device(self, what: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::Device { what, result })
    }

    fn or_presentation(self, what: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::Presentation { what, result })
    }
}
