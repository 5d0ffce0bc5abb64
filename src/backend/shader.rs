// Shader module loading
//
// Vulkan consumes SPIR-V words. Files are compiled ahead of time (see build.rs)
// and handed to the driver unchanged; the only checks done here are the word
// alignment and the SPIR-V magic number.

use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::error::{RenderError, RenderResult};
use super::gpu::Gpu;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Read a SPIR-V binary from disk as 32-bit words
pub fn read_spirv(path: &Path) -> RenderResult<Vec<u32>> {
    let shader_error = |reason: String| RenderError::ShaderCompile {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = std::fs::read(path).map_err(|e| shader_error(format!("cannot read file: {e}")))?;

    // read_spv copies into aligned storage and fixes endianness
    let words = ash::util::read_spv(&mut Cursor::new(&bytes))
        .map_err(|e| shader_error(format!("malformed SPIR-V: {e}")))?;

    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(shader_error("missing SPIR-V magic number".into()));
    }

    Ok(words)
}

/// Load SPIR-V from `path` and create a shader module
pub fn create_shader_module<D: Gpu + ?Sized>(
    device: &D,
    path: &Path,
) -> RenderResult<vk::ShaderModule> {
    let code = read_spirv(path)?;
    device
        .create_shader_module(&code)
        .map_err(|result| RenderError::ShaderCompile {
            path: path.to_path_buf(),
            reason: format!("driver rejected module: {result:?}"),
        })
}
