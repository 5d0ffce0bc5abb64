// Sampled 2D texture
//
// Pixels are decoded to RGBA8 on the CPU, copied through a staging buffer
// into a device-local image, then left in SHADER_READ_ONLY_OPTIMAL.

use anyhow::{bail, Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::path::Path;
use std::sync::Arc;

use crate::backend::buffer;
use crate::backend::VulkanDevice;

const FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Decoded RGBA8 pixels
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaPixels {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbaPixels {
    pub fn load(path: &Path) -> Result<Self> {
        let decoded = image::open(path)
            .with_context(|| format!("Failed to load texture {:?}", path))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        Ok(Self {
            width,
            height,
            data: decoded.into_raw(),
        })
    }

    /// 1x1 opaque white; sampling it leaves vertex colors unchanged
    pub fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            data: vec![255; 4],
        }
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("Texture has zero size ({}x{})", self.width, self.height);
        }
        let expected = self.width as usize * self.height as usize * 4;
        if self.data.len() != expected {
            bail!(
                "Texture data is {} bytes, expected {} for {}x{} RGBA8",
                self.data.len(),
                expected,
                self.width,
                self.height
            );
        }
        Ok(())
    }
}

/// Access masks and stages for the two transitions a texture upload needs
fn transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Option<(vk::AccessFlags, vk::AccessFlags, vk::PipelineStageFlags, vk::PipelineStageFlags)> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Some((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Some((
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ))
        }
        _ => None,
    }
}

fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn record_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Result<()> {
    let (src_access, dst_access, src_stage, dst_stage) = transition_masks(old, new)
        .with_context(|| format!("Unsupported layout transition {:?} -> {:?}", old, new))?;

    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_range())
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier.build()],
        );
    }
    Ok(())
}

pub struct Texture {
    device: Arc<VulkanDevice>,
    image: vk::Image,
    allocation: Option<Allocation>,
    view: vk::ImageView,
    sampler: vk::Sampler,
    width: u32,
    height: u32,
}

impl Texture {
    /// Loads `path` when given, otherwise the white fallback.
    /// A texture that fails to load is logged and replaced by the fallback.
    pub fn from_optional_path(device: Arc<VulkanDevice>, path: Option<&Path>) -> Result<Self> {
        let pixels = match path {
            Some(path) => match RgbaPixels::load(path) {
                Ok(pixels) => {
                    log::info!("Loaded texture {:?} ({}x{})", path, pixels.width, pixels.height);
                    pixels
                }
                Err(e) => {
                    log::warn!("{:#}. Rendering untextured.", e);
                    RgbaPixels::white()
                }
            },
            None => RgbaPixels::white(),
        };
        Self::from_pixels(device, &pixels)
    }

    pub fn from_pixels(device: Arc<VulkanDevice>, pixels: &RgbaPixels) -> Result<Self> {
        pixels.validate()?;

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(FORMAT)
            .extent(vk::Extent3D {
                width: pixels.width,
                height: pixels.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.device.create_image(&image_info, None) }
            .context("Failed to create texture image")?;

        // From here on Drop cleans up whatever has been created
        let mut texture = Self {
            device: Arc::clone(&device),
            image,
            allocation: None,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            width: pixels.width,
            height: pixels.height,
        };

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };
        let allocation = device
            .allocator()
            .allocate(&AllocationCreateDesc {
                name: "texture",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .context("Failed to allocate texture memory")?;

        let bound = unsafe {
            device
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        texture.allocation = Some(allocation);
        bound.context("Failed to bind texture memory")?;

        texture.upload(&pixels.data)?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(FORMAT)
            .subresource_range(color_range());
        texture.view = unsafe { device.device.create_image_view(&view_info, None) }
            .context("Failed to create texture view")?;

        texture.sampler = Self::create_sampler(&device)?;

        log::debug!("Created {}x{} texture", pixels.width, pixels.height);
        Ok(texture)
    }

    fn upload(&self, data: &[u8]) -> Result<()> {
        let (staging, staging_memory) =
            buffer::create_buffer_with_data(&self.device, vk::BufferUsageFlags::TRANSFER_SRC, data)?;

        let image = self.image;
        let extent = vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: 1,
        };

        let mut recorded = Ok(());
        let submitted = self.device.one_time_submit(|device, cmd| {
            recorded = (|| -> Result<()> {
                record_transition(
                    device,
                    cmd,
                    image,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                )?;

                let region = vk::BufferImageCopy {
                    buffer_offset: 0,
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    },
                    image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                    image_extent: extent,
                };
                unsafe {
                    device.cmd_copy_buffer_to_image(
                        cmd,
                        staging,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }

                record_transition(
                    device,
                    cmd,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                )
            })();
        });

        buffer::destroy_buffer(&self.device, staging, staging_memory);
        submitted?;
        recorded
    }

    fn create_sampler(device: &VulkanDevice) -> Result<vk::Sampler> {
        let max_anisotropy = if device.anisotropy_enabled {
            device.properties.limits.max_sampler_anisotropy
        } else {
            1.0
        };

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(device.anisotropy_enabled)
            .max_anisotropy(max_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .min_lod(0.0)
            .max_lod(0.0);

        unsafe { device.device.create_sampler(&sampler_info, None) }
            .context("Failed to create texture sampler")
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            if self.sampler != vk::Sampler::null() {
                self.device.device.destroy_sampler(self.sampler, None);
            }
            if self.view != vk::ImageView::null() {
                self.device.device.destroy_image_view(self.view, None);
            }
            self.device.device.destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator().free(allocation) {
                log::error!("Failed to free texture allocation: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_fallback_is_one_opaque_pixel() {
        let white = RgbaPixels::white();
        assert_eq!((white.width, white.height), (1, 1));
        assert_eq!(white.data, vec![255, 255, 255, 255]);
        assert!(white.validate().is_ok());
    }

    #[test]
    fn validate_rejects_mismatched_sizes() {
        let empty = RgbaPixels {
            width: 0,
            height: 4,
            data: Vec::new(),
        };
        assert!(empty.validate().is_err());

        let short = RgbaPixels {
            width: 2,
            height: 2,
            data: vec![0; 15],
        };
        let err = short.validate().unwrap_err().to_string();
        assert!(err.contains("expected 16"));
    }

    #[test]
    fn loads_png_as_rgba8() {
        let path = std::env::temp_dir().join(format!("mesh_renderer_tex_{}.png", std::process::id()));
        let mut img = image::RgbImage::new(3, 2);
        img.put_pixel(2, 1, image::Rgb([10, 20, 30]));
        img.save(&path).unwrap();

        let pixels = RgbaPixels::load(&path);
        std::fs::remove_file(&path).unwrap();
        let pixels = pixels.unwrap();

        assert_eq!((pixels.width, pixels.height), (3, 2));
        assert_eq!(pixels.data.len(), 3 * 2 * 4);
        // Last pixel, alpha filled in
        assert_eq!(&pixels.data[20..24], &[10, 20, 30, 255]);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = RgbaPixels::load(Path::new("does/not/exist.png"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("exist.png"));
    }

    #[test]
    fn upload_transitions_are_known() {
        let (src, dst, src_stage, dst_stage) = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert!(src.is_empty());
        assert_eq!(dst, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);

        let (_, dst, _, dst_stage) = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(dst, vk::AccessFlags::SHADER_READ);
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

        assert!(transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::UNDEFINED
        )
        .is_none());
    }
}
