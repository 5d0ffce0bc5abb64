// Buffer utilities for vertex, index, and uniform buffers
//
// Provides helpers for creating GPU-accessible memory buffers

use anyhow::{Context, Result};
use ash::vk;
use super::VulkanDevice;

/// Helper to create a GPU buffer with specified usage and memory properties
pub fn create_buffer(
    device: &VulkanDevice,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
        .context("Failed to create buffer")?;

    let mem_requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

    let allocated = (|| -> Result<vk::DeviceMemory> {
        let memory_type_index = find_memory_type(
            &device.memory_properties,
            mem_requirements.memory_type_bits,
            memory_properties,
        )
        .with_context(|| format!("No memory type with {:?}", memory_properties))?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { device.device.allocate_memory(&alloc_info, None) }
            .context("Failed to allocate buffer memory")?;

        if let Err(e) = unsafe { device.device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe { device.device.free_memory(memory, None) };
            return Err(e).context("Failed to bind buffer memory");
        }
        Ok(memory)
    })();

    match allocated {
        Ok(memory) => Ok((buffer, memory)),
        Err(e) => {
            unsafe { device.device.destroy_buffer(buffer, None) };
            Err(e)
        }
    }
}

/// Create a host-visible buffer and fill it with data
pub fn create_buffer_with_data<T: Copy>(
    device: &VulkanDevice,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let size = std::mem::size_of_val(data) as vk::DeviceSize;

    let (buffer, memory) = device.create_buffer(
        size,
        usage,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    unsafe {
        let ptr = match device
            .device
            .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())
        {
            Ok(ptr) => ptr as *mut T,
            Err(e) => {
                destroy_buffer(device, buffer, memory);
                return Err(e).context("Failed to map buffer memory");
            }
        };

        ptr.copy_from_nonoverlapping(data.as_ptr(), data.len());
        device.device.unmap_memory(memory);
    }

    Ok((buffer, memory))
}

/// Upload through a staging buffer into device-local memory
pub fn create_device_local_buffer<T: Copy>(
    device: &VulkanDevice,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let size = std::mem::size_of_val(data) as vk::DeviceSize;

    let (staging, staging_memory) =
        create_buffer_with_data(device, vk::BufferUsageFlags::TRANSFER_SRC, data)?;

    let result = (|| -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let (buffer, memory) = device.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let copied = device.one_time_submit(|d, cmd| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe { d.cmd_copy_buffer(cmd, staging, buffer, &[region]) };
        });

        match copied {
            Ok(()) => Ok((buffer, memory)),
            Err(e) => {
                destroy_buffer(device, buffer, memory);
                Err(e)
            }
        }
    })();

    destroy_buffer(device, staging, staging_memory);
    result
}

pub fn destroy_buffer(device: &VulkanDevice, buffer: vk::Buffer, memory: vk::DeviceMemory) {
    unsafe {
        device.device.destroy_buffer(buffer, None);
        device.device.free_memory(memory, None);
    }
}

/// Find a suitable memory type index
pub fn find_memory_type(
    mem_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..mem_properties.memory_type_count).find(|&i| {
        let has_type = (type_filter & (1 << i)) != 0;
        let has_properties = mem_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);
        has_type && has_properties
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, flags) in types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags: *flags,
                heap_index: 0,
            };
        }
        props
    }

    #[test]
    fn finds_first_type_with_all_properties() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(&props, 0b111, wanted), Some(2));
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
    }

    #[test]
    fn respects_the_type_filter() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        assert_eq!(
            find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(1)
        );
        assert_eq!(
            find_memory_type(&props, 0, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            None
        );
    }

    #[test]
    fn missing_properties_find_nothing() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(
            find_memory_type(&props, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
    }
}
