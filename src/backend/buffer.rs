// GPU buffers
//
// Buffers are sub-allocated from the device's gpu-allocator instance.
// Host-visible memory is used so data can be written straight in without a
// staging copy.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use super::VulkanDevice;

/// A buffer plus the memory backing it. Must be released with `destroy`.
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    allocation: Option<Allocation>,
}

impl Buffer {
    /// Create a host-visible buffer and fill it with `data`.
    pub fn with_data<T: bytemuck::Pod>(
        device: &VulkanDevice,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.is_empty() {
            anyhow::bail!("Refusing to create empty buffer '{}'", name);
        }
        let size = bytes.len() as vk::DeviceSize;

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .context("Failed to create buffer")?;

        let mut this = Self {
            buffer,
            size,
            allocation: None,
        };

        if let Err(e) = this.allocate_and_fill(device, name, bytes) {
            this.destroy(device);
            return Err(e);
        }

        log::debug!("Created buffer '{}' ({} bytes)", name, size);
        Ok(this)
    }

    fn allocate_and_fill(&mut self, device: &VulkanDevice, name: &str, bytes: &[u8]) -> Result<()> {
        let requirements = unsafe { device.device.get_buffer_memory_requirements(self.buffer) };

        let allocation = device.allocator()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::CpuToGpu,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .with_context(|| format!("Failed to allocate memory for buffer '{}'", name))?;

        let allocation = self.allocation.insert(allocation);

        unsafe {
            device
                .device
                .bind_buffer_memory(self.buffer, allocation.memory(), allocation.offset())
                .context("Failed to bind buffer memory")?;
        }

        let mapped = allocation
            .mapped_slice_mut()
            .context("Buffer memory is not host visible")?;
        mapped[..bytes.len()].copy_from_slice(bytes);

        Ok(())
    }

    /// Destroy the buffer and return its memory. Safe to call twice.
    pub fn destroy(&mut self, device: &VulkanDevice) {
        if self.buffer != vk::Buffer::null() {
            unsafe { device.device.destroy_buffer(self.buffer, None) };
            self.buffer = vk::Buffer::null();
        }

        if let Some(allocation) = self.allocation.take() {
            // Without an allocator the memory has already been released
            if let Ok(mut allocator) = device.allocator() {
                if let Err(e) = allocator.free(allocation) {
                    log::warn!("Failed to free buffer memory: {}", e);
                }
            }
        }
    }
}
