//! Host-visible transfer buffers.
//!
//! The renderer never streams vertex data; buffers exist to move pixels
//! between host and device:
//!
//! - [`BufferUsage::Upload`]: host writes, GPU copies into an image
//! - [`BufferUsage::Readback`]: GPU copies out of an image, host reads
//!
//! Memory comes from gpu-allocator and stays persistently mapped.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Direction of a transfer buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Upload,
    Readback,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Upload => vk::BufferUsageFlags::TRANSFER_SRC,
            BufferUsage::Readback => vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Upload => MemoryLocation::CpuToGpu,
            BufferUsage::Readback => MemoryLocation::GpuToCpu,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Upload => "upload",
            BufferUsage::Readback => "readback",
        }
    }
}

/// GPU buffer wrapper with managed, mapped memory.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidArgument`] for a zero size, or a driver or
    /// allocator error.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidArgument(
                "buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device
            .allocator()
            .and_then(|mut allocator| {
                Ok(allocator.allocate(&AllocationCreateDesc {
                    name: usage.name(),
                    requirements,
                    location: usage.memory_location(),
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })?)
            })
            .inspect_err(|_| unsafe { device.handle().destroy_buffer(buffer, None) })?;

        // Build the wrapper first so a bind failure still releases everything.
        let buffer = Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        };
        if let Some(allocation) = &buffer.allocation {
            unsafe {
                buffer.device.handle().bind_buffer_memory(
                    buffer.buffer,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);
        Ok(buffer)
    }

    /// Creates an upload buffer holding `data`.
    pub fn new_upload(device: Arc<Device>, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, BufferUsage::Upload, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Copies `data` into the mapped memory at `offset`.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.check_range(offset, data.len())?;
        let mapped = self.mapped()?;

        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    /// Copies the whole buffer out of mapped memory.
    ///
    /// Only meaningful once the GPU work that wrote it has completed.
    pub fn read_data(&self) -> RhiResult<Vec<u8>> {
        let mapped = self.mapped()?;
        let len = self.size as usize;
        let mut out = vec![0u8; len];
        unsafe {
            std::ptr::copy_nonoverlapping(mapped.as_ptr().cast::<u8>(), out.as_mut_ptr(), len);
        }
        Ok(out)
    }

    fn check_range(&self, offset: vk::DeviceSize, len: usize) -> RhiResult<()> {
        let end = offset + len as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidArgument(format!(
                "write exceeds buffer size: offset {} + data {} > buffer {}",
                offset, len, self.size
            )));
        }
        Ok(())
    }

    fn mapped(&self) -> RhiResult<std::ptr::NonNull<std::ffi::c_void>> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| RhiError::InvalidArgument("buffer memory is not mapped".to_string()))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free buffer allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking buffer allocation: {}", e),
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}
