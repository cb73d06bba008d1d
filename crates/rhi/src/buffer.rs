//! GPU buffer management.
//!
//! All buffers live in host-visible memory (`MemoryLocation::CpuToGpu`) and
//! stay persistently mapped: geometry is written once at startup, and the
//! per-frame constant, material and instance buffers are rewritten by the CPU
//! every time their ring slot comes around.
//!
//! # Overview
//!
//! - [`BufferUsage`] picks Vulkan usage flags for a buffer's role
//! - [`Buffer`] wraps a `VkBuffer` and its gpu-allocator allocation
//! - [`UploadBuffer`] is a typed array of `T` over a [`Buffer`], with
//!   elements padded to the alignment the role requires
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use prism_rhi::device::Device;
//! use prism_rhi::buffer::{BufferUsage, UploadBuffer};
//!
//! # fn example(device: Arc<Device>) -> Result<(), prism_rhi::RhiError> {
//! let mut constants = UploadBuffer::<[f32; 4]>::new(device, BufferUsage::Uniform, 8)?;
//! constants.copy(3, &[1.0, 0.0, 0.0, 1.0])?;
//! let byte_offset = constants.offset_of(3);
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Role of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer
    Vertex,
    /// Index buffer
    Index,
    /// Uniform buffer, bound with a dynamic offset per element
    Uniform,
    /// Storage buffer, read by shaders through its device address
    Storage,
    /// Source of a one-off transfer into an image
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Storage => {
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Storage => "storage",
            BufferUsage::Staging => "staging",
        }
    }

    /// Per-element alignment inside an [`UploadBuffer`]. Uniform elements
    /// are bound at dynamic offsets, so they follow the device limit.
    pub fn element_alignment(self, limits: &vk::PhysicalDeviceLimits) -> u64 {
        match self {
            BufferUsage::Uniform => limits.min_uniform_buffer_offset_alignment.max(16),
            _ => 16,
        }
    }
}

/// A host-visible, persistently mapped `VkBuffer`.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidUsage(format!(
                "{} buffer size must be greater than 0",
                usage.name()
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate(&AllocationCreateDesc {
                name: usage.name(),
                requirements,
                location: MemoryLocation::CpuToGpu,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }
        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Copies `data` into the mapped memory at `offset`.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::OutOfBounds(format!(
                "write of {} bytes at offset {} exceeds {} buffer of {} bytes",
                data.len(),
                offset,
                self.usage.name(),
                self.size
            )));
        }

        let mapped = self
            .allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .ok_or_else(|| RhiError::InvalidUsage("buffer memory is not mapped".to_string()))?;
        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    /// GPU virtual address of the buffer. Storage buffers only.
    pub fn device_address(&self) -> RhiResult<vk::DeviceAddress> {
        if self.usage != BufferUsage::Storage {
            return Err(RhiError::InvalidUsage(format!(
                "{} buffer has no device address",
                self.usage.name()
            )));
        }
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.buffer);
        Ok(unsafe { self.device.handle().get_buffer_device_address(&info) })
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
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free buffer allocation: {:?}", e);
            }
        }
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
        debug!("Destroyed {} buffer", self.usage.name());
    }
}

/// Rounds `size` up to a multiple of `alignment` (a power of two).
#[inline]
pub const fn align_up(size: u64, alignment: u64) -> u64 {
    (size + alignment - 1) & !(alignment - 1)
}

/// Typed array of `T` in a host-visible buffer.
pub struct UploadBuffer<T: Pod> {
    buffer: Buffer,
    len: usize,
    stride: u64,
    _marker: PhantomData<T>,
}

impl<T: Pod> UploadBuffer<T> {
    /// Allocates room for `len` elements (at least one).
    pub fn new(device: Arc<Device>, usage: BufferUsage, len: usize) -> RhiResult<Self> {
        let stride = align_up(
            std::mem::size_of::<T>() as u64,
            usage.element_alignment(device.limits()),
        );
        let buffer = Buffer::new(device, usage, stride * len.max(1) as u64)?;
        Ok(Self {
            buffer,
            len,
            stride,
            _marker: PhantomData,
        })
    }

    /// Writes element `index`.
    pub fn copy(&mut self, index: usize, value: &T) -> RhiResult<()> {
        if index >= self.len {
            return Err(RhiError::OutOfBounds(format!(
                "element {} of {}-element upload buffer",
                index, self.len
            )));
        }
        self.buffer
            .write_data(self.offset_of(index), bytemuck::bytes_of(value))
    }

    /// Writes `values` starting at element 0.
    pub fn copy_slice(&mut self, values: &[T]) -> RhiResult<()> {
        if values.len() > self.len {
            return Err(RhiError::OutOfBounds(format!(
                "{} elements into {}-element upload buffer",
                values.len(),
                self.len
            )));
        }
        if self.stride == std::mem::size_of::<T>() as u64 {
            return self.buffer.write_data(0, bytemuck::cast_slice(values));
        }
        for (index, value) in values.iter().enumerate() {
            self.copy(index, value)?;
        }
        Ok(())
    }

    /// Byte offset of element `index`.
    #[inline]
    pub fn offset_of(&self, index: usize) -> u64 {
        self.stride * index as u64
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert!(
            BufferUsage::Storage
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)
        );
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(2048, 256), 2048);
        assert_eq!(align_up(144, 16), 144);
        assert_eq!(align_up(0, 16), 0);
    }

    #[test]
    fn test_uniform_alignment_follows_device_limit() {
        let limits = vk::PhysicalDeviceLimits {
            min_uniform_buffer_offset_alignment: 64,
            ..Default::default()
        };
        assert_eq!(BufferUsage::Uniform.element_alignment(&limits), 64);
        assert_eq!(BufferUsage::Storage.element_alignment(&limits), 16);
        assert_eq!(align_up(208, BufferUsage::Uniform.element_alignment(&limits)), 256);

        let tiny = vk::PhysicalDeviceLimits {
            min_uniform_buffer_offset_alignment: 4,
            ..Default::default()
        };
        assert_eq!(BufferUsage::Uniform.element_alignment(&tiny), 16);
    }
}
