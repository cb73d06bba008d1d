//! Frame-resource backend over Vulkan buffers and command pools.

use std::sync::Arc;
use std::time::Duration;

use bytemuck::Pod;
use prism_rhi::buffer::{BufferUsage, UploadBuffer};
use prism_rhi::command::{CommandBuffer, CommandPool};
use prism_rhi::device::Device;
use prism_rhi::sync::{TimelineSemaphore, WaitStatus};
use prism_rhi::RhiError;

use crate::error::RendererResult;
use crate::frame_resource::{CommandAllocator, FrameBackend};
use crate::sync_gate::GpuTimeline;

/// A command pool with the one primary buffer a ring slot records into.
pub struct SlotCommands {
    // Declared before the pool so it is released first.
    buffer: CommandBuffer,
    pool: CommandPool,
}

impl SlotCommands {
    #[inline]
    pub fn buffer(&self) -> &CommandBuffer {
        &self.buffer
    }
}

impl CommandAllocator for SlotCommands {
    fn reset(&mut self) -> RendererResult<()> {
        Ok(self.pool.reset()?)
    }
}

/// Hands out persistently mapped upload buffers and per-slot command pools
/// on the graphics queue family.
pub struct VulkanBackend {
    device: Arc<Device>,
    queue_family: u32,
}

impl VulkanBackend {
    pub fn new(device: Arc<Device>) -> RendererResult<Self> {
        let queue_family = device.queue_families().graphics_family.ok_or_else(|| {
            RhiError::InvalidUsage("device has no graphics queue family".to_string())
        })?;
        Ok(Self {
            device,
            queue_family,
        })
    }
}

impl FrameBackend for VulkanBackend {
    type Upload<T: Pod> = UploadBuffer<T>;
    type Allocator = SlotCommands;

    fn create_upload<T: Pod>(&self, usage: BufferUsage, len: usize) -> RendererResult<UploadBuffer<T>> {
        Ok(UploadBuffer::new(self.device.clone(), usage, len)?)
    }

    fn create_command_allocator(&self) -> RendererResult<SlotCommands> {
        let pool = CommandPool::new(self.device.clone(), self.queue_family)?;
        let buffer = CommandBuffer::new(self.device.clone(), &pool)?;
        Ok(SlotCommands { buffer, pool })
    }
}

impl GpuTimeline for TimelineSemaphore {
    fn completed_value(&self) -> RendererResult<u64> {
        Ok(TimelineSemaphore::completed_value(self)?)
    }

    fn wait_until(&self, value: u64, timeout: Option<Duration>) -> RendererResult<bool> {
        Ok(self.wait(value, timeout)? == WaitStatus::Reached)
    }
}
