//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Thin RAII wrappers over `ash` handles. Every wrapper owns an
//! `Arc<Device>` so destruction order follows ownership, and memory comes
//! from the device's `gpu-allocator` instance.
//!
//! The renderer relies on Vulkan 1.3 core features: dynamic rendering,
//! synchronization2 and timeline semaphores.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
