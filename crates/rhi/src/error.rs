//! RHI error types.

use thiserror::Error;

/// Errors raised by the Vulkan layer.
///
/// Every failing Vulkan call surfaces as [`RhiError::Vulkan`] carrying the
/// returned `vk::Result`; callers propagate it with `?` up to the frame loop.
#[derive(Error, Debug)]
pub enum RhiError {
    /// A Vulkan call returned an error code
    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] ash::vk::Result),

    /// The Vulkan loader could not be found
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// GPU memory allocation failed
    #[error("Allocator error: {0}")]
    Allocator(#[from] gpu_allocator::AllocationError),

    /// No physical device satisfies the renderer's feature requirements
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Shader module could not be created from the provided bytecode
    #[error("Shader error: {0}")]
    Shader(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    Surface(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// A write or view falls outside the resource it targets
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// The resource was used in a way its creation flags don't allow
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
