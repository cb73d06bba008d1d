//! Renderer error types.

use prism_rhi::RhiError;
use thiserror::Error;

use crate::pipelines::PipelineKind;

/// Errors raised while building or recording frames.
///
/// GPU failures arrive wrapped in [`RendererError::Rhi`] and are fatal. The
/// remaining variants are logic errors: the frame pipeline was asked for
/// something its own bookkeeping says cannot exist.
#[derive(Error, Debug)]
pub enum RendererError {
    /// A Vulkan-layer operation failed
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// The scene could not be assembled
    #[error("Scene error: {0}")]
    Resource(#[from] prism_resources::ResourceError),

    /// The startup configuration cannot drive this scene
    #[error("Config error: {0}")]
    Config(String),

    /// Window or surface setup failed
    #[error("Platform error: {0}")]
    Platform(#[from] prism_core::Error),

    /// A render item has no instance buffer in the current ring slot
    #[error("Render item {0} has no instance buffer in this frame resource")]
    MissingInstanceBuffer(usize),

    /// A pass-constant slot past the end of the frame's constant buffer
    #[error("Pass constant slot {slot} is out of range ({count} slots)")]
    PassSlotOutOfRange { slot: usize, count: usize },

    /// A pipeline was bound that was never created
    #[error("Pipeline {0:?} was not created")]
    MissingPipeline(PipelineKind),

    /// A pass referenced a target the store does not hold
    #[error("Render target {0} does not exist")]
    MissingTarget(String),
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = std::result::Result<T, RendererError>;
