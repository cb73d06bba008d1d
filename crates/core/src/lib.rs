//! Core utilities shared by the prism crates.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - The immutable [`RenderConfig`] that fixes the pipeline topology

mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    CUBE_FACE_COUNT, MAX_FRAMES_IN_FLIGHT, MAX_SHADOW_TRANSFORMS, RenderConfig, ShadingPath,
    WindowConfig,
};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FrameStats, Timer};
