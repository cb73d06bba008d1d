//! Frame pipeline of the prism renderer.
//!
//! This crate orchestrates the rendering process:
//! - The frame-resource ring and the timeline-semaphore gate in front of it
//! - Visibility culling and per-frame instance upload
//! - The pass sequence: shadow maps, the dynamic reflection cube,
//!   normal/depth, ambient occlusion, the G-buffer, main color, sky and present
//! - Swapchain acquisition, submission, presentation and resize
//!
//! Everything above the Vulkan layer ([`FrameCore`] and the pass sequencer)
//! is generic over [`FrameBackend`], [`CommandRecorder`] and [`TargetStore`],
//! so it runs against host-side doubles in tests.

pub mod demo_scene;
pub mod draw;
pub mod error;
pub mod frame_core;
pub mod frame_resource;
pub mod gpu_types;
pub mod passes;
pub mod pipelines;
pub mod recorder;
pub mod render_item;
pub mod renderer;
pub mod ssao;
pub mod state_tracker;
pub mod sync_gate;
pub mod targets;
pub mod visibility;
pub mod vulkan_backend;
pub mod vulkan_recorder;
pub mod vulkan_targets;

pub use error::{RendererError, RendererResult};
pub use frame_core::{CameraInput, FrameCore, FrameReport, FrameScene, FrameTime};
pub use frame_resource::{FrameBackend, FrameResource, FrameRing, HostBackend};
pub use passes::{PassKind, PassSequencer};
pub use recorder::{CommandLog, CommandRecorder};
pub use render_item::{InstanceRecord, RenderItem, RenderItems, RenderLayer};
pub use renderer::Renderer;
pub use state_tracker::{ResourceState, TargetId};
pub use sync_gate::{FrameGate, GpuTimeline, ScriptedTimeline};
pub use targets::{HostTargetStore, TargetStore};
pub use visibility::VisibilityStats;
