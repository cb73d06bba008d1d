//! Platform layer of the prism renderer.
//!
//! - Window management via winit
//! - Vulkan surface creation through the window's raw handles
//! - Keyboard and mouse state for camera control

mod input;
mod window;

pub use input::{InputState, KeyCode, MouseButton};
pub use window::{Surface, Window, required_surface_extensions};

// Re-export winit types that users might need
pub use winit::application::ApplicationHandler;
pub use winit::event::{ElementState, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
pub use winit::keyboard::PhysicalKey;
pub use winit::window::WindowId;
