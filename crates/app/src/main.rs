//! prism - multi-pass Vulkan rendering demo.
//!
//! Usage: `prism [config.toml]`. Without a config file the defaults apply:
//! deferred shading, SSAO, cascaded shadows and a dynamic reflection cube.

use anyhow::{Context, Result};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use prism_core::{RenderConfig, Timer};
use prism_platform::{InputState, Window};
use prism_renderer::{CameraInput, FrameTime, Renderer};

struct App {
    config: RenderConfig,
    window: Option<Window>,
    renderer: Option<Renderer>,
    input: InputState,
    timer: Timer,
    /// The error that stopped the event loop, if any.
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: RenderConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            input: InputState::new(),
            timer: Timer::new(),
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        error!("{:#}", error);
        self.fatal.get_or_insert(error);
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window).context("failed to create window")?;
        let renderer = Renderer::new(&window, self.config.clone()).context("failed to create renderer")?;
        info!("Initialization complete, entering main loop");
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return Ok(());
        };
        if window.is_minimized() {
            return Ok(());
        }

        let time = FrameTime {
            delta: self.timer.delta_secs(),
            total: self.timer.total_secs(),
        };
        let (forward, right) = self.input.movement_axes();
        let input = CameraInput {
            forward,
            right,
            look: self.input.look_delta(),
        };
        self.input.begin_frame();

        let report = renderer.update(time, &input)?;
        renderer.draw()?;

        if let Some(stats) = self.timer.count_frame() {
            window.set_title(&format!(
                "{}    fps: {:.0}   mspf: {:.3}   visible: {}/{}",
                self.config.window.title,
                stats.fps,
                stats.ms_per_frame,
                report.visibility.visible,
                report.visibility.total
            ));
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.on_resize(size.width, size.height);
                }
            }
            WindowEvent::Focused(false) => self.input.release_all(),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.frame() {
                    self.fail(event_loop, e);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.input.on_key_pressed(key),
                        ElementState::Released => self.input.on_key_released(key),
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => self.input.on_mouse_pressed(button.into()),
                ElementState::Released => self.input.on_mouse_released(button.into()),
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .on_mouse_moved(position.x as f32, position.y as f32);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn load_config() -> Result<RenderConfig> {
    match std::env::args_os().nth(1) {
        Some(path) => RenderConfig::load(&path)
            .with_context(|| format!("failed to load config {}", path.to_string_lossy())),
        None => Ok(RenderConfig::default()),
    }
}

fn main() -> Result<()> {
    prism_core::init_logging();
    info!("Starting prism");

    let config = load_config()?;
    info!("Render config: {:?}", config);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // Drop the renderer (which flushes the GPU) before the window.
    app.renderer.take();
    app.window.take();

    match app.fatal.take() {
        Some(e) => Err(e.context("renderer stopped")),
        None => Ok(()),
    }
}
