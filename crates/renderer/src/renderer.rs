//! The Vulkan renderer.
//!
//! Wraps a [`FrameCore`] with everything that needs a real GPU: instance,
//! device, swapchain, pipelines, render targets and the per-frame
//! acquire/submit/present sequence.
//!
//! # Frame sequence
//!
//! ```text
//! update: apply pending resize -> wait for ring slot -> cull + upload -> write pass constants
//! draw:   acquire image -> record passes -> submit (signal timeline) -> present
//! ```
//!
//! # Resource destruction order
//!
//! Fields drop in declaration order. Everything holding an `Arc<Device>` is
//! declared before `device`, which is followed by the surface and finally
//! the instance. [`Drop`] only waits for the GPU to go idle.

use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use prism_core::RenderConfig;
use prism_platform::{Surface, Window, required_surface_extensions};
use prism_rhi::device::Device;
use prism_rhi::image::subresource_range;
use prism_rhi::instance::Instance;
use prism_rhi::physical_device::select_physical_device;
use prism_rhi::swapchain::Swapchain;
use prism_rhi::sync::{Semaphore, TimelineSemaphore};
use prism_rhi::RhiError;
use tracing::{debug, error, info};

use crate::demo_scene;
use crate::error::RendererResult;
use crate::frame_core::{CameraInput, FrameCore, FrameReport, FrameTime};
use crate::pipelines::{PipelineKind, PipelineSet, SHADER_DIR};
use crate::vulkan_backend::VulkanBackend;
use crate::vulkan_recorder::{FrameBindings, GeometryBuffers, VulkanRecorder};
use crate::vulkan_targets::{TargetView, VulkanTargets};

const APP_NAME: &CStr = c"prism";

/// Main renderer that owns every Vulkan resource of the frame pipeline.
pub struct Renderer {
    core: FrameCore<VulkanBackend>,
    geometries: GeometryBuffers,
    pipelines: PipelineSet,
    targets: VulkanTargets,
    /// Signaled by each acquire, one per ring slot.
    image_available: Vec<Semaphore>,
    /// Signaled by each submission, one per swapchain image.
    render_finished: Vec<Semaphore>,
    /// Fence counter every submission signals.
    timeline: TimelineSemaphore,
    swapchain: Swapchain,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,

    /// Window size the swapchain must be rebuilt for, if any.
    pending_resize: Option<vk::Extent2D>,
    last_draw_count: usize,
}

impl Renderer {
    /// Creates the renderer for `window` and builds the demo scene.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan resource cannot be created, a shader
    /// is missing, or `config` asks for more shadow maps than supported.
    pub fn new(window: &Window, config: RenderConfig) -> RendererResult<Self> {
        let extent = vk::Extent2D {
            width: window.width(),
            height: window.height(),
        };
        info!("Initializing Vulkan renderer ({}x{})", extent.width, extent.height);

        let surface_extensions = required_surface_extensions(window)?;
        let instance = Instance::new(APP_NAME, &surface_extensions, cfg!(debug_assertions))?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;
        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            surface.loader(),
            extent,
            config.vsync,
        )?;

        let scene = demo_scene::build(&config)?;
        let backend = VulkanBackend::new(device.clone())?;
        let core = FrameCore::new(&backend, config.clone(), scene.frame, swapchain.extent())?;

        let targets = VulkanTargets::new(
            device.clone(),
            &config,
            core.sequencer().shadow_slots(),
            swapchain.format(),
            &scene.textures,
        )?;
        for slot in 0..core.ring().slot_count() {
            targets.write_frame_set(slot, core.ring().frame(slot))?;
        }

        let pipelines = PipelineSet::new(
            device.clone(),
            &targets.set_layouts(),
            Path::new(SHADER_DIR),
            swapchain.format(),
            &PipelineKind::required(&config),
        )?;
        let geometries = GeometryBuffers::new(device.clone(), &scene.geometries)?;

        let timeline = TimelineSemaphore::new(device.clone(), 0)?;
        let image_available = create_semaphores(&device, config.frames_in_flight)?;
        let render_finished = create_semaphores(&device, swapchain.image_count())?;

        let mut renderer = Self {
            core,
            geometries,
            pipelines,
            targets,
            image_available,
            render_finished,
            timeline,
            swapchain,
            device,
            surface,
            instance,
            pending_resize: None,
            last_draw_count: 0,
        };
        let extent = renderer.swapchain.extent();
        renderer
            .core
            .on_resize(extent.width, extent.height, &mut renderer.targets)?;

        info!(
            "Renderer initialized: {} swapchain images, {} frames in flight, {} geometries",
            renderer.swapchain.image_count(),
            config.frames_in_flight,
            renderer.geometries.len()
        );
        Ok(renderer)
    }

    /// Notes a new window size. The swapchain and every screen-sized target
    /// are rebuilt at the start of the next [`update`](Self::update), so the
    /// frame it prepares already uses the new lens.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            debug!("Ignoring resize to zero dimensions");
            return;
        }
        let extent = vk::Extent2D { width, height };
        if extent != self.core.extent() {
            debug!("Resize requested: {}x{}", width, height);
            self.pending_resize = Some(extent);
        }
    }

    /// CPU work of one frame; blocks until the next ring slot is free.
    pub fn update(&mut self, time: FrameTime, input: &CameraInput) -> RendererResult<FrameReport> {
        if let Some(extent) = self.pending_resize.take() {
            self.recreate_swapchain(extent)?;
        }
        self.core.update(time, input, &self.timeline)
    }

    /// Records, submits and presents the frame prepared by the last
    /// [`update`](Self::update). Returns the number of item draws, zero when
    /// the swapchain had to be rebuilt instead.
    ///
    /// # Errors
    ///
    /// Any Vulkan failure other than an out-of-date swapchain is fatal.
    pub fn draw(&mut self) -> RendererResult<usize> {
        let slot = self.core.ring().current_index();
        let acquire = self.image_available[slot].handle();
        let image_index = match self.swapchain.acquire_next_image(acquire) {
            Ok((index, _suboptimal)) => index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date at acquire, recreating");
                self.recreate_swapchain(self.core.extent())?;
                return Ok(0);
            }
            Err(e) => return Err(RhiError::from(e).into()),
        };
        let image = image_index as usize;

        let frame_set = self
            .targets
            .frame_set(slot)
            .ok_or_else(|| RhiError::OutOfBounds(format!("no descriptor set for ring slot {slot}")))?;
        let backbuffer = TargetView {
            image: self.swapchain.image(image),
            view: self.swapchain.image_view(image),
            range: subresource_range(vk::ImageAspectFlags::COLOR, 0, 1),
        };
        let targets = &self.targets;
        let pipelines = &self.pipelines;
        let geometries = &self.geometries;
        let (recorder, draws) = self.core.record_frame(|frame| {
            VulkanRecorder::begin(
                frame.commands.buffer(),
                FrameBindings {
                    targets,
                    pipelines,
                    geometries,
                    backbuffer,
                    frame_set,
                    pass_stride: frame.pass_constants.stride(),
                },
            )
        })?;
        recorder.finish()?;

        let command_buffer = self.core.ring().current().commands.buffer().handle();
        let fence_value = self.core.post_submission();
        self.submit(command_buffer, acquire, image, fence_value)?;

        let present = self.swapchain.present(
            self.device.present_queue(),
            image_index,
            self.render_finished[image].handle(),
        );
        let recreate = match present {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR) => true,
            Err(e) => return Err(RhiError::from(e).into()),
        };
        if recreate && self.pending_resize.is_none() {
            debug!("Swapchain suboptimal at present, recreating next frame");
            self.pending_resize = Some(self.core.extent());
        }

        self.last_draw_count = draws;
        Ok(draws)
    }

    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        acquire: vk::Semaphore,
        image: usize,
        fence_value: u64,
    ) -> RendererResult<()> {
        let waits = [vk::SemaphoreSubmitInfo::default()
            .semaphore(acquire)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let signals = [
            vk::SemaphoreSubmitInfo::default()
                .semaphore(self.render_finished[image].handle())
                .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS),
            vk::SemaphoreSubmitInfo::default()
                .semaphore(self.timeline.handle())
                .value(fence_value)
                .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS),
        ];
        let command_buffers = [vk::CommandBufferSubmitInfo::default().command_buffer(command_buffer)];
        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&waits)
            .command_buffer_infos(&command_buffers)
            .signal_semaphore_infos(&signals);

        // SAFETY: the command buffer finished recording and every semaphore
        // outlives the submission (the renderer waits idle before dropping).
        unsafe { self.device.submit_graphics(&[submit])? };
        Ok(())
    }

    /// Rebuilds the swapchain, then lets the frame core rebuild the
    /// screen-sized targets at the size the swapchain actually got.
    fn recreate_swapchain(&mut self, requested: vk::Extent2D) -> RendererResult<()> {
        self.device.wait_idle()?;
        self.swapchain
            .recreate(self.surface.handle(), self.surface.loader(), requested)?;
        if self.render_finished.len() != self.swapchain.image_count() {
            self.render_finished = create_semaphores(&self.device, self.swapchain.image_count())?;
        }

        let extent = self.swapchain.extent();
        self.core
            .on_resize(extent.width, extent.height, &mut self.targets)?;
        Ok(())
    }

    pub fn core(&self) -> &FrameCore<VulkanBackend> {
        &self.core
    }

    /// Item draws recorded by the last presented frame.
    pub fn last_draw_count(&self) -> usize {
        self.last_draw_count
    }

    /// Returns the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {:?}", e);
        }
        info!("Renderer destroyed");
    }
}

fn create_semaphores(device: &Arc<Device>, count: usize) -> RendererResult<Vec<Semaphore>> {
    (0..count)
        .map(|_| Ok(Semaphore::new(device.clone())?))
        .collect()
}
