//! Per-frame orchestration independent of the graphics API.
//!
//! [`FrameCore`] owns the ring, the scene and the pass sequencer and exposes
//! the three entry points the window loop drives: [`on_resize`],
//! [`update`] and [`record`]. The Vulkan renderer wraps it with swapchain
//! acquisition, submission and presentation; tests drive it with the host
//! backend and a [`CommandLog`](crate::recorder::CommandLog).
//!
//! [`on_resize`]: FrameCore::on_resize
//! [`update`]: FrameCore::update
//! [`record`]: FrameCore::record

use std::f32::consts::PI;

use ash::vk;
use glam::{Vec2, Vec3, Vec4};
use prism_core::{CUBE_FACE_COUNT, MAX_SHADOW_TRANSFORMS, RenderConfig};
use prism_resources::MaterialLibrary;
use prism_scene::shadow::{build_shadow_transforms, shadow_slot_count};
use prism_scene::{BoundingSphere, Camera, CubeFaceCameras, Frustum, LightRig, NDC_TO_TEXTURE, ShadowTransform};
use tracing::{debug, info};

use crate::error::{RendererError, RendererResult};
use crate::frame_resource::{CommandAllocator, FrameBackend, FrameLayout, FrameResource, FrameRing, UploadArray};
use crate::gpu_types::PassConstants;
use crate::passes::{MAIN_PASS_SLOT, PassExtents, PassSequencer, cube_face_slot, pass_slot_count, shadow_slot};
use crate::recorder::CommandRecorder;
use crate::render_item::RenderItems;
use crate::ssao::AmbientOcclusion;
use crate::sync_gate::GpuTimeline;
use crate::targets::{TargetLayout, TargetStore, ambient_map_extent};
use crate::visibility::{CullView, VisibilityStats, update_instances};

/// Walk and strafe speed in units per second.
pub const CAMERA_SPEED: f32 = 10.0;
/// Mouse look in degrees per pixel.
pub const MOUSE_DEGREES_PER_PIXEL: f32 = 0.25;

pub const CAMERA_FOV_Y: f32 = 0.25 * PI;
pub const CAMERA_NEAR_Z: f32 = 1.0;
pub const CAMERA_FAR_Z: f32 = 1000.0;

/// Seed of the ambient occlusion sample kernel.
const SSAO_SEED: u64 = 0x5eed;

/// Everything the frame pipeline draws and lights.
pub struct FrameScene {
    pub items: RenderItems,
    pub materials: MaterialLibrary,
    pub lights: LightRig,
    pub ambient_light: Vec4,
    /// Bounds of the whole scene, used to fit directional shadows.
    pub bounds: BoundingSphere,
    /// Where the reflection cube is captured from.
    pub cube_center: Vec3,
    pub camera_position: Vec3,
}

/// Camera movement requested for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CameraInput {
    /// +1 forward, -1 backward.
    pub forward: f32,
    /// +1 right, -1 left.
    pub right: f32,
    /// Mouse movement in pixels while looking around.
    pub look: Vec2,
}

/// Frame timing handed to [`FrameCore::update`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    pub delta: f32,
    pub total: f32,
}

/// What one update produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub slot: usize,
    pub visibility: VisibilityStats,
    pub materials_uploaded: usize,
}

pub struct FrameCore<B: FrameBackend> {
    config: RenderConfig,
    ring: FrameRing<B>,
    scene: FrameScene,
    camera: Camera,
    /// View-space frustum of `camera`.
    frustum: Frustum,
    cube_cameras: CubeFaceCameras,
    ambient_occlusion: AmbientOcclusion,
    sequencer: PassSequencer,
    shadow_transforms: Vec<ShadowTransform>,
    extent: vk::Extent2D,
    target_generation: u64,
    last_report: FrameReport,
}

impl<B: FrameBackend> FrameCore<B> {
    /// Builds the ring for `scene` and places the camera.
    ///
    /// Screen targets do not exist until the first [`on_resize`](Self::on_resize).
    ///
    /// # Errors
    ///
    /// Fails if the lights need more shadow maps than the pass constants
    /// can carry, if the material library tracks a different number of
    /// slots than the ring has, or if a ring buffer cannot be created.
    pub fn new(backend: &B, config: RenderConfig, scene: FrameScene, extent: vk::Extent2D) -> RendererResult<Self> {
        let cascade_count = config.cascade_count as u32;
        let shadow_slots = shadow_slot_count(&scene.lights, cascade_count);
        if shadow_slots > MAX_SHADOW_TRANSFORMS {
            return Err(RendererError::Config(format!(
                "{shadow_slots} shadow maps requested, at most {MAX_SHADOW_TRANSFORMS} are supported"
            )));
        }

        if scene.materials.slot_count() != config.frames_in_flight {
            return Err(RendererError::Config(format!(
                "material library tracks {} ring slots, the ring has {}",
                scene.materials.slot_count(),
                config.frames_in_flight
            )));
        }

        let layout = FrameLayout {
            pass_count: pass_slot_count(shadow_slots),
            material_count: scene.materials.len(),
            instance_counts: scene.items.instance_counts(),
        };
        let ring = FrameRing::new(backend, config.frames_in_flight, layout)?;

        let mut camera = Camera::new();
        camera.set_position(scene.camera_position);
        camera.set_lens(CAMERA_FOV_Y, aspect_ratio(extent), CAMERA_NEAR_Z, CAMERA_FAR_Z);
        camera.update_view_matrix();
        let frustum = Frustum::from_projection(&camera.proj());

        info!(
            "Frame core ready: {} items, {} materials, {} shadow maps, {} ring slots",
            scene.items.len(),
            scene.materials.len(),
            shadow_slots,
            config.frames_in_flight
        );

        Ok(Self {
            sequencer: PassSequencer::new(&config, shadow_slots),
            cube_cameras: CubeFaceCameras::new(scene.cube_center),
            ambient_occlusion: AmbientOcclusion::new(SSAO_SEED),
            shadow_transforms: Vec::with_capacity(shadow_slots),
            config,
            ring,
            scene,
            camera,
            frustum,
            extent,
            target_generation: 0,
            last_report: FrameReport::default(),
        })
    }

    /// Adopts a new window size: rebuilds the lens and the culling frustum,
    /// then every screen-sized target and the descriptors that read them.
    ///
    /// The GPU must be idle. A zero-sized window is ignored.
    pub fn on_resize(&mut self, width: u32, height: u32, targets: &mut impl TargetStore) -> RendererResult<()> {
        if width == 0 || height == 0 {
            debug!("Ignoring resize to {}x{}", width, height);
            return Ok(());
        }

        self.extent = vk::Extent2D { width, height };
        self.camera
            .set_lens(CAMERA_FOV_Y, aspect_ratio(self.extent), CAMERA_NEAR_Z, CAMERA_FAR_Z);
        self.frustum = Frustum::from_projection(&self.camera.proj());

        self.target_generation += 1;
        let layout = TargetLayout::new(self.extent, self.target_generation, &self.config);
        targets.rebuild(&layout)?;
        targets.rewrite_descriptors(&layout)?;
        self.sequencer.on_targets_rebuilt();

        info!(
            "Resized to {}x{} (target generation {})",
            width, height, self.target_generation
        );
        Ok(())
    }

    /// CPU work of one frame.
    ///
    /// Waits for the next ring slot to be released by the GPU, then moves
    /// the camera, culls and uploads instances, uploads dirty materials,
    /// rebuilds the shadow transforms and writes every pass-constant slot.
    pub fn update(
        &mut self,
        time: FrameTime,
        input: &CameraInput,
        timeline: &impl GpuTimeline,
    ) -> RendererResult<FrameReport> {
        let slot = self.ring.advance(timeline)?;
        self.ring.current_mut().commands.reset()?;

        self.update_camera(time.delta, input);

        let visibility = update_instances(
            &mut self.scene.items,
            &CullView {
                view: self.camera.view(),
                frustum: &self.frustum,
                culling: self.config.frustum_culling,
            },
            self.ring.current_mut(),
        )?;

        let materials_uploaded = self.upload_materials(slot)?;

        self.shadow_transforms = build_shadow_transforms(
            &self.camera,
            &self.scene.lights,
            &self.scene.bounds,
            self.config.cascade_count as u32,
            self.config.shadow_map_size,
        );

        self.write_pass_constants(time)?;

        let ssao = self
            .ambient_occlusion
            .constants(self.camera.proj(), ambient_map_extent(self.extent));
        self.ring.current_mut().ssao_constants.write(0, &ssao)?;

        self.last_report = FrameReport {
            slot,
            visibility,
            materials_uploaded,
        };
        Ok(self.last_report)
    }

    /// Records every pass of the current frame into `recorder`. Returns the
    /// number of item draws.
    pub fn record(&mut self, recorder: &mut impl CommandRecorder) -> RendererResult<usize> {
        let extents = PassExtents::new(self.extent, &self.config);
        self.sequencer
            .record(recorder, &self.scene.items, self.ring.current(), &extents)
    }

    /// Like [`record`](Self::record), with a recorder that borrows the
    /// current frame resource (for its command buffer). Returns the recorder
    /// so the caller can finish it.
    pub fn record_frame<'a, R>(
        &'a mut self,
        begin: impl FnOnce(&'a FrameResource<B>) -> RendererResult<R>,
    ) -> RendererResult<(R, usize)>
    where
        R: CommandRecorder + 'a,
    {
        let extents = PassExtents::new(self.extent, &self.config);
        let frame = self.ring.current();
        let mut recorder = begin(frame)?;
        let draws = self
            .sequencer
            .record(&mut recorder, &self.scene.items, frame, &extents)?;
        Ok((recorder, draws))
    }

    /// Marks the current frame as submitted. Returns the fence value the
    /// submission must signal.
    pub fn post_submission(&mut self) -> u64 {
        self.ring.post_submission()
    }

    fn update_camera(&mut self, dt: f32, input: &CameraInput) {
        let distance = CAMERA_SPEED * dt;
        if input.forward != 0.0 {
            self.camera.walk(input.forward * distance);
        }
        if input.right != 0.0 {
            self.camera.strafe(input.right * distance);
        }
        if input.look != Vec2::ZERO {
            let look = input.look * MOUSE_DEGREES_PER_PIXEL.to_radians();
            self.camera.pitch(look.y);
            self.camera.rotate_y(look.x);
        }
        self.camera.update_view_matrix();
    }

    fn upload_materials(&mut self, slot: usize) -> RendererResult<usize> {
        let buffer = &mut self.ring.current_mut().materials;
        let mut result = Ok(());
        let uploaded = self.scene.materials.upload_dirty(slot, |id, data| {
            if result.is_ok() {
                result = buffer.write(id, data);
            }
        });
        result.map(|()| uploaded)
    }

    fn write_pass_constants(&mut self, time: FrameTime) -> RendererResult<()> {
        let (lights, counts) = self.scene.lights.gpu_lights();
        let mut base = PassConstants::default();
        base.set_lights(lights, counts);
        base.set_shadow_transforms(&self.shadow_transforms);
        base.ambient_light = self.scene.ambient_light;
        base.total_time = time.total;
        base.delta_time = time.delta;

        let frame = self.ring.current_mut();

        let mut main = base;
        main.set_camera(
            self.camera.view(),
            self.camera.proj(),
            self.camera.position(),
            NDC_TO_TEXTURE,
        );
        main.set_render_target_size(self.extent.width, self.extent.height);
        main.near_z = self.camera.near_z();
        main.far_z = self.camera.far_z();
        frame.write_pass(MAIN_PASS_SLOT, &main)?;

        for face in 0..CUBE_FACE_COUNT {
            let camera = self.cube_cameras.face(face);
            let mut constants = base;
            constants.set_camera(camera.view(), camera.proj(), camera.position(), NDC_TO_TEXTURE);
            constants.set_render_target_size(self.config.cube_map_size, self.config.cube_map_size);
            constants.near_z = camera.near_z();
            constants.far_z = camera.far_z();
            frame.write_pass(cube_face_slot(face), &constants)?;
        }

        for (i, transform) in self.shadow_transforms.iter().enumerate() {
            let mut constants = base;
            constants.set_camera(transform.view, transform.proj, transform.eye, NDC_TO_TEXTURE);
            constants.set_render_target_size(self.config.shadow_map_size, self.config.shadow_map_size);
            constants.near_z = transform.near_z;
            constants.far_z = transform.far_z;
            frame.write_pass(shadow_slot(i), &constants)?;
        }
        Ok(())
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// View-space culling frustum.
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn target_generation(&self) -> u64 {
        self.target_generation
    }

    pub fn scene(&self) -> &FrameScene {
        &self.scene
    }

    /// Materials may be edited between frames; edits reach every ring slot
    /// within `frames_in_flight` updates.
    pub fn materials_mut(&mut self) -> &mut MaterialLibrary {
        &mut self.scene.materials
    }

    pub fn ring(&self) -> &FrameRing<B> {
        &self.ring
    }

    pub fn shadow_transforms(&self) -> &[ShadowTransform] {
        &self.shadow_transforms
    }

    pub fn sequencer(&self) -> &PassSequencer {
        &self.sequencer
    }

    /// Result of the most recent [`update`](Self::update).
    pub fn last_report(&self) -> FrameReport {
        self.last_report
    }
}

fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    extent.width.max(1) as f32 / extent.height.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_resource::HostBackend;
    use crate::recorder::CommandLog;
    use crate::render_item::{InstanceRecord, RenderItem, RenderLayer};
    use crate::sync_gate::ScriptedTimeline;
    use crate::targets::HostTargetStore;
    use approx::assert_relative_eq;
    use glam::Mat4;
    use prism_resources::{Material, SubmeshGeometry};
    use prism_scene::{Aabb, DirectionalLight, PointLight, SpotLight};

    fn scene() -> FrameScene {
        let submesh = SubmeshGeometry {
            index_count: 36,
            start_index: 0,
            base_vertex: 0,
            bounds: Aabb::new(Vec3::ZERO, Vec3::splat(0.5)),
        };
        let mut materials = MaterialLibrary::new(3);
        materials.insert(Material::new("stone0")).unwrap();
        materials.insert(Material::new("tile0")).unwrap();

        let mut items = RenderItems::new();
        items.push(
            RenderItem::new(0, &submesh, 0).with_instances(
                [0.0, 4.0].map(|x| InstanceRecord::new(Mat4::from_translation(Vec3::new(x, 0.0, 0.0)), 0)),
            ),
            &[RenderLayer::Opaque, RenderLayer::OpaqueShadow],
        );
        items.end_scene_items();

        FrameScene {
            items,
            materials,
            lights: LightRig {
                directional: vec![DirectionalLight {
                    direction: Vec3::new(0.57735, -0.57735, 0.57735),
                    strength: Vec3::splat(0.8),
                }],
                points: Vec::new(),
                spots: vec![SpotLight::default()],
            },
            ambient_light: Vec4::new(0.25, 0.25, 0.35, 1.0),
            bounds: BoundingSphere::new(Vec3::ZERO, 20.0),
            cube_center: Vec3::new(0.0, 2.0, -3.0),
            camera_position: Vec3::new(0.0, 2.0, -15.0),
        }
    }

    fn core(config: RenderConfig) -> FrameCore<HostBackend> {
        FrameCore::new(
            &HostBackend::new(),
            config,
            scene(),
            vk::Extent2D { width: 800, height: 600 },
        )
        .unwrap()
    }

    fn tick() -> FrameTime {
        FrameTime {
            delta: 0.016,
            total: 1.0,
        }
    }

    #[test]
    fn test_ring_is_sized_for_every_pass_slot() {
        let core = core(RenderConfig::default());
        // 3 cascades + 1 spot.
        assert_eq!(core.sequencer().shadow_slots(), 4);
        assert_eq!(core.ring().layout().pass_count, 1 + 6 + 4);
        assert_eq!(core.ring().slot_count(), 3);
    }

    #[test]
    fn test_too_many_shadow_maps_is_rejected() {
        let mut scene = scene();
        let point = PointLight {
            position: Vec3::new(0.0, 5.0, 0.0),
            strength: Vec3::ONE,
            falloff_start: 1.0,
            falloff_end: 20.0,
        };
        scene.lights.points.extend([point, point]);
        let result = FrameCore::new(
            &HostBackend::new(),
            RenderConfig::default(),
            scene,
            vk::Extent2D { width: 800, height: 600 },
        );
        assert!(matches!(result, Err(RendererError::Config(_))));
    }

    #[test]
    fn test_material_slots_must_match_the_ring() {
        let config = RenderConfig {
            frames_in_flight: 4,
            ..RenderConfig::default()
        };
        let result = FrameCore::new(
            &HostBackend::new(),
            config,
            scene(),
            vk::Extent2D { width: 800, height: 600 },
        );
        assert!(matches!(result, Err(RendererError::Config(_))));
    }

    #[test]
    fn test_four_slot_ring_gets_materials_in_every_slot() {
        let config = RenderConfig {
            frames_in_flight: 4,
            ..RenderConfig::default()
        };
        let mut scene = scene();
        let mut materials = MaterialLibrary::new(4);
        let id = materials.insert(Material::new("stone0")).unwrap();
        materials.edit(id, |m| m.roughness = 0.77).unwrap();
        materials.insert(Material::new("tile0")).unwrap();
        scene.materials = materials;

        let mut core = FrameCore::new(
            &HostBackend::new(),
            config,
            scene,
            vk::Extent2D { width: 800, height: 600 },
        )
        .unwrap();
        let timeline = ScriptedTimeline::new();
        for _ in 0..4 {
            let report = core.update(tick(), &CameraInput::default(), &timeline).unwrap();
            assert_eq!(report.materials_uploaded, 2);
            core.post_submission();
        }
        for slot in 0..4 {
            assert_eq!(core.ring().frame(slot).materials.as_slice()[id].roughness, 0.77);
        }
    }

    #[test]
    fn test_update_writes_every_slot() {
        let mut core = core(RenderConfig::default());
        let timeline = ScriptedTimeline::new();
        let report = core.update(tick(), &CameraInput::default(), &timeline).unwrap();

        assert_eq!(report.slot, 0);
        assert_eq!(report.visibility.total, 2);
        assert_eq!(report.materials_uploaded, 2);
        assert_eq!(core.shadow_transforms().len(), 4);

        let frame = core.ring().frame(0);
        let passes = frame.pass_constants.as_slice();
        assert_eq!(passes[MAIN_PASS_SLOT].render_target_size, Vec2::new(800.0, 600.0));
        assert_eq!(passes[MAIN_PASS_SLOT].light_counts, [1, 0, 1, 4]);
        assert_eq!(passes[MAIN_PASS_SLOT].near_z, CAMERA_NEAR_Z);
        assert_eq!(passes[cube_face_slot(0)].render_target_size, Vec2::splat(512.0));
        assert_eq!(passes[cube_face_slot(0)].eye_position, Vec3::new(0.0, 2.0, -3.0));
        assert_eq!(passes[shadow_slot(3)].render_target_size, Vec2::splat(2048.0));

        let spot = &core.shadow_transforms()[3];
        assert_eq!(passes[shadow_slot(3)].view.transpose(), spot.view);
        assert_eq!(passes[shadow_slot(3)].eye_position, spot.eye);

        assert_relative_eq!(frame.ssao_constants.as_slice()[0].inv_render_target_size.x, 1.0 / 400.0);
    }

    #[test]
    fn test_camera_moves_with_input() {
        let mut core = core(RenderConfig::default());
        let timeline = ScriptedTimeline::new();
        let start = core.camera().position();
        let input = CameraInput {
            forward: 1.0,
            ..Default::default()
        };
        core.update(FrameTime { delta: 0.5, total: 0.5 }, &input, &timeline)
            .unwrap();
        assert_relative_eq!(core.camera().position().z, start.z + 5.0, epsilon = 1e-4);
    }

    #[test]
    fn test_mouse_look_turns_the_camera() {
        let mut core = core(RenderConfig::default());
        let timeline = ScriptedTimeline::new();
        let input = CameraInput {
            look: Vec2::new(360.0, 0.0),
            ..Default::default()
        };
        core.update(tick(), &input, &timeline).unwrap();
        // 360 px at 0.25 deg/px is a quarter turn from +Z towards +X.
        let look = core.camera().look();
        assert_relative_eq!(look.x, 1.0, epsilon = 1e-4);
        assert_relative_eq!(look.z, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_resize_rebuilds_lens_and_targets() {
        let mut core = core(RenderConfig::default());
        let mut store = HostTargetStore::new();
        core.on_resize(800, 600, &mut store).unwrap();
        core.on_resize(1920, 1080, &mut store).unwrap();

        assert_eq!(core.target_generation(), 2);
        assert_relative_eq!(core.camera().aspect(), 1920.0 / 1080.0);
        assert_eq!(*core.frustum(), Frustum::from_projection(&core.camera().proj()));
        assert!(store.stale_descriptors().is_empty());
        assert_eq!(store.rebuilds(), 2);
    }

    #[test]
    fn test_update_after_resize_uses_the_new_lens() {
        let mut core = core(RenderConfig::default());
        let mut store = HostTargetStore::new();
        let timeline = ScriptedTimeline::new();
        core.on_resize(800, 600, &mut store).unwrap();
        core.update(tick(), &CameraInput::default(), &timeline).unwrap();

        core.on_resize(1920, 1080, &mut store).unwrap();
        let report = core.update(tick(), &CameraInput::default(), &timeline).unwrap();

        let main = core.ring().frame(report.slot).pass_constants.as_slice()[MAIN_PASS_SLOT];
        assert_eq!(main.render_target_size, Vec2::new(1920.0, 1080.0));
        assert_eq!(main.proj.transpose(), core.camera().proj());
        assert_relative_eq!(
            core.ring().frame(report.slot).ssao_constants.as_slice()[0].inv_render_target_size.x,
            1.0 / 960.0
        );
    }

    #[test]
    fn test_minimized_window_is_ignored() {
        let mut core = core(RenderConfig::default());
        let mut store = HostTargetStore::new();
        core.on_resize(0, 600, &mut store).unwrap();
        assert_eq!(core.target_generation(), 0);
        assert_eq!(store.rebuilds(), 0);
        assert_eq!(core.extent(), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_record_draws_the_scene() {
        let mut core = core(RenderConfig::default());
        let timeline = ScriptedTimeline::new();
        core.update(tick(), &CameraInput::default(), &timeline).unwrap();

        let mut log = CommandLog::new([0]);
        let draws = core.record(&mut log).unwrap();
        // Four shadow maps, normal-depth and G-buffer.
        assert_eq!(draws, 4 + 1 + 1);
        assert_eq!(core.post_submission(), 1);
    }

    #[test]
    fn test_record_frame_hands_out_the_current_slot() {
        let mut core = core(RenderConfig::default());
        let timeline = ScriptedTimeline::new();
        core.update(tick(), &CameraInput::default(), &timeline).unwrap();
        core.update(tick(), &CameraInput::default(), &timeline).unwrap();

        let (log, draws) = core
            .record_frame(|frame| {
                assert_eq!(frame.commands.resets, 1);
                Ok(CommandLog::new([0]))
            })
            .unwrap();
        assert_eq!(draws, 6);
        assert_eq!(log.draw_instance_counts().len(), 6);
        assert_eq!(core.ring().current_index(), 1);
    }
}
