//! The pass sequencer.
//!
//! Every frame is recorded as the same ordered list of passes:
//!
//! ```text
//! Shadow -> ReflectionCube -> NormalDepth -> AmbientOcclusion
//!        -> Geometry -> MainColor -> Sky -> Present
//! ```
//!
//! Passes disabled by the configuration are left out of the list once, at
//! construction. Layout transitions come from a [`StateTracker`] that
//! outlives the frame, so a target is only transitioned when its state
//! actually changes.
//!
//! Pass constants live in one array per frame resource: the main camera in
//! slot 0, the six cube-face cameras in slots 1..=6 and one slot per shadow
//! transform after that.

use ash::vk;
use prism_core::{CUBE_FACE_COUNT, RenderConfig};

use crate::draw::ItemDrawer;
use crate::error::RendererResult;
use crate::frame_resource::{FrameBackend, FrameResource, UploadArray, check_pass_slot};
use crate::pipelines::PipelineKind;
use crate::recorder::{CommandRecorder, PassBegin};
use crate::render_item::{RenderItems, RenderLayer};
use crate::state_tracker::{ResourceState, StateTracker, TargetId};
use crate::targets::{GBUFFER_COUNT, ambient_map_extent};

/// Backbuffer clear colour (light steel blue).
pub const CLEAR_COLOR: [f32; 4] = [0.690196, 0.768627, 0.870588, 1.0];

const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 0.0];
/// View-space normal (0, 0, -1) at the far plane.
const NORMAL_MAP_CLEAR: [f32; 4] = [0.0, 0.0, -1.0, 1.0];
const AMBIENT_CLEAR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

pub const MAIN_PASS_SLOT: usize = 0;

#[inline]
pub fn cube_face_slot(face: usize) -> usize {
    1 + face
}

#[inline]
pub fn shadow_slot(index: usize) -> usize {
    1 + CUBE_FACE_COUNT + index
}

/// Pass-constant slots needed for `shadow_slots` shadow transforms.
#[inline]
pub fn pass_slot_count(shadow_slots: usize) -> usize {
    1 + CUBE_FACE_COUNT + shadow_slots
}

/// One stage of the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    Shadow,
    ReflectionCube,
    NormalDepth,
    AmbientOcclusion,
    Geometry,
    MainColor,
    Sky,
    Present,
}

/// Sizes of the targets each pass renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassExtents {
    pub screen: vk::Extent2D,
    pub shadow_map: vk::Extent2D,
    pub cube: vk::Extent2D,
}

impl PassExtents {
    pub fn new(screen: vk::Extent2D, config: &RenderConfig) -> Self {
        let square = |size: u32| vk::Extent2D {
            width: size,
            height: size,
        };
        Self {
            screen,
            shadow_map: square(config.shadow_map_size),
            cube: square(config.cube_map_size),
        }
    }
}

/// Records the passes of every frame.
#[derive(Debug)]
pub struct PassSequencer {
    passes: Vec<PassKind>,
    shadow_slots: usize,
    deferred: bool,
    dynamic_cube_map: bool,
    blur_count: u32,
    show_shadow_debug: bool,
    tracker: StateTracker,
    drawer: ItemDrawer,
}

impl PassSequencer {
    pub fn new(config: &RenderConfig, shadow_slots: usize) -> Self {
        let mut passes = vec![PassKind::Shadow, PassKind::ReflectionCube];
        if config.ssao {
            passes.push(PassKind::NormalDepth);
            passes.push(PassKind::AmbientOcclusion);
        }
        if config.is_deferred() {
            passes.push(PassKind::Geometry);
        }
        passes.extend([PassKind::MainColor, PassKind::Sky, PassKind::Present]);

        Self {
            passes,
            shadow_slots,
            deferred: config.is_deferred(),
            dynamic_cube_map: config.dynamic_cube_map,
            blur_count: config.ssao_blur_count,
            show_shadow_debug: config.show_shadow_debug,
            tracker: StateTracker::new(),
            drawer: ItemDrawer::new(),
        }
    }

    pub fn passes(&self) -> &[PassKind] {
        &self.passes
    }

    pub fn shadow_slots(&self) -> usize {
        self.shadow_slots
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    /// Forgets the states of every screen-sized target after a resize.
    pub fn on_targets_rebuilt(&mut self) {
        self.tracker.discard_where(|target| {
            matches!(
                target,
                TargetId::SceneDepth
                    | TargetId::NormalMap
                    | TargetId::AmbientMap(_)
                    | TargetId::GBuffer(_)
            )
        });
    }

    /// Records one frame. Returns the number of item draws issued.
    ///
    /// # Errors
    ///
    /// Fails if the recorder fails, or if a pass-constant slot or an
    /// instance buffer the passes need is missing from `frame`.
    pub fn record<R, B>(
        &mut self,
        recorder: &mut R,
        items: &RenderItems,
        frame: &FrameResource<B>,
        extents: &PassExtents,
    ) -> RendererResult<usize>
    where
        R: CommandRecorder,
        B: FrameBackend,
    {
        // Each frame renders into a freshly acquired image.
        self.tracker.discard(TargetId::Backbuffer);

        let mut draws = 0;
        for pass in self.passes.clone() {
            draws += match pass {
                PassKind::Shadow => self.shadow(recorder, items, frame, extents.shadow_map)?,
                PassKind::ReflectionCube => self.reflection_cube(recorder, items, frame, extents.cube)?,
                PassKind::NormalDepth => self.normal_depth(recorder, items, frame, extents.screen)?,
                PassKind::AmbientOcclusion => self.ambient_occlusion(recorder, frame, extents.screen)?,
                PassKind::Geometry => self.geometry(recorder, items, frame, extents.screen)?,
                PassKind::MainColor => self.main_color(recorder, items, frame, extents.screen)?,
                PassKind::Sky => self.sky(recorder, items, frame)?,
                PassKind::Present => {
                    self.transition(recorder, &[(TargetId::Backbuffer, ResourceState::Present)]);
                    0
                }
            };
        }
        Ok(draws)
    }

    fn transition<R: CommandRecorder>(&mut self, recorder: &mut R, requests: &[(TargetId, ResourceState)]) {
        let barriers = self.tracker.require_all(requests);
        if !barriers.is_empty() {
            recorder.transition(&barriers);
        }
    }

    fn shadow<R: CommandRecorder, B: FrameBackend>(
        &mut self,
        recorder: &mut R,
        items: &RenderItems,
        frame: &FrameResource<B>,
        extent: vk::Extent2D,
    ) -> RendererResult<usize> {
        let mut draws = 0;
        for i in 0..self.shadow_slots {
            let target = TargetId::Shadow(i);
            self.transition(recorder, &[(target, ResourceState::DepthWrite)]);

            recorder.begin_pass(&PassBegin::new(extent).depth(target, Some(1.0)))?;
            recorder.bind_pipeline(PipelineKind::Shadow)?;
            bind_slot(recorder, frame, shadow_slot(i))?;
            draws += self
                .drawer
                .draw_layer(recorder, items, RenderLayer::OpaqueShadow, frame)?;
            recorder.end_pass();

            self.transition(recorder, &[(target, ResourceState::ShaderRead)]);
        }
        Ok(draws)
    }

    fn reflection_cube<R: CommandRecorder, B: FrameBackend>(
        &mut self,
        recorder: &mut R,
        items: &RenderItems,
        frame: &FrameResource<B>,
        extent: vk::Extent2D,
    ) -> RendererResult<usize> {
        if !self.dynamic_cube_map {
            return self.clear_static_cube(recorder, extent);
        }

        let mut draws = 0;
        for face in 0..CUBE_FACE_COUNT {
            let target = TargetId::ReflectionCube(face);
            self.transition(
                recorder,
                &[
                    (target, ResourceState::RenderTarget),
                    (TargetId::CubeDepth, ResourceState::DepthWrite),
                ],
            );

            recorder.begin_pass(
                &PassBegin::new(extent)
                    .color(target, Some(CLEAR_COLOR))
                    .depth(TargetId::CubeDepth, Some(1.0)),
            )?;
            bind_slot(recorder, frame, cube_face_slot(face))?;
            recorder.bind_pipeline(PipelineKind::Opaque)?;
            draws += self
                .drawer
                .draw_layer(recorder, items, RenderLayer::OpaqueDynamicCamera, frame)?;
            recorder.bind_pipeline(PipelineKind::Sky)?;
            draws += self
                .drawer
                .draw_layer(recorder, items, RenderLayer::SkyDynamicCamera, frame)?;
            recorder.end_pass();
        }

        let faces: Vec<_> = (0..CUBE_FACE_COUNT)
            .map(|face| (TargetId::ReflectionCube(face), ResourceState::ShaderRead))
            .collect();
        self.transition(recorder, &faces);
        Ok(draws)
    }

    /// Without a dynamic cube map the reflectors still sample the cube, so
    /// its faces are cleared once and then left readable.
    fn clear_static_cube<R: CommandRecorder>(
        &mut self,
        recorder: &mut R,
        extent: vk::Extent2D,
    ) -> RendererResult<usize> {
        for face in 0..CUBE_FACE_COUNT {
            let target = TargetId::ReflectionCube(face);
            if self.tracker.state(target) == ResourceState::ShaderRead {
                continue;
            }
            self.transition(recorder, &[(target, ResourceState::RenderTarget)]);
            recorder.begin_pass(&PassBegin::new(extent).color(target, Some(CLEAR_COLOR)))?;
            recorder.end_pass();
            self.transition(recorder, &[(target, ResourceState::ShaderRead)]);
        }
        Ok(0)
    }

    fn normal_depth<R: CommandRecorder, B: FrameBackend>(
        &mut self,
        recorder: &mut R,
        items: &RenderItems,
        frame: &FrameResource<B>,
        extent: vk::Extent2D,
    ) -> RendererResult<usize> {
        self.transition(
            recorder,
            &[
                (TargetId::NormalMap, ResourceState::RenderTarget),
                (TargetId::SceneDepth, ResourceState::DepthWrite),
            ],
        );

        recorder.begin_pass(
            &PassBegin::new(extent)
                .color(TargetId::NormalMap, Some(NORMAL_MAP_CLEAR))
                .depth(TargetId::SceneDepth, Some(1.0)),
        )?;
        recorder.bind_pipeline(PipelineKind::NormalDepth)?;
        bind_slot(recorder, frame, MAIN_PASS_SLOT)?;
        let draws = self
            .drawer
            .draw_layer(recorder, items, RenderLayer::Opaque, frame)?;
        recorder.end_pass();

        self.transition(recorder, &[(TargetId::NormalMap, ResourceState::ShaderRead)]);
        Ok(draws)
    }

    /// SSAO into ambient map 0, then `blur_count` blur iterations. The
    /// horizontal half reads map 0 into map 1 and the vertical half reads
    /// map 1 back into map 0.
    fn ambient_occlusion<R: CommandRecorder, B: FrameBackend>(
        &mut self,
        recorder: &mut R,
        frame: &FrameResource<B>,
        screen: vk::Extent2D,
    ) -> RendererResult<usize> {
        let extent = ambient_map_extent(screen);

        self.transition(recorder, &[(TargetId::AmbientMap(0), ResourceState::RenderTarget)]);
        recorder.begin_pass(&PassBegin::new(extent).color(TargetId::AmbientMap(0), Some(AMBIENT_CLEAR)))?;
        recorder.bind_pipeline(PipelineKind::Ssao)?;
        bind_slot(recorder, frame, MAIN_PASS_SLOT)?;
        recorder.draw_fullscreen();
        recorder.end_pass();

        for _ in 0..self.blur_count {
            for (horizontal, src, dst) in [(true, 0, 1), (false, 1, 0)] {
                self.transition(
                    recorder,
                    &[
                        (TargetId::AmbientMap(src), ResourceState::ShaderRead),
                        (TargetId::AmbientMap(dst), ResourceState::RenderTarget),
                    ],
                );
                recorder.begin_pass(&PassBegin::new(extent).color(TargetId::AmbientMap(dst), None))?;
                recorder.bind_pipeline(PipelineKind::SsaoBlur)?;
                bind_slot(recorder, frame, MAIN_PASS_SLOT)?;
                recorder.set_blur_direction(horizontal);
                recorder.draw_fullscreen();
                recorder.end_pass();
            }
        }

        self.transition(recorder, &[(TargetId::AmbientMap(0), ResourceState::ShaderRead)]);
        Ok(0)
    }

    fn geometry<R: CommandRecorder, B: FrameBackend>(
        &mut self,
        recorder: &mut R,
        items: &RenderItems,
        frame: &FrameResource<B>,
        extent: vk::Extent2D,
    ) -> RendererResult<usize> {
        let mut requests: Vec<_> = (0..GBUFFER_COUNT)
            .map(|i| (TargetId::GBuffer(i), ResourceState::RenderTarget))
            .collect();
        requests.push((TargetId::SceneDepth, ResourceState::DepthWrite));
        self.transition(recorder, &requests);

        let mut pass = PassBegin::new(extent);
        for i in 0..GBUFFER_COUNT {
            pass = pass.color(TargetId::GBuffer(i), Some(BLACK));
        }
        recorder.begin_pass(&pass.depth(TargetId::SceneDepth, Some(1.0)))?;
        recorder.bind_pipeline(PipelineKind::GBuffer)?;
        bind_slot(recorder, frame, MAIN_PASS_SLOT)?;
        let draws = self
            .drawer
            .draw_layer(recorder, items, RenderLayer::Opaque, frame)?;
        recorder.end_pass();

        let reads: Vec<_> = (0..GBUFFER_COUNT)
            .map(|i| (TargetId::GBuffer(i), ResourceState::ShaderRead))
            .collect();
        self.transition(recorder, &reads);
        Ok(draws)
    }

    /// Opens the backbuffer pass that [`sky`](Self::sky) closes.
    ///
    /// The deferred composite keeps the depth the geometry pass wrote so the
    /// reflectors and the sky that follow are depth tested against the
    /// scene. The forward path clears it and draws the opaque layer itself.
    fn main_color<R: CommandRecorder, B: FrameBackend>(
        &mut self,
        recorder: &mut R,
        items: &RenderItems,
        frame: &FrameResource<B>,
        extent: vk::Extent2D,
    ) -> RendererResult<usize> {
        self.transition(
            recorder,
            &[
                (TargetId::Backbuffer, ResourceState::RenderTarget),
                (TargetId::SceneDepth, ResourceState::DepthWrite),
            ],
        );

        let depth_clear = if self.deferred { None } else { Some(1.0) };
        recorder.begin_pass(
            &PassBegin::new(extent)
                .color(TargetId::Backbuffer, Some(CLEAR_COLOR))
                .depth(TargetId::SceneDepth, depth_clear),
        )?;
        bind_slot(recorder, frame, MAIN_PASS_SLOT)?;

        let mut draws = 0;
        if self.deferred {
            recorder.bind_pipeline(PipelineKind::DeferredShading)?;
            recorder.draw_fullscreen();
        } else {
            recorder.bind_pipeline(PipelineKind::Opaque)?;
            draws += self
                .drawer
                .draw_layer(recorder, items, RenderLayer::Opaque, frame)?;
        }

        recorder.bind_pipeline(PipelineKind::Opaque)?;
        draws += self
            .drawer
            .draw_layer(recorder, items, RenderLayer::OpaqueDynamicReflectors, frame)?;

        if self.show_shadow_debug {
            recorder.bind_pipeline(PipelineKind::ShadowDebug)?;
            draws += self
                .drawer
                .draw_layer(recorder, items, RenderLayer::Debug, frame)?;
        }
        Ok(draws)
    }

    fn sky<R: CommandRecorder, B: FrameBackend>(
        &mut self,
        recorder: &mut R,
        items: &RenderItems,
        frame: &FrameResource<B>,
    ) -> RendererResult<usize> {
        recorder.bind_pipeline(PipelineKind::Sky)?;
        let draws = self
            .drawer
            .draw_layer(recorder, items, RenderLayer::Sky, frame)?;
        recorder.end_pass();
        Ok(draws)
    }
}

fn bind_slot<R: CommandRecorder, B: FrameBackend>(
    recorder: &mut R,
    frame: &FrameResource<B>,
    slot: usize,
) -> RendererResult<()> {
    check_pass_slot(slot, frame.pass_constants.len())?;
    recorder.bind_pass_constants(slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_resource::{FrameLayout, HostBackend};
    use crate::recorder::{Command, CommandLog};
    use crate::render_item::{InstanceRecord, RenderItem};
    use crate::state_tracker::Barrier;
    use glam::{Mat4, Vec3};
    use prism_core::ShadingPath;
    use prism_resources::SubmeshGeometry;
    use prism_scene::Aabb;

    fn items() -> RenderItems {
        let submesh = SubmeshGeometry {
            index_count: 6,
            start_index: 0,
            base_vertex: 0,
            bounds: Aabb::new(Vec3::splat(-1.0), Vec3::ONE),
        };
        let item = |count: usize| {
            let mut item = RenderItem::new(0, &submesh, 0)
                .with_instances((0..count).map(|_| InstanceRecord::new(Mat4::IDENTITY, 0)));
            item.visible_instance_count = count as u32;
            item
        };
        let mut items = RenderItems::new();
        items.push(item(2), &[RenderLayer::Opaque, RenderLayer::OpaqueShadow]);
        items.push(item(1), &[RenderLayer::OpaqueDynamicReflectors]);
        items.push(item(1), &[RenderLayer::Sky]);
        items.push(item(1), &[RenderLayer::Debug]);
        items.end_scene_items();
        items.push(item(2), &[RenderLayer::OpaqueDynamicCamera]);
        items.push(item(1), &[RenderLayer::SkyDynamicCamera]);
        items
    }

    fn frame(items: &RenderItems, shadow_slots: usize) -> FrameResource<HostBackend> {
        FrameResource::new(
            &HostBackend::new(),
            &FrameLayout {
                pass_count: pass_slot_count(shadow_slots),
                material_count: 1,
                instance_counts: items.instance_counts(),
            },
        )
        .unwrap()
    }

    fn extents(config: &RenderConfig) -> PassExtents {
        PassExtents::new(vk::Extent2D { width: 800, height: 600 }, config)
    }

    fn position(log: &CommandLog, wanted: &Command) -> usize {
        log.commands()
            .iter()
            .position(|c| c == wanted)
            .unwrap_or_else(|| panic!("{wanted:?} not recorded"))
    }

    fn barrier(target: TargetId, from: ResourceState, to: ResourceState) -> Command {
        Command::Barrier(Barrier { target, from, to })
    }

    #[test]
    fn test_slot_layout() {
        assert_eq!(MAIN_PASS_SLOT, 0);
        assert_eq!(cube_face_slot(0), 1);
        assert_eq!(cube_face_slot(5), 6);
        assert_eq!(shadow_slot(0), 7);
        assert_eq!(pass_slot_count(4), 11);
    }

    #[test]
    fn test_pass_order_follows_config() {
        let deferred = PassSequencer::new(&RenderConfig::default(), 4);
        assert_eq!(
            deferred.passes(),
            &[
                PassKind::Shadow,
                PassKind::ReflectionCube,
                PassKind::NormalDepth,
                PassKind::AmbientOcclusion,
                PassKind::Geometry,
                PassKind::MainColor,
                PassKind::Sky,
                PassKind::Present,
            ]
        );

        let forward = PassSequencer::new(
            &RenderConfig {
                shading: ShadingPath::Forward,
                ssao: false,
                ..Default::default()
            },
            4,
        );
        assert_eq!(
            forward.passes(),
            &[
                PassKind::Shadow,
                PassKind::ReflectionCube,
                PassKind::MainColor,
                PassKind::Sky,
                PassKind::Present,
            ]
        );
    }

    #[test]
    fn test_passes_run_in_order() {
        let config = RenderConfig::default();
        let items = items();
        let frame = frame(&items, 2);
        let mut sequencer = PassSequencer::new(&config, 2);
        let mut log = CommandLog::new([0]);
        sequencer.record(&mut log, &items, &frame, &extents(&config)).unwrap();

        assert_eq!(
            log.pipelines(),
            vec![
                PipelineKind::Shadow,
                PipelineKind::Shadow,
                PipelineKind::Opaque,
                PipelineKind::Sky,
                PipelineKind::Opaque,
                PipelineKind::Sky,
                PipelineKind::Opaque,
                PipelineKind::Sky,
                PipelineKind::Opaque,
                PipelineKind::Sky,
                PipelineKind::Opaque,
                PipelineKind::Sky,
                PipelineKind::Opaque,
                PipelineKind::Sky,
                PipelineKind::NormalDepth,
                PipelineKind::Ssao,
                PipelineKind::SsaoBlur,
                PipelineKind::SsaoBlur,
                PipelineKind::SsaoBlur,
                PipelineKind::SsaoBlur,
                PipelineKind::SsaoBlur,
                PipelineKind::SsaoBlur,
                PipelineKind::GBuffer,
                PipelineKind::DeferredShading,
                PipelineKind::Opaque,
                PipelineKind::Sky,
            ]
        );

        let commands = log.commands();
        assert_eq!(
            commands.last(),
            Some(&barrier(
                TargetId::Backbuffer,
                ResourceState::RenderTarget,
                ResourceState::Present
            ))
        );
    }

    #[test]
    fn test_shadow_maps_are_written_then_read() {
        let config = RenderConfig::default();
        let items = items();
        let frame = frame(&items, 1);
        let mut sequencer = PassSequencer::new(&config, 1);
        let mut log = CommandLog::new([0]);
        sequencer.record(&mut log, &items, &frame, &extents(&config)).unwrap();

        let to_write = position(
            &log,
            &barrier(TargetId::Shadow(0), ResourceState::Undefined, ResourceState::DepthWrite),
        );
        let slot = position(&log, &Command::BindPassConstants(shadow_slot(0)));
        let to_read = position(
            &log,
            &barrier(TargetId::Shadow(0), ResourceState::DepthWrite, ResourceState::ShaderRead),
        );
        let composite = position(&log, &Command::BindPipeline(PipelineKind::DeferredShading));
        assert!(to_write < slot && slot < to_read && to_read < composite);

        // The second frame starts from the state the first one left.
        log.clear();
        sequencer.record(&mut log, &items, &frame, &extents(&config)).unwrap();
        position(
            &log,
            &barrier(TargetId::Shadow(0), ResourceState::ShaderRead, ResourceState::DepthWrite),
        );
    }

    #[test]
    fn test_cube_faces_use_their_slots() {
        let config = RenderConfig {
            shading: ShadingPath::Forward,
            ssao: false,
            ..Default::default()
        };
        let items = items();
        let frame = frame(&items, 0);
        let mut sequencer = PassSequencer::new(&config, 0);
        let mut log = CommandLog::new([0]);
        sequencer.record(&mut log, &items, &frame, &extents(&config)).unwrap();

        let slots: Vec<usize> = log
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::BindPassConstants(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(slots, vec![1, 2, 3, 4, 5, 6, MAIN_PASS_SLOT]);

        let last_face = position(&log, &Command::BindPassConstants(cube_face_slot(5)));
        for face in 0..CUBE_FACE_COUNT {
            let read = position(
                &log,
                &barrier(
                    TargetId::ReflectionCube(face),
                    ResourceState::RenderTarget,
                    ResourceState::ShaderRead,
                ),
            );
            assert!(read > last_face);
        }
    }

    #[test]
    fn test_static_cube_is_cleared_once() {
        let config = RenderConfig {
            dynamic_cube_map: false,
            shading: ShadingPath::Forward,
            ssao: false,
            ..Default::default()
        };
        let items = items();
        let frame = frame(&items, 0);
        let mut sequencer = PassSequencer::new(&config, 0);
        let mut log = CommandLog::new([0]);

        sequencer.record(&mut log, &items, &frame, &extents(&config)).unwrap();
        let first = log.barriers().len();
        assert_eq!(
            log.pipelines(),
            vec![PipelineKind::Opaque, PipelineKind::Opaque, PipelineKind::Sky]
        );

        log.clear();
        sequencer.record(&mut log, &items, &frame, &extents(&config)).unwrap();
        assert!(log.barriers().len() < first);
        assert!(log
            .barriers()
            .iter()
            .all(|b| !matches!(b.target, TargetId::ReflectionCube(_))));
    }

    #[test]
    fn test_blur_ping_pongs_between_ambient_maps() {
        let config = RenderConfig {
            ssao_blur_count: 1,
            shading: ShadingPath::Forward,
            ..Default::default()
        };
        let items = items();
        let frame = frame(&items, 0);
        let mut sequencer = PassSequencer::new(&config, 0);
        let mut log = CommandLog::new([0]);
        sequencer.record(&mut log, &items, &frame, &extents(&config)).unwrap();

        let directions: Vec<bool> = log
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::BlurDirection { horizontal } => Some(*horizontal),
                _ => None,
            })
            .collect();
        assert_eq!(directions, vec![true, false]);

        let half = vk::Extent2D { width: 400, height: 300 };
        let ambient_passes = log
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BeginPass(pass) if pass.extent == half))
            .count();
        assert_eq!(ambient_passes, 3);

        position(
            &log,
            &barrier(TargetId::AmbientMap(0), ResourceState::RenderTarget, ResourceState::ShaderRead),
        );
    }

    #[test]
    fn test_forward_main_pass_clears_depth_and_deferred_keeps_it() {
        let items = items();
        for (shading, clear) in [(ShadingPath::Forward, Some(1.0)), (ShadingPath::Deferred, None)] {
            let config = RenderConfig {
                shading,
                ..Default::default()
            };
            let frame = frame(&items, 0);
            let mut sequencer = PassSequencer::new(&config, 0);
            let mut log = CommandLog::new([0]);
            sequencer.record(&mut log, &items, &frame, &extents(&config)).unwrap();

            let main = log
                .commands()
                .iter()
                .find_map(|c| match c {
                    Command::BeginPass(pass)
                        if pass.colors.first().map(|c| c.id) == Some(TargetId::Backbuffer) =>
                    {
                        Some(pass.clone())
                    }
                    _ => None,
                })
                .unwrap();
            assert_eq!(main.depth.unwrap().clear, clear, "{shading:?}");
            assert_eq!(main.colors[0].clear, Some(CLEAR_COLOR));
        }
    }

    #[test]
    fn test_reflectors_and_debug_quad_are_drawn() {
        let config = RenderConfig {
            show_shadow_debug: true,
            ..Default::default()
        };
        let items = items();
        let frame = frame(&items, 0);
        let mut sequencer = PassSequencer::new(&config, 0);
        let mut log = CommandLog::new([0]);
        let draws = sequencer.record(&mut log, &items, &frame, &extents(&config)).unwrap();

        // 6 faces x 2 cube items, normal-depth, G-buffer, reflector, debug, sky.
        assert_eq!(draws, 12 + 1 + 1 + 1 + 1 + 1);
        let pipelines = log.pipelines();
        let debug = pipelines
            .iter()
            .position(|&k| k == PipelineKind::ShadowDebug)
            .unwrap();
        assert_eq!(pipelines[debug + 1], PipelineKind::Sky);
    }

    #[test]
    fn test_resize_forgets_screen_targets_only() {
        let config = RenderConfig::default();
        let items = items();
        let frame = frame(&items, 1);
        let mut sequencer = PassSequencer::new(&config, 1);
        let mut log = CommandLog::new([0]);
        sequencer.record(&mut log, &items, &frame, &extents(&config)).unwrap();

        sequencer.on_targets_rebuilt();
        let tracker = sequencer.tracker();
        assert_eq!(tracker.state(TargetId::GBuffer(0)), ResourceState::Undefined);
        assert_eq!(tracker.state(TargetId::SceneDepth), ResourceState::Undefined);
        assert_eq!(tracker.state(TargetId::AmbientMap(0)), ResourceState::Undefined);
        assert_eq!(tracker.state(TargetId::Shadow(0)), ResourceState::ShaderRead);
        assert_eq!(tracker.state(TargetId::ReflectionCube(0)), ResourceState::ShaderRead);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "pass constant slot"))]
    fn test_missing_shadow_slot_is_an_error() {
        let config = RenderConfig::default();
        let items = items();
        // Sized for one shadow slot but asked to record two.
        let frame = frame(&items, 1);
        let mut sequencer = PassSequencer::new(&config, 2);
        let mut log = CommandLog::new([0]);
        assert!(sequencer.record(&mut log, &items, &frame, &extents(&config)).is_err());
    }
}
