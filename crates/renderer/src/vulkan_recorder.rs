//! [`CommandRecorder`] over a Vulkan command buffer.
//!
//! Target ids resolve through [`VulkanTargets`]; resource states map to
//! image layouts plus synchronization2 stage and access masks.

use std::sync::Arc;

use ash::vk;
use prism_resources::MeshGeometry;
use prism_rhi::buffer::{Buffer, BufferUsage};
use prism_rhi::command::CommandBuffer;
use prism_rhi::device::Device;
use prism_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
use prism_rhi::RhiError;
use tracing::debug;

use crate::error::{RendererError, RendererResult};
use crate::gpu_types::DrawPushConstants;
use crate::pipelines::{PipelineKind, PipelineSet};
use crate::recorder::{CommandRecorder, PassBegin};
use crate::render_item::GeometryId;
use crate::state_tracker::{Barrier, ResourceState, TargetId};
use crate::vulkan_targets::{TargetView, VulkanTargets};

/// Vertices generated by the full-screen vertex shader.
pub const FULLSCREEN_VERTEX_COUNT: u32 = 6;

const PUSH_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw());

/// Layout, stages and accesses of a target in one state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateScope {
    pub layout: vk::ImageLayout,
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

/// How a target in `state` is accessed. `depth` selects the depth variant
/// of states that differ between color and depth images.
pub fn state_scope(state: ResourceState, depth: bool) -> StateScope {
    let attachment_stage = if depth {
        vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
    } else {
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
    };
    match state {
        // Waiting on the attachment stage chains the first transition of the
        // backbuffer after the acquire semaphore.
        ResourceState::Undefined => StateScope {
            layout: vk::ImageLayout::UNDEFINED,
            stage: attachment_stage,
            access: vk::AccessFlags2::NONE,
        },
        ResourceState::RenderTarget => StateScope {
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            access: vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        },
        ResourceState::DepthWrite => StateScope {
            layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            stage: vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        },
        ResourceState::ShaderRead => StateScope {
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
            access: vk::AccessFlags2::SHADER_SAMPLED_READ,
        },
        ResourceState::Present => StateScope {
            layout: vk::ImageLayout::PRESENT_SRC_KHR,
            stage: vk::PipelineStageFlags2::NONE,
            access: vk::AccessFlags2::NONE,
        },
    }
}

/// The image barrier for `barrier` on `view`.
pub fn image_barrier(barrier: &Barrier, view: &TargetView) -> vk::ImageMemoryBarrier2<'static> {
    let depth = view.range.aspect_mask.contains(vk::ImageAspectFlags::DEPTH);
    let src = state_scope(barrier.from, depth);
    let dst = state_scope(barrier.to, depth);
    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(src.stage)
        .src_access_mask(src.access)
        .dst_stage_mask(dst.stage)
        .dst_access_mask(dst.access)
        .old_layout(src.layout)
        .new_layout(dst.layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(view.image)
        .subresource_range(view.range)
}

/// Vertex and index buffers of one mesh geometry.
pub struct GpuGeometry {
    pub name: String,
    pub vertices: Buffer,
    pub indices: Buffer,
}

/// GPU copies of the scene's geometries, indexed by [`GeometryId`].
pub struct GeometryBuffers {
    geometries: Vec<GpuGeometry>,
}

impl GeometryBuffers {
    pub fn new(device: Arc<Device>, geometries: &[MeshGeometry]) -> RendererResult<Self> {
        let geometries = geometries
            .iter()
            .map(|geometry| {
                let vertices = Buffer::new_with_data(
                    device.clone(),
                    BufferUsage::Vertex,
                    bytemuck::cast_slice(geometry.vertices()),
                )?;
                let indices = Buffer::new_with_data(
                    device.clone(),
                    BufferUsage::Index,
                    bytemuck::cast_slice(geometry.indices()),
                )?;
                debug!(
                    "Uploaded geometry '{}': {} vertices, {} indices",
                    geometry.name(),
                    geometry.vertices().len(),
                    geometry.indices().len()
                );
                Ok(GpuGeometry {
                    name: geometry.name().to_string(),
                    vertices,
                    indices,
                })
            })
            .collect::<RendererResult<Vec<_>>>()?;
        Ok(Self { geometries })
    }

    pub fn get(&self, id: GeometryId) -> Option<&GpuGeometry> {
        self.geometries.get(id)
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }
}

/// Everything a recorder resolves ids against for one frame.
pub struct FrameBindings<'a> {
    pub targets: &'a VulkanTargets,
    pub pipelines: &'a PipelineSet,
    pub geometries: &'a GeometryBuffers,
    /// The acquired swapchain image.
    pub backbuffer: TargetView,
    /// Set 0 of the current ring slot.
    pub frame_set: vk::DescriptorSet,
    /// Byte distance between pass-constant slots.
    pub pass_stride: u64,
}

/// Encodes one frame into a primary command buffer.
///
/// Barrier failures cannot be reported through [`CommandRecorder::transition`],
/// so the first one is kept and returned by [`finish`](Self::finish).
pub struct VulkanRecorder<'a> {
    cmd: &'a CommandBuffer,
    bindings: FrameBindings<'a>,
    push: DrawPushConstants,
    error: Option<RendererError>,
}

impl<'a> VulkanRecorder<'a> {
    /// Begins `cmd` and orders it after every earlier submission's writes.
    pub fn begin(cmd: &'a CommandBuffer, bindings: FrameBindings<'a>) -> RendererResult<Self> {
        cmd.begin()?;
        cmd.memory_barrier(
            vk::MemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
                .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
                .dst_access_mask(vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE),
        );
        Ok(Self {
            cmd,
            bindings,
            push: DrawPushConstants::default(),
            error: None,
        })
    }

    /// Ends the command buffer.
    ///
    /// # Errors
    ///
    /// Returns the first error hit while recording, or the end failure.
    pub fn finish(self) -> RendererResult<()> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(self.cmd.end()?)
    }

    fn resolve(&self, id: TargetId) -> RendererResult<TargetView> {
        match id {
            TargetId::Backbuffer => Ok(self.bindings.backbuffer),
            _ => self.bindings.targets.resolve(id),
        }
    }

    fn push_constants(&self) {
        self.cmd.push_constants(
            self.bindings.pipelines.layout().handle(),
            PUSH_STAGES,
            0,
            &self.push,
        );
    }
}

impl CommandRecorder for VulkanRecorder<'_> {
    fn transition(&mut self, barriers: &[Barrier]) {
        let mut image_barriers = Vec::with_capacity(barriers.len());
        for barrier in barriers {
            match self.resolve(barrier.target) {
                Ok(view) => image_barriers.push(image_barrier(barrier, &view)),
                Err(e) => {
                    self.error.get_or_insert(e);
                }
            }
        }
        self.cmd.image_barriers(&image_barriers);
    }

    fn begin_pass(&mut self, pass: &PassBegin) -> RendererResult<()> {
        let mut config = RenderingConfig::new(pass.extent);
        for color in &pass.colors {
            let view = self.resolve(color.id)?;
            let attachment = ColorAttachment::new(view.view);
            config = config.with_color_attachment(match color.clear {
                Some(clear) => attachment.with_clear_color(clear),
                None => attachment.load(),
            });
        }
        if let Some(depth) = &pass.depth {
            let view = self.resolve(depth.id)?;
            let attachment = DepthAttachment::new(view.view);
            config = config.with_depth_attachment(match depth.clear {
                Some(clear) => attachment.with_clear_depth(clear),
                None => attachment.load(),
            });
        }

        let bundle = config.build();
        self.cmd.begin_rendering(&bundle.info());
        self.cmd.set_viewport_and_scissor(pass.extent);
        Ok(())
    }

    fn end_pass(&mut self) {
        self.cmd.end_rendering();
    }

    fn bind_pipeline(&mut self, kind: PipelineKind) -> RendererResult<()> {
        let pipeline = self.bindings.pipelines.get(kind)?;
        self.cmd.bind_pipeline(pipeline.handle());
        Ok(())
    }

    fn bind_pass_constants(&mut self, slot: usize) -> RendererResult<()> {
        let offset = u32::try_from(slot as u64 * self.bindings.pass_stride).map_err(|_| {
            RhiError::OutOfBounds(format!("dynamic offset of pass constant slot {slot}"))
        })?;
        self.cmd.bind_descriptor_sets(
            self.bindings.pipelines.layout().handle(),
            0,
            &[self.bindings.frame_set, self.bindings.targets.environment_set()],
            &[offset],
        );
        Ok(())
    }

    fn bind_geometry(&mut self, geometry: GeometryId) -> bool {
        let Some(buffers) = self.bindings.geometries.get(geometry) else {
            return false;
        };
        self.cmd.bind_vertex_buffer(buffers.vertices.handle(), 0);
        self.cmd.bind_index_buffer(buffers.indices.handle(), vk::IndexType::UINT32);
        true
    }

    fn set_topology(&mut self, topology: vk::PrimitiveTopology) {
        self.cmd.set_primitive_topology(topology);
    }

    fn bind_instances(&mut self, address: u64) {
        self.push.instance_address = address;
    }

    fn set_blur_direction(&mut self, horizontal: bool) {
        self.push.blur_horizontal = u32::from(horizontal);
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32, start_index: u32, base_vertex: i32) {
        self.push_constants();
        self.cmd
            .draw_indexed(index_count, instance_count, start_index, base_vertex);
    }

    fn draw_fullscreen(&mut self) {
        self.cmd
            .set_primitive_topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        self.push_constants();
        self.cmd.draw(FULLSCREEN_VERTEX_COUNT, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_rhi::image::subresource_range;

    fn view(aspect: vk::ImageAspectFlags) -> TargetView {
        TargetView {
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            range: subresource_range(aspect, 2, 1),
        }
    }

    #[test]
    fn test_render_target_to_shader_read() {
        let barrier = image_barrier(
            &Barrier {
                target: TargetId::NormalMap,
                from: ResourceState::RenderTarget,
                to: ResourceState::ShaderRead,
            },
            &view(vk::ImageAspectFlags::COLOR),
        );
        assert_eq!(barrier.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::SHADER_SAMPLED_READ);
    }

    #[test]
    fn test_undefined_depth_waits_on_fragment_tests() {
        let barrier = image_barrier(
            &Barrier {
                target: TargetId::Shadow(0),
                from: ResourceState::Undefined,
                to: ResourceState::DepthWrite,
            },
            &view(vk::ImageAspectFlags::DEPTH),
        );
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert!(barrier
            .src_stage_mask
            .contains(vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS));
        assert_eq!(barrier.new_layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_cube_face_barrier_covers_one_layer() {
        let barrier = image_barrier(
            &Barrier {
                target: TargetId::ReflectionCube(2),
                from: ResourceState::ShaderRead,
                to: ResourceState::RenderTarget,
            },
            &view(vk::ImageAspectFlags::COLOR),
        );
        assert_eq!(barrier.subresource_range.base_array_layer, 2);
        assert_eq!(barrier.subresource_range.layer_count, 1);
    }

    #[test]
    fn test_present_has_no_destination_access() {
        let scope = state_scope(ResourceState::Present, false);
        assert_eq!(scope.layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(scope.access, vk::AccessFlags2::NONE);
    }
}
