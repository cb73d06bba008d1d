//! The command-encoding seam.
//!
//! Passes and the draw loop speak to a [`CommandRecorder`] in terms of
//! render targets, pipeline kinds and geometry ids. The Vulkan recorder
//! resolves those to handles; [`CommandLog`] just writes them down.

use std::collections::HashSet;

use ash::vk;

use crate::error::RendererResult;
use crate::pipelines::PipelineKind;
use crate::render_item::GeometryId;
use crate::state_tracker::{Barrier, TargetId};

/// A color target and its clear value (`None` loads the contents).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorTarget {
    pub id: TargetId,
    pub clear: Option<[f32; 4]>,
}

/// A depth target and its clear depth (`None` loads the contents).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthTarget {
    pub id: TargetId,
    pub clear: Option<f32>,
}

/// Attachments of one render pass.
#[derive(Clone, Debug, PartialEq)]
pub struct PassBegin {
    pub colors: Vec<ColorTarget>,
    pub depth: Option<DepthTarget>,
    pub extent: vk::Extent2D,
}

impl PassBegin {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            colors: Vec::new(),
            depth: None,
            extent,
        }
    }

    pub fn color(mut self, id: TargetId, clear: Option<[f32; 4]>) -> Self {
        self.colors.push(ColorTarget { id, clear });
        self
    }

    pub fn depth(mut self, id: TargetId, clear: Option<f32>) -> Self {
        self.depth = Some(DepthTarget { id, clear });
        self
    }
}

/// Records GPU commands for one frame.
pub trait CommandRecorder {
    fn transition(&mut self, barriers: &[Barrier]);

    /// Begins rendering into the given attachments and sets a full-extent
    /// viewport.
    fn begin_pass(&mut self, pass: &PassBegin) -> RendererResult<()>;

    fn end_pass(&mut self);

    fn bind_pipeline(&mut self, kind: PipelineKind) -> RendererResult<()>;

    /// Binds pass-constant slot `slot` of the current frame resource.
    fn bind_pass_constants(&mut self, slot: usize) -> RendererResult<()>;

    /// Binds the vertex and index buffers of `geometry`. Returns `false` if
    /// the geometry does not exist.
    fn bind_geometry(&mut self, geometry: GeometryId) -> bool;

    fn set_topology(&mut self, topology: vk::PrimitiveTopology);

    /// Makes the instance buffer at `address` visible to the next draws.
    fn bind_instances(&mut self, address: u64);

    /// Selects the blur direction of the next full-screen blur.
    fn set_blur_direction(&mut self, horizontal: bool);

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32, start_index: u32, base_vertex: i32);

    /// Draws a full-screen quad generated in the vertex shader.
    fn draw_fullscreen(&mut self);
}

/// One recorded command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Barrier(Barrier),
    BeginPass(PassBegin),
    EndPass,
    BindPipeline(PipelineKind),
    BindPassConstants(usize),
    BindGeometry(GeometryId),
    SetTopology(vk::PrimitiveTopology),
    BindInstances(u64),
    BlurDirection { horizontal: bool },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
    },
    DrawFullscreen,
}

/// Recorder that logs commands instead of encoding them.
#[derive(Debug, Default)]
pub struct CommandLog {
    commands: Vec<Command>,
    geometries: HashSet<GeometryId>,
}

impl CommandLog {
    /// A log that accepts the given geometry ids as bindable.
    pub fn new(geometries: impl IntoIterator<Item = GeometryId>) -> Self {
        Self {
            commands: Vec::new(),
            geometries: geometries.into_iter().collect(),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Recorded barriers, in order.
    pub fn barriers(&self) -> Vec<Barrier> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Barrier(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    /// Instance counts of every indexed draw, in order.
    pub fn draw_instance_counts(&self) -> Vec<u32> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndexed { instance_count, .. } => Some(*instance_count),
                _ => None,
            })
            .collect()
    }

    /// Pipelines bound, in order.
    pub fn pipelines(&self) -> Vec<PipelineKind> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::BindPipeline(kind) => Some(*kind),
                _ => None,
            })
            .collect()
    }
}

impl CommandRecorder for CommandLog {
    fn transition(&mut self, barriers: &[Barrier]) {
        self.commands
            .extend(barriers.iter().copied().map(Command::Barrier));
    }

    fn begin_pass(&mut self, pass: &PassBegin) -> RendererResult<()> {
        self.commands.push(Command::BeginPass(pass.clone()));
        Ok(())
    }

    fn end_pass(&mut self) {
        self.commands.push(Command::EndPass);
    }

    fn bind_pipeline(&mut self, kind: PipelineKind) -> RendererResult<()> {
        self.commands.push(Command::BindPipeline(kind));
        Ok(())
    }

    fn bind_pass_constants(&mut self, slot: usize) -> RendererResult<()> {
        self.commands.push(Command::BindPassConstants(slot));
        Ok(())
    }

    fn bind_geometry(&mut self, geometry: GeometryId) -> bool {
        if !self.geometries.contains(&geometry) {
            return false;
        }
        self.commands.push(Command::BindGeometry(geometry));
        true
    }

    fn set_topology(&mut self, topology: vk::PrimitiveTopology) {
        self.commands.push(Command::SetTopology(topology));
    }

    fn bind_instances(&mut self, address: u64) {
        self.commands.push(Command::BindInstances(address));
    }

    fn set_blur_direction(&mut self, horizontal: bool) {
        self.commands.push(Command::BlurDirection { horizontal });
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32, start_index: u32, base_vertex: i32) {
        self.commands.push(Command::DrawIndexed {
            index_count,
            instance_count,
            start_index,
            base_vertex,
        });
    }

    fn draw_fullscreen(&mut self) {
        self.commands.push(Command::DrawFullscreen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_tracker::ResourceState;

    #[test]
    fn test_unknown_geometry_is_not_bound() {
        let mut log = CommandLog::new([0, 2]);
        assert!(log.bind_geometry(2));
        assert!(!log.bind_geometry(1));
        assert_eq!(log.commands(), &[Command::BindGeometry(2)]);
    }

    #[test]
    fn test_log_helpers() {
        let mut log = CommandLog::new([]);
        log.transition(&[Barrier {
            target: TargetId::NormalMap,
            from: ResourceState::Undefined,
            to: ResourceState::RenderTarget,
        }]);
        log.bind_pipeline(PipelineKind::NormalDepth).unwrap();
        log.draw_indexed(36, 4, 0, 0);
        log.draw_indexed(6, 0, 36, 24);

        assert_eq!(log.barriers().len(), 1);
        assert_eq!(log.pipelines(), vec![PipelineKind::NormalDepth]);
        assert_eq!(log.draw_instance_counts(), vec![4, 0]);
    }

    #[test]
    fn test_pass_begin_builder() {
        let extent = vk::Extent2D { width: 64, height: 32 };
        let pass = PassBegin::new(extent)
            .color(TargetId::Backbuffer, Some([0.0; 4]))
            .depth(TargetId::SceneDepth, None);
        assert_eq!(pass.colors.len(), 1);
        assert_eq!(pass.depth.unwrap().clear, None);
    }
}
