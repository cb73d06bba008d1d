//! Graphics pipelines of the frame pipeline.
//!
//! Each [`PipelineKind`] names a SPIR-V pair `shaders/spirv/{name}.vert.spv`
//! and `{name}.frag.spv` plus the fixed-function state the pass needs. All
//! pipelines share one layout: set 0 holds the per-frame buffers, set 1 the
//! textures and render targets, and a 16-byte push constant carries the
//! instance buffer address.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use prism_core::RenderConfig;
use prism_rhi::device::Device;
use prism_rhi::image::DEPTH_FORMAT;
use prism_rhi::pipeline::{DepthBias, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use prism_rhi::shader::{Shader, ShaderStage};
use prism_rhi::vertex::Vertex;
use tracing::{debug, info};

use crate::error::{RendererError, RendererResult};
use crate::targets::{AMBIENT_MAP_FORMAT, GBUFFER_FORMATS, NORMAL_MAP_FORMAT};

/// Directory holding the compiled shaders.
pub const SHADER_DIR: &str = "shaders/spirv";

/// Selects a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Forward-lit opaque geometry; also used for cube faces and reflectors.
    Opaque,
    /// Opaque geometry into the G-buffer.
    GBuffer,
    /// Full-screen lighting composite over the G-buffer.
    DeferredShading,
    Sky,
    /// Depth-only shadow casters.
    Shadow,
    /// View-space normals and depth.
    NormalDepth,
    /// Full-screen ambient occlusion.
    Ssao,
    /// Separable bilateral blur of the ambient map.
    SsaoBlur,
    /// Shadow map preview quad.
    ShadowDebug,
}

/// What a pipeline renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorTargets {
    None,
    /// The backbuffer (and the reflection cube, which shares its format).
    Backbuffer,
    GBuffer,
    NormalMap,
    AmbientMap,
}

/// Fixed-function state of one pipeline kind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineDesc {
    pub shader: &'static str,
    /// Draws indexed meshes (as opposed to a full-screen triangle pair).
    pub mesh_input: bool,
    pub fragment: bool,
    pub colors: ColorTargets,
    pub depth: bool,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: vk::CompareOp,
    pub cull: vk::CullModeFlags,
    pub depth_bias: Option<DepthBias>,
}

/// Slope-scaled bias keeping lit surfaces from shadowing themselves.
pub const SHADOW_DEPTH_BIAS: DepthBias = DepthBias {
    constant_factor: 1.25,
    clamp: 0.0,
    slope_factor: 1.75,
};

impl PipelineKind {
    pub const ALL: [PipelineKind; 9] = [
        PipelineKind::Opaque,
        PipelineKind::GBuffer,
        PipelineKind::DeferredShading,
        PipelineKind::Sky,
        PipelineKind::Shadow,
        PipelineKind::NormalDepth,
        PipelineKind::Ssao,
        PipelineKind::SsaoBlur,
        PipelineKind::ShadowDebug,
    ];

    /// Base name of the shader files.
    pub fn shader_name(self) -> &'static str {
        self.desc().shader
    }

    pub fn desc(self) -> PipelineDesc {
        let mesh = PipelineDesc {
            shader: "",
            mesh_input: true,
            fragment: true,
            colors: ColorTargets::Backbuffer,
            depth: true,
            depth_test: true,
            depth_write: true,
            depth_compare: vk::CompareOp::LESS,
            cull: vk::CullModeFlags::BACK,
            depth_bias: None,
        };
        let fullscreen = PipelineDesc {
            mesh_input: false,
            depth: false,
            depth_test: false,
            depth_write: false,
            cull: vk::CullModeFlags::NONE,
            ..mesh
        };

        match self {
            PipelineKind::Opaque => PipelineDesc {
                shader: "opaque",
                ..mesh
            },
            PipelineKind::GBuffer => PipelineDesc {
                shader: "g_buffer",
                colors: ColorTargets::GBuffer,
                ..mesh
            },
            // Composites into the backbuffer while scene depth stays bound
            // for the reflector and sky draws that follow.
            PipelineKind::DeferredShading => PipelineDesc {
                shader: "deferred_shading",
                depth: true,
                ..fullscreen
            },
            PipelineKind::Sky => PipelineDesc {
                shader: "sky",
                depth_compare: vk::CompareOp::LESS_OR_EQUAL,
                cull: vk::CullModeFlags::NONE,
                ..mesh
            },
            PipelineKind::Shadow => PipelineDesc {
                shader: "shadow",
                colors: ColorTargets::None,
                depth_bias: Some(SHADOW_DEPTH_BIAS),
                ..mesh
            },
            PipelineKind::NormalDepth => PipelineDesc {
                shader: "normal_depth",
                colors: ColorTargets::NormalMap,
                ..mesh
            },
            PipelineKind::Ssao => PipelineDesc {
                shader: "ssao",
                colors: ColorTargets::AmbientMap,
                ..fullscreen
            },
            PipelineKind::SsaoBlur => PipelineDesc {
                shader: "ssao_blur",
                colors: ColorTargets::AmbientMap,
                ..fullscreen
            },
            PipelineKind::ShadowDebug => PipelineDesc {
                shader: "shadow_debug",
                ..mesh
            },
        }
    }

    /// Pipelines a renderer built from `config` will bind.
    pub fn required(config: &RenderConfig) -> Vec<PipelineKind> {
        Self::ALL
            .into_iter()
            .filter(|kind| match kind {
                PipelineKind::GBuffer | PipelineKind::DeferredShading => config.is_deferred(),
                PipelineKind::NormalDepth | PipelineKind::Ssao | PipelineKind::SsaoBlur => config.ssao,
                PipelineKind::ShadowDebug => config.show_shadow_debug,
                _ => true,
            })
            .collect()
    }
}

/// The pipeline layout plus every pipeline the configuration needs.
pub struct PipelineSet {
    layout: PipelineLayout,
    pipelines: HashMap<PipelineKind, Pipeline>,
}

impl PipelineSet {
    /// Loads shaders from `shader_dir` and builds the pipelines of `kinds`.
    ///
    /// # Errors
    ///
    /// Fails if a shader file is missing or pipeline creation fails.
    pub fn new(
        device: Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        shader_dir: &Path,
        backbuffer_format: vk::Format,
        kinds: &[PipelineKind],
    ) -> RendererResult<Self> {
        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(std::mem::size_of::<crate::gpu_types::DrawPushConstants>() as u32);
        let layout = PipelineLayout::new(device.clone(), set_layouts, &[push_range])?;

        let mut pipelines = HashMap::new();
        for &kind in kinds {
            let pipeline = build_pipeline(device.clone(), &layout, shader_dir, backbuffer_format, kind)?;
            debug!("Created {:?} pipeline", kind);
            pipelines.insert(kind, pipeline);
        }
        info!("Created {} graphics pipelines", pipelines.len());
        Ok(Self { layout, pipelines })
    }

    #[inline]
    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }

    pub fn get(&self, kind: PipelineKind) -> RendererResult<&Pipeline> {
        self.pipelines
            .get(&kind)
            .ok_or(RendererError::MissingPipeline(kind))
    }
}

fn build_pipeline(
    device: Arc<Device>,
    layout: &PipelineLayout,
    shader_dir: &Path,
    backbuffer_format: vk::Format,
    kind: PipelineKind,
) -> RendererResult<Pipeline> {
    let desc = kind.desc();
    let vertex = Shader::load(device.clone(), shader_dir, desc.shader, ShaderStage::Vertex)?;
    let fragment = if desc.fragment {
        Some(Shader::load(device.clone(), shader_dir, desc.shader, ShaderStage::Fragment)?)
    } else {
        None
    };

    let mut builder = GraphicsPipelineBuilder::new()
        .vertex_shader(&vertex)
        .cull_mode(desc.cull)
        .depth_test(desc.depth_test, desc.depth_write)
        .depth_compare_op(desc.depth_compare);
    if let Some(fragment) = &fragment {
        builder = builder.fragment_shader(fragment);
    }
    if desc.mesh_input {
        builder = builder.vertex_input(Vertex::binding_description(), &Vertex::attribute_descriptions());
    }
    if let Some(bias) = desc.depth_bias {
        builder = builder.depth_bias(bias);
    }
    builder = match desc.colors {
        ColorTargets::None => builder,
        ColorTargets::Backbuffer => builder.color_attachment_format(backbuffer_format),
        ColorTargets::GBuffer => builder.color_attachment_formats(&GBUFFER_FORMATS),
        ColorTargets::NormalMap => builder.color_attachment_format(NORMAL_MAP_FORMAT),
        ColorTargets::AmbientMap => builder.color_attachment_format(AMBIENT_MAP_FORMAT),
    };
    if desc.depth {
        builder = builder.depth_attachment_format(DEPTH_FORMAT);
    }

    Ok(builder.build(device, layout)?)
}
