//! Vulkan images behind every [`TargetId`], plus the descriptor sets that
//! expose them to shaders.
//!
//! Two kinds of descriptor set are used:
//!
//! | Set | Binding | Contents |
//! |-----|---------|----------|
//! | 0 (per ring slot) | 0 | pass constants, dynamic uniform buffer |
//! | | 1 | SSAO constants |
//! | | 2 | material buffer |
//! | 1 (environment) | 0 | material textures |
//! | | 1 | shadow maps |
//! | | 2 | reflection cube |
//! | | 3 | sky cube |
//! | | 4 | G-buffer |
//! | | 5 | normal/depth map |
//! | | 6 | ambient maps |
//!
//! Set 1 bindings 4 to 6 point at screen-sized targets and are rewritten on
//! every resize. Everything else is written once at start-up.

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use prism_core::{MAX_SHADOW_TRANSFORMS, RenderConfig};
use prism_resources::TextureTable;
use prism_rhi::buffer::{Buffer, BufferUsage};
use prism_rhi::command::{CommandBuffer, CommandPool};
use prism_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, binding, buffer_info, pool_sizes_for, sampled_image_info,
    update_descriptor_sets,
};
use prism_rhi::device::Device;
use prism_rhi::image::{DEPTH_FORMAT, Image, ImageDesc, is_depth_format, subresource_range};
use prism_rhi::sampler::{Sampler, SamplerKind};
use prism_rhi::RhiError;
use tracing::{debug, info};

use crate::error::{RendererError, RendererResult};
use crate::frame_resource::FrameResource;
use crate::gpu_types::{PassConstants, SsaoConstants};
use crate::state_tracker::TargetId;
use crate::targets::{GBUFFER_COUNT, TargetLayout, TargetStore};
use crate::vulkan_backend::VulkanBackend;

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
/// Colour of the placeholder sky cube.
pub const SKY_COLOR: [u8; 4] = [176, 196, 222, 255];

const FRAME_PASS_BINDING: u32 = 0;
const FRAME_SSAO_BINDING: u32 = 1;
const FRAME_MATERIAL_BINDING: u32 = 2;

const ENV_TEXTURE_BINDING: u32 = 0;
const ENV_SHADOW_BINDING: u32 = 1;
const ENV_CUBE_BINDING: u32 = 2;
const ENV_SKY_BINDING: u32 = 3;
const ENV_GBUFFER_BINDING: u32 = 4;
const ENV_NORMAL_BINDING: u32 = 5;
const ENV_AMBIENT_BINDING: u32 = 6;

/// An image, the view a pass renders through and the range barriers cover.
#[derive(Clone, Copy, Debug)]
pub struct TargetView {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub range: vk::ImageSubresourceRange,
}

impl TargetView {
    fn whole(image: &Image) -> Self {
        Self {
            image: image.handle(),
            view: image.view(),
            range: subresource_range(image.aspect(), 0, image.layer_count()),
        }
    }

    fn layer(image: &Image, layer: u32) -> Self {
        Self {
            image: image.handle(),
            view: image.layer_view(layer),
            range: subresource_range(image.aspect(), layer, 1),
        }
    }
}

pub struct VulkanTargets {
    device: Arc<Device>,
    /// Screen-sized targets of the current generation.
    screen: HashMap<TargetId, Image>,
    generation: u64,
    shadow_maps: Vec<Image>,
    cube: Image,
    cube_depth: Image,
    sky_cube: Image,
    textures: Vec<Image>,
    samplers: HashMap<SamplerKind, Sampler>,
    frame_sets: Vec<vk::DescriptorSet>,
    environment_set: vk::DescriptorSet,
    // Sets are freed with the pool; the layouts must outlive both.
    pool: DescriptorPool,
    frame_layout: DescriptorSetLayout,
    environment_layout: DescriptorSetLayout,
}

impl VulkanTargets {
    /// Creates the persistent targets (shadow maps, reflection cube and its
    /// depth buffer), uploads the placeholder textures and allocates the
    /// descriptor sets.
    ///
    /// `cube_format` is the backbuffer format, since cube faces are drawn
    /// with the same pipelines as the main view.
    pub fn new(
        device: Arc<Device>,
        config: &RenderConfig,
        shadow_slots: usize,
        cube_format: vk::Format,
        textures: &TextureTable,
    ) -> RendererResult<Self> {
        let shadow_maps = (0..shadow_slots)
            .map(|i| {
                let name = format!("shadow_map_{i}");
                Image::new(
                    device.clone(),
                    &ImageDesc::texture_2d(&name, config.shadow_map_size, config.shadow_map_size, DEPTH_FORMAT)
                        .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let cube = Image::new(
            device.clone(),
            &ImageDesc::cube("reflection_cube", config.cube_map_size, cube_format)
                .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT),
        )?;
        let cube_depth = Image::new(
            device.clone(),
            &ImageDesc::texture_2d("cube_depth", config.cube_map_size, config.cube_map_size, DEPTH_FORMAT)
                .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT),
        )?;

        let uploader = TextureUploader::new(device.clone())?;
        let sky_cube = uploader.upload(
            &ImageDesc::cube("sky_cube", 1, TEXTURE_FORMAT).usage(vk::ImageUsageFlags::TRANSFER_DST),
            &SKY_COLOR.repeat(6),
        )?;
        let texture_images = textures
            .textures()
            .iter()
            .map(|texture| {
                uploader.upload(
                    &ImageDesc::texture_2d(&texture.name, 1, 1, TEXTURE_FORMAT)
                        .usage(vk::ImageUsageFlags::TRANSFER_DST),
                    &texture.color,
                )
            })
            .collect::<RendererResult<Vec<_>>>()?;

        let samplers = SamplerKind::ALL
            .into_iter()
            .map(|kind| Ok((kind, Sampler::new(device.clone(), kind)?)))
            .collect::<RendererResult<HashMap<_, _>>>()?;

        let frame_bindings = frame_bindings();
        let environment_bindings = environment_bindings(texture_images.len().max(1) as u32);
        let frame_layout = DescriptorSetLayout::new(device.clone(), &frame_bindings, false)?;
        let environment_layout = DescriptorSetLayout::new(device.clone(), &environment_bindings, true)?;

        let slot_count = config.frames_in_flight as u32;
        let mut pool_sizes = pool_sizes_for(&frame_bindings, slot_count);
        pool_sizes.extend(pool_sizes_for(&environment_bindings, 1));
        let pool = DescriptorPool::new(device.clone(), slot_count + 1, &pool_sizes)?;

        let frame_sets = pool.allocate(&vec![frame_layout.handle(); config.frames_in_flight])?;
        let environment_set = pool
            .allocate(&[environment_layout.handle()])?
            .first()
            .copied()
            .ok_or_else(|| RhiError::InvalidUsage("no environment descriptor set allocated".to_string()))?;

        let targets = Self {
            device,
            screen: HashMap::new(),
            generation: 0,
            shadow_maps,
            cube,
            cube_depth,
            sky_cube,
            textures: texture_images,
            samplers,
            frame_sets,
            environment_set,
            pool,
            frame_layout,
            environment_layout,
        };
        targets.write_static_descriptors()?;

        info!(
            "Created {} shadow maps, a {}px reflection cube and {} textures",
            targets.shadow_maps.len(),
            config.cube_map_size,
            targets.textures.len()
        );
        Ok(targets)
    }

    /// Descriptor set layouts in set order.
    pub fn set_layouts(&self) -> [vk::DescriptorSetLayout; 2] {
        [self.frame_layout.handle(), self.environment_layout.handle()]
    }

    #[inline]
    pub fn frame_set(&self, slot: usize) -> Option<vk::DescriptorSet> {
        self.frame_sets.get(slot).copied()
    }

    #[inline]
    pub fn environment_set(&self) -> vk::DescriptorSet {
        self.environment_set
    }

    /// Generation of the screen targets currently held.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Points set 0 of `slot` at that ring slot's buffers.
    pub fn write_frame_set(&self, slot: usize, frame: &FrameResource<VulkanBackend>) -> RendererResult<()> {
        let set = self
            .frame_set(slot)
            .ok_or_else(|| RhiError::OutOfBounds(format!("no descriptor set for ring slot {slot}")))?;

        let pass = [buffer_info(
            frame.pass_constants.buffer().handle(),
            0,
            std::mem::size_of::<PassConstants>() as vk::DeviceSize,
        )];
        let ssao = [buffer_info(
            frame.ssao_constants.buffer().handle(),
            0,
            std::mem::size_of::<SsaoConstants>() as vk::DeviceSize,
        )];
        let materials = [buffer_info(frame.materials.buffer().handle(), 0, vk::WHOLE_SIZE)];

        let writes = [
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(FRAME_PASS_BINDING)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .buffer_info(&pass),
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(FRAME_SSAO_BINDING)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&ssao),
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(FRAME_MATERIAL_BINDING)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(&materials),
        ];
        update_descriptor_sets(&self.device, &writes);
        debug!("Wrote frame descriptor set for ring slot {}", slot);
        Ok(())
    }

    /// The image and view behind `id`. The backbuffer is owned by the
    /// swapchain and never resolved here.
    pub fn resolve(&self, id: TargetId) -> RendererResult<TargetView> {
        let missing = || RendererError::MissingTarget(id.to_string());
        match id {
            TargetId::Backbuffer => Err(missing()),
            TargetId::Shadow(i) => self.shadow_maps.get(i).map(TargetView::whole).ok_or_else(missing),
            TargetId::ReflectionCube(face) if face < 6 => Ok(TargetView::layer(&self.cube, face as u32)),
            TargetId::ReflectionCube(_) => Err(missing()),
            TargetId::CubeDepth => Ok(TargetView::whole(&self.cube_depth)),
            _ => self.screen.get(&id).map(TargetView::whole).ok_or_else(missing),
        }
    }

    fn sampler(&self, kind: SamplerKind) -> RendererResult<vk::Sampler> {
        self.samplers
            .get(&kind)
            .map(Sampler::handle)
            .ok_or_else(|| RhiError::InvalidUsage(format!("sampler {kind:?} was not created")).into())
    }

    fn write_static_descriptors(&self) -> RendererResult<()> {
        let wrap = self.sampler(SamplerKind::LinearWrap)?;
        let clamp = self.sampler(SamplerKind::LinearClamp)?;
        let shadow = self.sampler(SamplerKind::ShadowCompare)?;

        let textures: Vec<_> = self
            .textures
            .iter()
            .map(|image| sampled_image_info(wrap, image.view()))
            .collect();
        let shadow_maps: Vec<_> = self
            .shadow_maps
            .iter()
            .map(|image| sampled_image_info(shadow, image.view()))
            .collect();
        let cube = [sampled_image_info(clamp, self.cube.view())];
        let sky = [sampled_image_info(clamp, self.sky_cube.view())];

        let mut writes = vec![
            self.image_write(ENV_CUBE_BINDING, &cube),
            self.image_write(ENV_SKY_BINDING, &sky),
        ];
        if !textures.is_empty() {
            writes.push(self.image_write(ENV_TEXTURE_BINDING, &textures));
        }
        if !shadow_maps.is_empty() {
            writes.push(self.image_write(ENV_SHADOW_BINDING, &shadow_maps));
        }
        update_descriptor_sets(&self.device, &writes);
        Ok(())
    }

    fn image_write<'a>(&self, binding: u32, infos: &'a [vk::DescriptorImageInfo]) -> vk::WriteDescriptorSet<'a> {
        vk::WriteDescriptorSet::default()
            .dst_set(self.environment_set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(infos)
    }

    fn screen_view(&self, id: TargetId) -> Option<vk::ImageView> {
        self.screen.get(&id).map(Image::view)
    }
}

impl TargetStore for VulkanTargets {
    fn rebuild(&mut self, layout: &TargetLayout) -> RendererResult<()> {
        self.screen.clear();
        for desc in &layout.targets {
            let name = desc.id.to_string();
            let usage = if is_depth_format(desc.format) {
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::ImageUsageFlags::COLOR_ATTACHMENT
            };
            let image = Image::new(
                self.device.clone(),
                &ImageDesc::texture_2d(&name, desc.extent.width, desc.extent.height, desc.format).usage(usage),
            )?;
            self.screen.insert(desc.id, image);
        }
        self.generation = layout.generation;
        debug!(
            "Rebuilt {} screen targets at {}x{}",
            layout.targets.len(),
            layout.extent.width,
            layout.extent.height
        );
        Ok(())
    }

    fn rewrite_descriptors(&mut self, layout: &TargetLayout) -> RendererResult<()> {
        let point = self.sampler(SamplerKind::PointClamp)?;
        let linear = self.sampler(SamplerKind::LinearClamp)?;

        let gbuffer: Vec<_> = (0..GBUFFER_COUNT)
            .filter_map(|i| self.screen_view(TargetId::GBuffer(i)))
            .map(|view| sampled_image_info(point, view))
            .collect();
        let normal: Vec<_> = self
            .screen_view(TargetId::NormalMap)
            .map(|view| sampled_image_info(point, view))
            .into_iter()
            .collect();
        let ambient: Vec<_> = (0..2)
            .filter_map(|i| self.screen_view(TargetId::AmbientMap(i)))
            .map(|view| sampled_image_info(linear, view))
            .collect();

        let writes: Vec<_> = [
            (ENV_GBUFFER_BINDING, &gbuffer),
            (ENV_NORMAL_BINDING, &normal),
            (ENV_AMBIENT_BINDING, &ambient),
        ]
        .into_iter()
        .filter(|(_, infos)| !infos.is_empty())
        .map(|(binding, infos)| self.image_write(binding, infos))
        .collect();
        update_descriptor_sets(&self.device, &writes);

        debug!(
            "Rewrote {} environment bindings for target generation {}",
            writes.len(),
            layout.generation
        );
        Ok(())
    }
}

fn frame_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 3] {
    let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
    [
        binding(FRAME_PASS_BINDING, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1, stages),
        binding(FRAME_SSAO_BINDING, vk::DescriptorType::UNIFORM_BUFFER, 1, stages),
        binding(FRAME_MATERIAL_BINDING, vk::DescriptorType::STORAGE_BUFFER, 1, stages),
    ]
}

fn environment_bindings(texture_count: u32) -> [vk::DescriptorSetLayoutBinding<'static>; 7] {
    let image = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;
    let fragment = vk::ShaderStageFlags::FRAGMENT;
    [
        binding(ENV_TEXTURE_BINDING, image, texture_count, fragment),
        binding(ENV_SHADOW_BINDING, image, MAX_SHADOW_TRANSFORMS as u32, fragment),
        binding(ENV_CUBE_BINDING, image, 1, fragment),
        binding(ENV_SKY_BINDING, image, 1, fragment),
        binding(ENV_GBUFFER_BINDING, image, GBUFFER_COUNT as u32, fragment),
        binding(ENV_NORMAL_BINDING, image, 1, fragment),
        binding(ENV_AMBIENT_BINDING, image, 2, fragment),
    ]
}

/// Copies texel data into sampled images with one-off submissions.
struct TextureUploader {
    device: Arc<Device>,
    pool: CommandPool,
}

impl TextureUploader {
    fn new(device: Arc<Device>) -> RendererResult<Self> {
        let family = device
            .queue_families()
            .graphics_family
            .ok_or_else(|| RhiError::InvalidUsage("device has no graphics queue family".to_string()))?;
        let pool = CommandPool::new_transient(device.clone(), family)?;
        Ok(Self { device, pool })
    }

    /// Creates the image described by `desc` and fills every layer from
    /// `texels`, leaving it in `SHADER_READ_ONLY_OPTIMAL`.
    fn upload(&self, desc: &ImageDesc<'_>, texels: &[u8]) -> RendererResult<Image> {
        let image = Image::new(self.device.clone(), desc)?;
        let staging = Buffer::new_with_data(self.device.clone(), BufferUsage::Staging, texels)?;
        let range = subresource_range(image.aspect(), 0, desc.layers);

        let cmd = CommandBuffer::new(self.device.clone(), &self.pool)?;
        cmd.begin()?;
        cmd.image_barriers(&[vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::NONE)
            .src_access_mask(vk::AccessFlags2::NONE)
            .dst_stage_mask(vk::PipelineStageFlags2::COPY)
            .dst_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .image(image.handle())
            .subresource_range(range)]);

        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(image.aspect())
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(desc.layers),
            )
            .image_extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            });
        cmd.copy_buffer_to_image(staging.handle(), image.handle(), &[region]);

        cmd.image_barriers(&[vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::COPY)
            .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER)
            .dst_access_mask(vk::AccessFlags2::SHADER_SAMPLED_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image(image.handle())
            .subresource_range(range)]);
        cmd.end()?;

        let command_buffers = [vk::CommandBufferSubmitInfo::default().command_buffer(cmd.handle())];
        let submit = vk::SubmitInfo2::default().command_buffer_infos(&command_buffers);
        unsafe { self.device.submit_graphics(&[submit])? };
        self.device.wait_idle()?;
        self.pool.reset()?;

        debug!("Uploaded texture '{}'", desc.name);
        Ok(image)
    }
}
