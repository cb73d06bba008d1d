//! Device-local images used as render targets and sampled textures.
//!
//! [`Image`] covers every off-screen target of the frame pipeline: shadow
//! depth maps, the reflection cube map and its depth buffer, the G-buffer,
//! the normal/depth map, the ambient occlusion maps and the scene depth
//! buffer. Each image has one view over all layers for sampling (`CUBE` for
//! cube maps) and one 2D view per layer for rendering into a single face.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use prism_rhi::device::Device;
//! use prism_rhi::image::{Image, ImageDesc};
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), prism_rhi::RhiError> {
//! let cube = Image::new(
//!     device,
//!     &ImageDesc::cube("reflection_cube", 512, vk::Format::R8G8B8A8_UNORM)
//!         .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED),
//! )?;
//! let positive_x = cube.layer_view(0);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Depth format used by every depth target.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Creation parameters for an [`Image`].
#[derive(Clone, Debug)]
pub struct ImageDesc<'a> {
    pub name: &'a str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub layers: u32,
    pub cube: bool,
}

impl<'a> ImageDesc<'a> {
    /// Single-layer 2D image, sampled by default.
    pub fn texture_2d(name: &'a str, width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            name,
            extent: vk::Extent2D { width, height },
            format,
            usage: vk::ImageUsageFlags::SAMPLED,
            layers: 1,
            cube: false,
        }
    }

    /// Six-layer cube-compatible image.
    pub fn cube(name: &'a str, size: u32, format: vk::Format) -> Self {
        Self {
            layers: 6,
            cube: true,
            ..Self::texture_2d(name, size, size, format)
        }
    }

    /// Adds usage flags.
    pub fn usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage |= usage;
        self
    }
}

/// A device-local image with its views.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    layer_views: Vec<vk::ImageView>,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    aspect: vk::ImageAspectFlags,
    name: String,
}

impl Image {
    pub fn new(device: Arc<Device>, desc: &ImageDesc<'_>) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 || desc.layers == 0 {
            return Err(RhiError::InvalidUsage(format!(
                "image '{}' must have non-zero extent and layer count",
                desc.name
            )));
        }
        if desc.cube && desc.layers != 6 {
            return Err(RhiError::InvalidUsage(format!(
                "cube image '{}' needs 6 layers, got {}",
                desc.name, desc.layers
            )));
        }

        let aspect = aspect_for(desc.format);
        let flags = if desc.cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };
        let image_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(desc.layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };
        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate(&AllocationCreateDesc {
                name: desc.name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };
        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let full_type = match (desc.cube, desc.layers) {
            (true, _) => vk::ImageViewType::CUBE,
            (false, 1) => vk::ImageViewType::TYPE_2D,
            (false, _) => vk::ImageViewType::TYPE_2D_ARRAY,
        };
        let view = create_view(
            &device,
            image,
            full_type,
            desc.format,
            subresource_range(aspect, 0, desc.layers),
        )?;

        let mut layer_views = Vec::with_capacity(desc.layers as usize);
        if desc.layers > 1 {
            for layer in 0..desc.layers {
                layer_views.push(create_view(
                    &device,
                    image,
                    vk::ImageViewType::TYPE_2D,
                    desc.format,
                    subresource_range(aspect, layer, 1),
                )?);
            }
        }

        debug!(
            "Created image '{}': {}x{}x{} ({:?})",
            desc.name, desc.extent.width, desc.extent.height, desc.layers, desc.format
        );

        Ok(Self {
            device,
            image,
            view,
            layer_views,
            allocation: Some(allocation),
            format: desc.format,
            extent: desc.extent,
            aspect,
            name: desc.name.to_string(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// View over every layer; what shaders sample.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// 2D view of a single layer; what a pass renders into.
    pub fn layer_view(&self, layer: u32) -> vk::ImageView {
        if self.layer_views.is_empty() {
            return self.view;
        }
        self.layer_views
            .get(layer as usize)
            .copied()
            .unwrap_or(vk::ImageView::null())
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    #[inline]
    pub fn layer_count(&self) -> u32 {
        self.layer_views.len().max(1) as u32
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            for view in self.layer_views.drain(..) {
                self.device.handle().destroy_image_view(view, None);
            }
            self.device.handle().destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free image allocation: {:?}", e);
            }
        }
        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }
        debug!("Destroyed image '{}'", self.name);
    }
}

/// True for formats with a depth component.
pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Aspect flags a view of `format` covers.
pub fn aspect_for(format: vk::Format) -> vk::ImageAspectFlags {
    if is_depth_format(format) {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Single-mip subresource range over `count` layers from `base_layer`.
pub fn subresource_range(
    aspect: vk::ImageAspectFlags,
    base_layer: u32,
    count: u32,
) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(base_layer)
        .layer_count(count)
}

fn create_view(
    device: &Device,
    image: vk::Image,
    view_type: vk::ImageViewType,
    format: vk::Format,
    range: vk::ImageSubresourceRange,
) -> RhiResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(format)
        .subresource_range(range);
    Ok(unsafe { device.handle().create_image_view(&view_info, None)? })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_format_detection() {
        assert!(is_depth_format(DEPTH_FORMAT));
        assert!(!is_depth_format(vk::Format::R16G16B16A16_SFLOAT));
        assert_eq!(aspect_for(DEPTH_FORMAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_for(vk::Format::R8_UNORM),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_cube_desc_has_six_layers() {
        let desc = ImageDesc::cube("cube", 512, vk::Format::R8G8B8A8_UNORM)
            .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT);
        assert_eq!(desc.layers, 6);
        assert!(desc.cube);
        assert!(desc.usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert!(desc.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    }

    #[test]
    fn test_subresource_range_single_layer() {
        let range = subresource_range(vk::ImageAspectFlags::COLOR, 3, 1);
        assert_eq!(range.base_array_layer, 3);
        assert_eq!(range.layer_count, 1);
        assert_eq!(range.level_count, 1);
    }
}
