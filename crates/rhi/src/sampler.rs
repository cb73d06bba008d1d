//! Texture samplers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// The fixed sampler set bound alongside every texture table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    /// Trilinear, repeat addressing. Material textures.
    LinearWrap,
    /// Trilinear, clamped. Cube map and full-screen targets.
    LinearClamp,
    /// Nearest, clamped. Normal/depth fetches in the AO pass.
    PointClamp,
    /// Depth comparison (LESS_OR_EQUAL) with a white border. Shadow maps.
    ShadowCompare,
}

impl SamplerKind {
    pub const ALL: [SamplerKind; 4] = [
        SamplerKind::LinearWrap,
        SamplerKind::LinearClamp,
        SamplerKind::PointClamp,
        SamplerKind::ShadowCompare,
    ];

    fn create_info(self) -> vk::SamplerCreateInfo<'static> {
        let (filter, address) = match self {
            SamplerKind::LinearWrap => (vk::Filter::LINEAR, vk::SamplerAddressMode::REPEAT),
            SamplerKind::LinearClamp => (vk::Filter::LINEAR, vk::SamplerAddressMode::CLAMP_TO_EDGE),
            SamplerKind::PointClamp => (vk::Filter::NEAREST, vk::SamplerAddressMode::CLAMP_TO_EDGE),
            SamplerKind::ShadowCompare => {
                (vk::Filter::LINEAR, vk::SamplerAddressMode::CLAMP_TO_BORDER)
            }
        };
        let mipmap_mode = if filter == vk::Filter::LINEAR {
            vk::SamplerMipmapMode::LINEAR
        } else {
            vk::SamplerMipmapMode::NEAREST
        };

        let info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(mipmap_mode)
            .address_mode_u(address)
            .address_mode_v(address)
            .address_mode_w(address)
            .max_lod(vk::LOD_CLAMP_NONE);

        if self == SamplerKind::ShadowCompare {
            info.compare_enable(true)
                .compare_op(vk::CompareOp::LESS_OR_EQUAL)
                .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
        } else {
            info
        }
    }
}

/// A `VkSampler`.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
    kind: SamplerKind,
}

impl Sampler {
    pub fn new(device: Arc<Device>, kind: SamplerKind) -> RhiResult<Self> {
        let sampler = unsafe { device.handle().create_sampler(&kind.create_info(), None)? };
        debug!("Created {:?} sampler", kind);
        Ok(Self {
            device,
            sampler,
            kind,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }

    #[inline]
    pub fn kind(&self) -> SamplerKind {
        self.kind
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
    }
}
