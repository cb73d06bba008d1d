//! Resolution-dependent render targets.
//!
//! A [`TargetLayout`] lists every target whose size follows the window:
//! scene depth, and depending on the configuration the normal map, the two
//! half-resolution ambient maps and the four G-buffer targets. Each resize
//! produces a new layout with a higher generation; a [`TargetStore`]
//! recreates the targets and then rewrites every descriptor that samples
//! them.

use std::collections::BTreeMap;

use ash::vk;
use prism_core::RenderConfig;
use prism_rhi::image::DEPTH_FORMAT;
use tracing::debug;

use crate::error::RendererResult;
use crate::state_tracker::TargetId;

pub const NORMAL_MAP_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const AMBIENT_MAP_FORMAT: vk::Format = vk::Format::R16_UNORM;

/// Albedo, normal, world position and material parameters.
pub const GBUFFER_FORMATS: [vk::Format; 4] = [
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::R16G16B16A16_SFLOAT,
    vk::Format::R32G32B32A32_SFLOAT,
    vk::Format::R8G8B8A8_UNORM,
];

pub const GBUFFER_COUNT: usize = GBUFFER_FORMATS.len();

/// One screen-sized target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetDesc {
    pub id: TargetId,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
}

/// Every screen-sized target for one window size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetLayout {
    pub extent: vk::Extent2D,
    /// Bumped on every resize.
    pub generation: u64,
    pub targets: Vec<TargetDesc>,
}

impl TargetLayout {
    pub fn new(extent: vk::Extent2D, generation: u64, config: &RenderConfig) -> Self {
        let mut targets = vec![TargetDesc {
            id: TargetId::SceneDepth,
            extent,
            format: DEPTH_FORMAT,
        }];

        if config.ssao {
            targets.push(TargetDesc {
                id: TargetId::NormalMap,
                extent,
                format: NORMAL_MAP_FORMAT,
            });
            let half = ambient_map_extent(extent);
            for i in 0..2 {
                targets.push(TargetDesc {
                    id: TargetId::AmbientMap(i),
                    extent: half,
                    format: AMBIENT_MAP_FORMAT,
                });
            }
        }

        if config.is_deferred() {
            for (i, &format) in GBUFFER_FORMATS.iter().enumerate() {
                targets.push(TargetDesc {
                    id: TargetId::GBuffer(i),
                    extent,
                    format,
                });
            }
        }

        Self {
            extent,
            generation,
            targets,
        }
    }

    pub fn get(&self, id: TargetId) -> Option<&TargetDesc> {
        self.targets.iter().find(|t| t.id == id)
    }

    /// Whether `id` is rebuilt on resize.
    pub fn contains(&self, id: TargetId) -> bool {
        self.get(id).is_some()
    }
}

/// Ambient occlusion runs at half resolution.
pub fn ambient_map_extent(extent: vk::Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: (extent.width / 2).max(1),
        height: (extent.height / 2).max(1),
    }
}

/// Owner of the screen-sized targets and the descriptors that read them.
pub trait TargetStore {
    /// Recreates every target in `layout`, dropping the previous ones.
    fn rebuild(&mut self, layout: &TargetLayout) -> RendererResult<()>;

    /// Points every descriptor at the targets of `layout`.
    fn rewrite_descriptors(&mut self, layout: &TargetLayout) -> RendererResult<()>;
}

/// A created target as seen by [`HostTargetStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostTarget {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub generation: u64,
}

/// Target store that only tracks what would have been created and which
/// generation each descriptor refers to.
#[derive(Debug, Default)]
pub struct HostTargetStore {
    targets: BTreeMap<TargetId, HostTarget>,
    descriptors: BTreeMap<TargetId, u64>,
    rebuilds: usize,
}

impl HostTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(&self, id: TargetId) -> Option<&HostTarget> {
        self.targets.get(&id)
    }

    /// Generation of the target the descriptor for `id` refers to.
    pub fn descriptor_generation(&self, id: TargetId) -> Option<u64> {
        self.descriptors.get(&id).copied()
    }

    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    /// Ids of descriptors referring to a target that no longer exists.
    pub fn stale_descriptors(&self) -> Vec<TargetId> {
        self.descriptors
            .iter()
            .filter(|&(id, generation)| {
                self.targets
                    .get(id)
                    .is_none_or(|target| target.generation != *generation)
            })
            .map(|(&id, _)| id)
            .collect()
    }
}

impl TargetStore for HostTargetStore {
    fn rebuild(&mut self, layout: &TargetLayout) -> RendererResult<()> {
        self.targets.clear();
        for desc in &layout.targets {
            self.targets.insert(
                desc.id,
                HostTarget {
                    extent: desc.extent,
                    format: desc.format,
                    generation: layout.generation,
                },
            );
        }
        self.rebuilds += 1;
        debug!(
            "Rebuilt {} host targets at {}x{}",
            layout.targets.len(),
            layout.extent.width,
            layout.extent.height
        );
        Ok(())
    }

    fn rewrite_descriptors(&mut self, layout: &TargetLayout) -> RendererResult<()> {
        self.descriptors = layout
            .targets
            .iter()
            .filter(|desc| desc.id != TargetId::SceneDepth)
            .map(|desc| (desc.id, layout.generation))
            .collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::ShadingPath;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_default_layout_has_every_screen_target() {
        let layout = TargetLayout::new(extent(800, 600), 1, &RenderConfig::default());
        assert_eq!(layout.targets.len(), 1 + 1 + 2 + GBUFFER_COUNT);
        assert_eq!(layout.get(TargetId::AmbientMap(1)).unwrap().extent, extent(400, 300));
        assert_eq!(layout.get(TargetId::GBuffer(2)).unwrap().format, vk::Format::R32G32B32A32_SFLOAT);
    }

    #[test]
    fn test_forward_without_ssao_only_has_depth() {
        let config = RenderConfig {
            shading: ShadingPath::Forward,
            ssao: false,
            ..Default::default()
        };
        let layout = TargetLayout::new(extent(800, 600), 1, &config);
        assert_eq!(layout.targets.len(), 1);
        assert!(layout.contains(TargetId::SceneDepth));
        assert!(!layout.contains(TargetId::NormalMap));
    }

    #[test]
    fn test_ambient_extent_never_zero() {
        assert_eq!(ambient_map_extent(extent(1, 1)), extent(1, 1));
    }

    #[test]
    fn test_host_store_detects_stale_descriptors() {
        let config = RenderConfig::default();
        let mut store = HostTargetStore::new();
        let first = TargetLayout::new(extent(800, 600), 1, &config);
        store.rebuild(&first).unwrap();
        store.rewrite_descriptors(&first).unwrap();
        assert!(store.stale_descriptors().is_empty());

        let second = TargetLayout::new(extent(1920, 1080), 2, &config);
        store.rebuild(&second).unwrap();
        assert!(!store.stale_descriptors().is_empty());
        store.rewrite_descriptors(&second).unwrap();
        assert!(store.stale_descriptors().is_empty());
        assert_eq!(store.rebuilds(), 2);
    }
}
