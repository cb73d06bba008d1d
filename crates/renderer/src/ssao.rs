//! Screen-space ambient occlusion kernels.

use ash::vk;
use glam::{Mat4, Vec2, Vec3, Vec4};
use prism_scene::NDC_TO_TEXTURE;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::gpu_types::{SSAO_OFFSET_COUNT, SsaoConstants};

pub const BLUR_SIGMA: f32 = 2.5;
/// Largest blur radius the blur shader supports.
pub const MAX_BLUR_RADIUS: usize = 5;

pub const OCCLUSION_RADIUS: f32 = 0.5;
pub const OCCLUSION_FADE_START: f32 = 0.2;
pub const OCCLUSION_FADE_END: f32 = 2.0;
pub const SURFACE_EPSILON: f32 = 0.05;

/// Cube corners followed by face centers, in opposite pairs.
const OFFSET_DIRECTIONS: [Vec3; SSAO_OFFSET_COUNT] = [
    Vec3::new(1.0, 1.0, 1.0),
    Vec3::new(-1.0, -1.0, -1.0),
    Vec3::new(-1.0, 1.0, 1.0),
    Vec3::new(1.0, -1.0, -1.0),
    Vec3::new(1.0, 1.0, -1.0),
    Vec3::new(-1.0, -1.0, 1.0),
    Vec3::new(-1.0, 1.0, -1.0),
    Vec3::new(1.0, -1.0, 1.0),
    Vec3::new(-1.0, 0.0, 0.0),
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(0.0, -1.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, 0.0, -1.0),
    Vec3::new(0.0, 0.0, 1.0),
];

/// Unit directions scaled by random lengths in [0.25, 1].
pub fn offset_vectors(rng: &mut impl Rng) -> [Vec4; SSAO_OFFSET_COUNT] {
    OFFSET_DIRECTIONS.map(|direction| {
        let length: f32 = rng.gen_range(0.25..=1.0);
        (direction.normalize() * length).extend(0.0)
    })
}

/// Normalized Gaussian weights over `2 * ceil(2 sigma) + 1` taps.
pub fn blur_weights(sigma: f32) -> Vec<f32> {
    let two_sigma_sq = 2.0 * sigma * sigma;
    let radius = (2.0 * sigma).ceil() as i32;
    debug_assert!(radius as usize <= MAX_BLUR_RADIUS);

    let weights: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / two_sigma_sq).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Packs up to twelve weights four to a vector.
fn pack_weights(weights: &[f32]) -> [Vec4; 3] {
    let mut packed = [0.0f32; 12];
    for (dst, &w) in packed.iter_mut().zip(weights) {
        *dst = w;
    }
    [
        Vec4::from_slice(&packed[0..4]),
        Vec4::from_slice(&packed[4..8]),
        Vec4::from_slice(&packed[8..12]),
    ]
}

/// The fixed sampling kernel plus the per-frame constants built from it.
#[derive(Clone, Debug, PartialEq)]
pub struct AmbientOcclusion {
    offsets: [Vec4; SSAO_OFFSET_COUNT],
    weights: [Vec4; 3],
}

impl AmbientOcclusion {
    /// A kernel generated from `seed`, so every run samples the same way.
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            offsets: offset_vectors(&mut rng),
            weights: pack_weights(&blur_weights(BLUR_SIGMA)),
        }
    }

    pub fn offsets(&self) -> &[Vec4; SSAO_OFFSET_COUNT] {
        &self.offsets
    }

    /// Constants for the camera projection `proj` and an ambient map of
    /// `ambient_extent`.
    pub fn constants(&self, proj: Mat4, ambient_extent: vk::Extent2D) -> SsaoConstants {
        SsaoConstants {
            proj: proj.transpose(),
            inv_proj: proj.inverse().transpose(),
            proj_tex: (NDC_TO_TEXTURE * proj).transpose(),
            offset_vectors: self.offsets,
            blur_weights: self.weights,
            inv_render_target_size: Vec2::new(
                ambient_extent.width as f32,
                ambient_extent.height as f32,
            )
            .recip(),
            occlusion_radius: OCCLUSION_RADIUS,
            occlusion_fade_start: OCCLUSION_FADE_START,
            occlusion_fade_end: OCCLUSION_FADE_END,
            surface_epsilon: SURFACE_EPSILON,
            _padding: [0.0; 2],
        }
    }
}
