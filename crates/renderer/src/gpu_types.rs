//! Shader-visible data blocks.
//!
//! These structures are copied byte for byte into the frame resources, so
//! they must match the shader declarations exactly. All use `#[repr(C)]` and
//! derive `Pod`; fields are ordered so no implicit padding appears.
//!
//! Matrices are stored transposed. Shaders declare them `row_major`, which
//! lets the same `mul(v, M)` convention work on every block.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};
use prism_core::MAX_SHADOW_TRANSFORMS;
use prism_scene::{Light, LightCounts, MAX_LIGHTS, ShadowTransform};

pub use prism_resources::MaterialData;

/// Number of SSAO sample offsets.
pub const SSAO_OFFSET_COUNT: usize = 14;

/// Per-instance record read by the vertex shader through the instance
/// buffer's device address.
///
/// # Memory Layout
///
/// - Offset 0: world matrix, transposed (64 bytes)
/// - Offset 64: texture transform, transposed (64 bytes)
/// - Offset 128: material index (4 bytes) + padding (12 bytes)
/// - Total size: 144 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub world: Mat4,
    pub tex_transform: Mat4,
    pub material_index: u32,
    pub _padding: [u32; 3],
}

impl InstanceData {
    /// Packs an instance, transposing both transforms.
    pub fn new(world: Mat4, tex_transform: Mat4, material_index: u32) -> Self {
        Self {
            world: world.transpose(),
            tex_transform: tex_transform.transpose(),
            material_index,
            _padding: [0; 3],
        }
    }

    /// The world matrix as it was before packing.
    #[inline]
    pub fn world_matrix(&self) -> Mat4 {
        self.world.transpose()
    }

    #[inline]
    pub fn tex_transform_matrix(&self) -> Mat4 {
        self.tex_transform.transpose()
    }
}

/// View, projection and sampling matrices of one shadow map (192 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ShadowMatrices {
    pub view: Mat4,
    pub proj: Mat4,
    /// World to shadow-map texture space.
    pub shadow: Mat4,
}

impl From<&ShadowTransform> for ShadowMatrices {
    fn from(transform: &ShadowTransform) -> Self {
        Self {
            view: transform.view.transpose(),
            proj: transform.proj.transpose(),
            shadow: transform.shadow.transpose(),
        }
    }
}

/// Constants of one pass instance: the main view, a cube face or a shadow
/// map.
///
/// # Memory Layout
///
/// - Offset 0: view, inverse view, projection, inverse projection,
///   view-projection, inverse view-projection, view-projection-texture
///   (7 x 64 bytes)
/// - Offset 448: shadow matrices (12 x 192 bytes)
/// - Offset 2752: eye position + padding (16 bytes)
/// - Offset 2768: render target size and its inverse (16 bytes)
/// - Offset 2784: near, far, total time, delta time (16 bytes)
/// - Offset 2800: ambient light (16 bytes)
/// - Offset 2816: directional, point, spot and shadow counts (16 bytes)
/// - Offset 2832: lights (16 x 48 bytes)
/// - Total size: 3600 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PassConstants {
    pub view: Mat4,
    pub inv_view: Mat4,
    pub proj: Mat4,
    pub inv_proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub view_proj_tex: Mat4,
    pub shadow_transforms: [ShadowMatrices; MAX_SHADOW_TRANSFORMS],
    pub eye_position: Vec3,
    pub _padding0: f32,
    pub render_target_size: Vec2,
    pub inv_render_target_size: Vec2,
    pub near_z: f32,
    pub far_z: f32,
    pub total_time: f32,
    pub delta_time: f32,
    pub ambient_light: Vec4,
    /// Directional, point and spot light counts, then the shadow map count.
    pub light_counts: [u32; 4],
    pub lights: [Light; MAX_LIGHTS],
}

impl Default for PassConstants {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl PassConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Fills every camera-derived field from `view` and `proj`.
    ///
    /// `ndc_to_texture` is composed after the projection to produce
    /// `view_proj_tex`, which maps world space to screen texture space.
    pub fn set_camera(&mut self, view: Mat4, proj: Mat4, eye_position: Vec3, ndc_to_texture: Mat4) {
        let view_proj = proj * view;
        self.view = view.transpose();
        self.inv_view = view.inverse().transpose();
        self.proj = proj.transpose();
        self.inv_proj = proj.inverse().transpose();
        self.view_proj = view_proj.transpose();
        self.inv_view_proj = view_proj.inverse().transpose();
        self.view_proj_tex = (ndc_to_texture * view_proj).transpose();
        self.eye_position = eye_position;
    }

    pub fn set_render_target_size(&mut self, width: u32, height: u32) {
        let size = Vec2::new(width as f32, height as f32);
        self.render_target_size = size;
        self.inv_render_target_size = size.recip();
    }

    pub fn set_lights(&mut self, lights: [Light; MAX_LIGHTS], counts: LightCounts) {
        self.lights = lights;
        self.light_counts[0] = counts.directional;
        self.light_counts[1] = counts.point;
        self.light_counts[2] = counts.spot;
    }

    /// Copies up to [`MAX_SHADOW_TRANSFORMS`] shadow transforms and records
    /// how many were stored.
    pub fn set_shadow_transforms(&mut self, transforms: &[ShadowTransform]) {
        let count = transforms.len().min(MAX_SHADOW_TRANSFORMS);
        for (dst, src) in self.shadow_transforms.iter_mut().zip(&transforms[..count]) {
            *dst = ShadowMatrices::from(src);
        }
        self.light_counts[3] = count as u32;
    }
}

/// Constants of the ambient occlusion and blur passes.
///
/// # Memory Layout
///
/// - Offset 0: projection, inverse projection, projection-texture
///   (3 x 64 bytes)
/// - Offset 192: sample offsets (14 x 16 bytes)
/// - Offset 416: blur weights (3 x 16 bytes)
/// - Offset 464: inverse ambient map size (8 bytes)
/// - Offset 472: occlusion radius, fade start, fade end, surface epsilon
/// - Total size: 496 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SsaoConstants {
    pub proj: Mat4,
    pub inv_proj: Mat4,
    pub proj_tex: Mat4,
    pub offset_vectors: [Vec4; SSAO_OFFSET_COUNT],
    /// Eleven blur weights packed four per vector.
    pub blur_weights: [Vec4; 3],
    pub inv_render_target_size: Vec2,
    pub occlusion_radius: f32,
    pub occlusion_fade_start: f32,
    pub occlusion_fade_end: f32,
    pub surface_epsilon: f32,
    pub _padding: [f32; 2],
}

impl Default for SsaoConstants {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Push constants shared by every graphics pipeline (16 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawPushConstants {
    /// Device address of the bound instance buffer.
    pub instance_address: u64,
    /// Non-zero for the horizontal blur direction.
    pub blur_horizontal: u32,
    pub _padding: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_struct_sizes() {
        assert_eq!(size_of::<InstanceData>(), 144);
        assert_eq!(size_of::<ShadowMatrices>(), 192);
        assert_eq!(size_of::<PassConstants>(), 3600);
        assert_eq!(size_of::<SsaoConstants>(), 496);
        assert_eq!(size_of::<DrawPushConstants>(), 16);
    }

    #[test]
    fn test_pass_constants_offsets() {
        assert_eq!(offset_of!(PassConstants, shadow_transforms), 448);
        assert_eq!(offset_of!(PassConstants, eye_position), 2752);
        assert_eq!(offset_of!(PassConstants, render_target_size), 2768);
        assert_eq!(offset_of!(PassConstants, near_z), 2784);
        assert_eq!(offset_of!(PassConstants, ambient_light), 2800);
        assert_eq!(offset_of!(PassConstants, light_counts), 2816);
        assert_eq!(offset_of!(PassConstants, lights), 2832);
    }

    #[test]
    fn test_ssao_constants_offsets() {
        assert_eq!(offset_of!(SsaoConstants, offset_vectors), 192);
        assert_eq!(offset_of!(SsaoConstants, blur_weights), 416);
        assert_eq!(offset_of!(SsaoConstants, inv_render_target_size), 464);
    }

    #[test]
    fn test_instance_transpose_round_trip() {
        let world = Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 1.0, 0.5),
            glam::Quat::from_rotation_y(0.7),
            Vec3::new(-5.0, 1.5, 10.0),
        );
        let tex = Mat4::from_scale(Vec3::new(8.0, 8.0, 1.0));
        let data = InstanceData::new(world, tex, 3);

        assert_relative_eq!(data.world_matrix(), world, epsilon = 1e-5);
        assert_relative_eq!(data.tex_transform_matrix(), tex, epsilon = 1e-5);
        assert_eq!(data.world, world.transpose());
        assert_eq!(data.material_index, 3);
    }

    #[test]
    fn test_set_camera_inverses() {
        let view = Mat4::look_at_lh(Vec3::new(0.0, 2.0, -15.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_lh(0.25 * std::f32::consts::PI, 1.5, 1.0, 1000.0);
        let mut constants = PassConstants::default();
        constants.set_camera(view, proj, Vec3::new(0.0, 2.0, -15.0), Mat4::IDENTITY);

        let view_proj = constants.view_proj.transpose();
        let inv = constants.inv_view_proj.transpose();
        assert_relative_eq!(view_proj * inv, Mat4::IDENTITY, epsilon = 1e-3);
        assert_eq!(constants.view_proj_tex, constants.view_proj);
    }

    #[test]
    fn test_shadow_transforms_are_capped() {
        let transform = ShadowTransform::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO, 0.1, 1.0);
        let many = vec![transform; MAX_SHADOW_TRANSFORMS + 3];
        let mut constants = PassConstants::default();
        constants.set_shadow_transforms(&many);
        assert_eq!(constants.light_counts[3], MAX_SHADOW_TRANSFORMS as u32);
    }

    #[test]
    fn test_render_target_size_inverse() {
        let mut constants = PassConstants::default();
        constants.set_render_target_size(800, 600);
        assert_eq!(constants.render_target_size, Vec2::new(800.0, 600.0));
        assert_relative_eq!(constants.inv_render_target_size.y, 1.0 / 600.0);
    }
}
