//! Shadow view/projection builders.
//!
//! Every shadow slot gets a [`ShadowTransform`]: the light view and
//! projection used to render its depth map, and the matrix that takes a world
//! position to shadow-map texture coordinates.
//!
//! Slots are laid out as directional slots first (one per cascade, or one
//! whole-scene fit), then one per spot light, then six per point light.

use glam::{Mat4, Vec3, Vec4};

use crate::bounds::BoundingSphere;
use crate::camera::Camera;
use crate::light::{LightRig, PointLight, SpotLight};

/// Maps clip-space xy in [-1, 1] to texture uv in [0, 1], flipping y.
pub const NDC_TO_TEXTURE: Mat4 = Mat4::from_cols(
    Vec4::new(0.5, 0.0, 0.0, 0.0),
    Vec4::new(0.0, -0.5, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 1.0, 0.0),
    Vec4::new(0.5, 0.5, 0.0, 1.0),
);

/// Weight of the logarithmic term in the cascade split scheme.
pub const CASCADE_SPLIT_LAMBDA: f32 = 0.5;

const SPOT_FOV: f32 = 0.5 * std::f32::consts::PI;
const SPOT_NEAR: f32 = 0.1;
const SPOT_FAR: f32 = 3.5;
const POINT_NEAR: f32 = 0.1;

/// Look directions and up vectors of the six cube faces, in face order
/// +X, -X, +Y, -Y, +Z, -Z.
pub const CUBE_FACE_DIRECTIONS: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::Y),
    (Vec3::NEG_X, Vec3::Y),
    (Vec3::Y, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::Z),
    (Vec3::Z, Vec3::Y),
    (Vec3::NEG_Z, Vec3::Y),
];

/// One shadow slot's matrices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowTransform {
    pub view: Mat4,
    pub proj: Mat4,
    /// `NDC_TO_TEXTURE * proj * view`.
    pub shadow: Mat4,
    /// Light position used as the eye for the shadow pass.
    pub eye: Vec3,
    pub near_z: f32,
    pub far_z: f32,
}

impl ShadowTransform {
    pub fn new(view: Mat4, proj: Mat4, eye: Vec3, near_z: f32, far_z: f32) -> Self {
        Self {
            view,
            proj,
            shadow: NDC_TO_TEXTURE * proj * view,
            eye,
            near_z,
            far_z,
        }
    }

    /// Shadow-map uv and depth of a world position.
    pub fn project(&self, world: Vec3) -> Vec3 {
        self.shadow.project_point3(world)
    }
}

/// Split distances for `count` cascades between `near` and `far`, blending
/// logarithmic and uniform schemes by `lambda`. Returns `count + 1` values
/// starting at `near` and ending at `far`.
pub fn cascade_splits(near: f32, far: f32, count: u32, lambda: f32) -> Vec<f32> {
    (0..=count)
        .map(|i| {
            let t = i as f32 / count.max(1) as f32;
            let log = near * (far / near).powf(t);
            let uniform = near + (far - near) * t;
            lambda * log + (1.0 - lambda) * uniform
        })
        .collect()
}

fn light_up(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y }
}

/// Fits one texel-snapped orthographic shadow around each cascade of the
/// camera frustum.
pub fn directional_cascades(
    camera: &Camera,
    light_direction: Vec3,
    cascade_count: u32,
    shadow_map_size: u32,
) -> Vec<ShadowTransform> {
    let direction = light_direction.normalize();
    let up = light_up(direction);
    let rotation = Mat4::look_to_lh(Vec3::ZERO, direction, up);
    let inv_rotation = rotation.inverse();

    let inv_view_proj = camera.view_proj().inverse();
    let ndc_corner = |i: usize, z: f32| {
        Vec3::new(
            if i & 1 == 0 { -1.0 } else { 1.0 },
            if i & 2 == 0 { -1.0 } else { 1.0 },
            z,
        )
    };
    let near_corners: [Vec3; 4] =
        std::array::from_fn(|i| inv_view_proj.project_point3(ndc_corner(i, 0.0)));
    let far_corners: [Vec3; 4] =
        std::array::from_fn(|i| inv_view_proj.project_point3(ndc_corner(i, 1.0)));

    let (near, far) = (camera.near_z(), camera.far_z());
    let splits = cascade_splits(near, far, cascade_count, CASCADE_SPLIT_LAMBDA);

    splits
        .windows(2)
        .map(|range| {
            let t0 = (range[0] - near) / (far - near);
            let t1 = (range[1] - near) / (far - near);
            let mut corners = [Vec3::ZERO; 8];
            for i in 0..4 {
                corners[i] = near_corners[i].lerp(far_corners[i], t0);
                corners[i + 4] = near_corners[i].lerp(far_corners[i], t1);
            }

            let sphere = BoundingSphere::from_points(&corners);
            let radius = (sphere.radius * 16.0).ceil() / 16.0;
            let texel = 2.0 * radius / shadow_map_size as f32;

            let center_ls = rotation.transform_point3(sphere.center);
            let snapped_ls = Vec3::new(
                (center_ls.x / texel).floor() * texel,
                (center_ls.y / texel).floor() * texel,
                center_ls.z,
            );
            let center = inv_rotation.transform_point3(snapped_ls);

            let eye = center - 2.0 * radius * direction;
            let view = Mat4::look_to_lh(eye, direction, up);
            // Near plane at the eye keeps casters between the light and the sphere.
            let far_z = 3.0 * radius;
            let proj = Mat4::orthographic_lh(-radius, radius, -radius, radius, 0.0, far_z);
            ShadowTransform::new(view, proj, eye, 0.0, far_z)
        })
        .collect()
}

/// A single orthographic shadow enclosing the whole scene.
pub fn directional_scene_fit(light_direction: Vec3, scene: &BoundingSphere) -> ShadowTransform {
    let direction = light_direction.normalize();
    let eye = scene.center - 2.0 * scene.radius * direction;
    let view = Mat4::look_at_lh(eye, scene.center, light_up(direction));

    let center_ls = view.transform_point3(scene.center);
    let r = scene.radius;
    let (near_z, far_z) = (center_ls.z - r, center_ls.z + r);
    let proj = Mat4::orthographic_lh(
        center_ls.x - r,
        center_ls.x + r,
        center_ls.y - r,
        center_ls.y + r,
        near_z,
        far_z,
    );
    ShadowTransform::new(view, proj, eye, near_z, far_z)
}

pub fn spot_shadow(light: &SpotLight) -> ShadowTransform {
    let view = Mat4::look_at_lh(light.position, light.shadow_target, light.shadow_up);
    let proj = Mat4::perspective_lh(SPOT_FOV, 1.0, SPOT_NEAR, SPOT_FAR);
    ShadowTransform::new(view, proj, light.position, SPOT_NEAR, SPOT_FAR)
}

/// Six perspective views, one per cube face, reaching out to the falloff end.
pub fn point_shadows(light: &PointLight) -> [ShadowTransform; 6] {
    let proj = Mat4::perspective_lh(SPOT_FOV, 1.0, POINT_NEAR, light.falloff_end);
    CUBE_FACE_DIRECTIONS.map(|(direction, up)| {
        let view = Mat4::look_to_lh(light.position, direction, up);
        ShadowTransform::new(view, proj, light.position, POINT_NEAR, light.falloff_end)
    })
}

/// Number of directional slots for a cascade count; zero means one
/// whole-scene fit.
#[inline]
pub fn directional_slot_count(cascade_count: u32) -> usize {
    cascade_count.max(1) as usize
}

/// Total shadow slots a rig needs.
pub fn shadow_slot_count(rig: &LightRig, cascade_count: u32) -> usize {
    let directional = if rig.key_light().is_some() {
        directional_slot_count(cascade_count)
    } else {
        0
    };
    directional + rig.spots.len() + 6 * rig.points.len()
}

/// Builds every shadow slot for this frame in slot order.
pub fn build_shadow_transforms(
    camera: &Camera,
    rig: &LightRig,
    scene: &BoundingSphere,
    cascade_count: u32,
    shadow_map_size: u32,
) -> Vec<ShadowTransform> {
    let mut transforms = Vec::with_capacity(shadow_slot_count(rig, cascade_count));
    if let Some(key) = rig.key_light() {
        if cascade_count == 0 {
            transforms.push(directional_scene_fit(key.direction, scene));
        } else {
            transforms.extend(directional_cascades(
                camera,
                key.direction,
                cascade_count,
                shadow_map_size,
            ));
        }
    }
    transforms.extend(rig.spots.iter().map(spot_shadow));
    for point in &rig.points {
        transforms.extend(point_shadows(point));
    }
    transforms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::DirectionalLight;
    use approx::assert_relative_eq;

    const KEY_DIRECTION: Vec3 = Vec3::new(0.57735, -0.57735, 0.57735);

    fn scene_camera() -> Camera {
        let mut camera = Camera::new();
        camera.set_lens(0.25 * std::f32::consts::PI, 16.0 / 9.0, 1.0, 100.0);
        camera.set_position(Vec3::new(0.0, 2.0, -15.0));
        camera.update_view_matrix();
        camera
    }

    fn in_unit_square(p: Vec3) -> bool {
        (-1e-4..=1.0 + 1e-4).contains(&p.x) && (-1e-4..=1.0 + 1e-4).contains(&p.y)
    }

    #[test]
    fn test_ndc_to_texture_maps_corners() {
        let top_left = NDC_TO_TEXTURE.transform_point3(Vec3::new(-1.0, 1.0, 0.5));
        let bottom_right = NDC_TO_TEXTURE.transform_point3(Vec3::new(1.0, -1.0, 0.5));
        assert_eq!(top_left, Vec3::new(0.0, 0.0, 0.5));
        assert_eq!(bottom_right, Vec3::new(1.0, 1.0, 0.5));
    }

    #[test]
    fn test_cascade_splits_span_range() {
        let splits = cascade_splits(1.0, 1000.0, 3, CASCADE_SPLIT_LAMBDA);
        assert_eq!(splits.len(), 4);
        assert_relative_eq!(splits[0], 1.0);
        assert_relative_eq!(splits[3], 1000.0, epsilon = 1e-2);
        assert!(splits.windows(2).all(|w| w[0] < w[1]));
    }

    /// The eight view-space corners of the camera frustum between `near`
    /// and `far`, in world space.
    fn sub_frustum_corners(camera: &Camera, near: f32, far: f32) -> [Vec3; 8] {
        let tan_y = (0.5 * camera.fov_y()).tan();
        let tan_x = tan_y * camera.aspect();
        let inv_view = camera.view().inverse();
        std::array::from_fn(|i| {
            let depth = if i < 4 { near } else { far };
            let x = if i & 1 == 0 { -tan_x } else { tan_x };
            let y = if i & 2 == 0 { -tan_y } else { tan_y };
            inv_view.transform_point3(Vec3::new(x * depth, y * depth, depth))
        })
    }

    #[test]
    fn test_cascade_corners_project_inside_map() {
        const MAP_SIZE: u32 = 2048;
        // Snapping moves the fit by less than one texel.
        let texel = 1.0 / MAP_SIZE as f32;
        let inside = |v: f32| (-texel..=1.0 + texel).contains(&v);

        let mut camera = scene_camera();
        let poses = [
            (Vec3::new(0.0, 2.0, -15.0), 0.0, 0.0),
            (Vec3::new(7.3, 5.0, 4.1), 0.9, 0.2),
            (Vec3::new(-12.0, 1.0, 20.0), -2.4, -0.3),
            (Vec3::new(3.3, 30.0, -8.7), 3.0, 0.6),
        ];
        for (position, yaw, pitch) in poses {
            camera.set_position(position);
            camera.rotate_y(yaw);
            camera.pitch(pitch);
            camera.update_view_matrix();

            let cascades = directional_cascades(&camera, KEY_DIRECTION, 3, MAP_SIZE);
            assert_eq!(cascades.len(), 3);
            let splits = cascade_splits(camera.near_z(), camera.far_z(), 3, CASCADE_SPLIT_LAMBDA);
            for (cascade, range) in cascades.iter().zip(splits.windows(2)) {
                for corner in sub_frustum_corners(&camera, range[0], range[1]) {
                    let uvz = cascade.project(corner);
                    assert!(
                        inside(uvz.x) && inside(uvz.y),
                        "{corner:?} maps to {uvz:?}, outside the shadow map"
                    );
                    assert!((0.0..=1.0).contains(&uvz.z), "{corner:?} depth {}", uvz.z);
                }
            }
        }
    }

    #[test]
    fn test_cascade_origin_lands_on_texel_grid() {
        let mut camera = scene_camera();
        for step in 0..4 {
            camera.set_position(Vec3::new(0.013 * step as f32, 2.0, -15.0));
            camera.update_view_matrix();
            for cascade in directional_cascades(&camera, KEY_DIRECTION, 3, 2048) {
                let uv = cascade.project(Vec3::ZERO) * 2048.0;
                assert_relative_eq!(uv.x, uv.x.round(), epsilon = 2e-2);
                assert_relative_eq!(uv.y, uv.y.round(), epsilon = 2e-2);
            }
        }
    }

    #[test]
    fn test_scene_fit_encloses_sphere() {
        let scene = BoundingSphere::new(Vec3::ZERO, (20.0f32 * 20.0 + 30.0 * 30.0).sqrt());
        let fit = directional_scene_fit(KEY_DIRECTION, &scene);
        assert_relative_eq!(fit.eye, -2.0 * scene.radius * KEY_DIRECTION, epsilon = 1e-3);

        let center = fit.project(Vec3::ZERO);
        assert_relative_eq!(center.x, 0.5, epsilon = 1e-4);
        assert_relative_eq!(center.y, 0.5, epsilon = 1e-4);
        for p in [Vec3::new(20.0, 0.0, 0.0), Vec3::new(0.0, 0.0, -30.0)] {
            assert!(in_unit_square(fit.project(p)));
        }
    }

    #[test]
    fn test_spot_target_maps_to_center() {
        let light = SpotLight {
            position: Vec3::new(4.0, 3.5, -10.0),
            shadow_target: Vec3::new(5.0, 0.0, -10.0),
            ..Default::default()
        };
        let shadow = spot_shadow(&light);
        let near_target = light.position.lerp(light.shadow_target, 0.5);
        let uv = shadow.project(near_target);
        assert_relative_eq!(uv.x, 0.5, epsilon = 1e-4);
        assert_relative_eq!(uv.y, 0.5, epsilon = 1e-4);
        assert_eq!((shadow.near_z, shadow.far_z), (0.1, 3.5));
    }

    #[test]
    fn test_point_faces_cover_axes() {
        let light = PointLight {
            position: Vec3::new(-5.0, 4.5, -10.0),
            strength: Vec3::ONE,
            falloff_start: 1.0,
            falloff_end: 8.0,
        };
        let faces = point_shadows(&light);
        for (face, (direction, _)) in faces.iter().zip(CUBE_FACE_DIRECTIONS) {
            let uvz = face.project(light.position + 2.0 * direction);
            assert_relative_eq!(uvz.x, 0.5, epsilon = 1e-4);
            assert_relative_eq!(uvz.y, 0.5, epsilon = 1e-4);
            assert!(uvz.z > 0.0 && uvz.z < 1.0);
        }
    }

    #[test]
    fn test_slot_layout() {
        let rig = LightRig {
            directional: vec![DirectionalLight {
                direction: KEY_DIRECTION,
                strength: Vec3::ONE,
            }],
            spots: vec![SpotLight::default(); 2],
            points: Vec::new(),
        };
        assert_eq!(shadow_slot_count(&rig, 3), 5);
        assert_eq!(shadow_slot_count(&rig, 0), 3);

        let scene = BoundingSphere::new(Vec3::ZERO, 36.0);
        let transforms = build_shadow_transforms(&scene_camera(), &rig, &scene, 0, 2048);
        assert_eq!(transforms.len(), 3);
    }
}
