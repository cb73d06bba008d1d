//! First-person camera.
//!
//! The scene is left-handed: +x right, +y up, +z into the screen. Clip-space
//! depth runs 0..1 and clip-space +y maps to the top of the render target.

use glam::{Mat4, Vec3};

/// A free-look camera with an orthonormal right/up/look basis.
#[derive(Clone, Debug)]
pub struct Camera {
    position: Vec3,
    right: Vec3,
    up: Vec3,
    look: Vec3,

    near_z: f32,
    far_z: f32,
    aspect: f32,
    fov_y: f32,

    view: Mat4,
    proj: Mat4,
    view_dirty: bool,
}

impl Default for Camera {
    fn default() -> Self {
        let mut camera = Self {
            position: Vec3::ZERO,
            right: Vec3::X,
            up: Vec3::Y,
            look: Vec3::Z,
            near_z: 0.0,
            far_z: 0.0,
            aspect: 0.0,
            fov_y: 0.0,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            view_dirty: true,
        };
        camera.set_lens(0.25 * std::f32::consts::PI, 1.0, 1.0, 1000.0);
        camera.update_view_matrix();
        camera
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.view_dirty = true;
    }

    #[inline]
    pub fn look(&self) -> Vec3 {
        self.look
    }

    #[inline]
    pub fn right(&self) -> Vec3 {
        self.right
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.up
    }

    #[inline]
    pub fn near_z(&self) -> f32 {
        self.near_z
    }

    #[inline]
    pub fn far_z(&self) -> f32 {
        self.far_z
    }

    #[inline]
    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    #[inline]
    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    /// Sets the perspective frustum. Called on every resize.
    pub fn set_lens(&mut self, fov_y: f32, aspect: f32, near_z: f32, far_z: f32) {
        self.fov_y = fov_y;
        self.aspect = aspect;
        self.near_z = near_z;
        self.far_z = far_z;
        self.proj = Mat4::perspective_lh(fov_y, aspect, near_z, far_z);
    }

    /// Points the camera at `target`, rebuilding the basis from `world_up`.
    pub fn look_at(&mut self, position: Vec3, target: Vec3, world_up: Vec3) {
        let look = (target - position).normalize();
        let right = world_up.cross(look).normalize();
        self.position = position;
        self.look = look;
        self.right = right;
        self.up = look.cross(right);
        self.view_dirty = true;
    }

    /// Moves along the right vector.
    pub fn strafe(&mut self, distance: f32) {
        self.position += distance * self.right;
        self.view_dirty = true;
    }

    /// Moves along the look vector.
    pub fn walk(&mut self, distance: f32) {
        self.position += distance * self.look;
        self.view_dirty = true;
    }

    /// Rotates up and look about the right vector. Positive looks down.
    pub fn pitch(&mut self, angle: f32) {
        let rotation = Mat4::from_axis_angle(self.right, angle);
        self.up = rotation.transform_vector3(self.up);
        self.look = rotation.transform_vector3(self.look);
        self.view_dirty = true;
    }

    /// Rotates the basis about the world y axis. Positive turns right.
    pub fn rotate_y(&mut self, angle: f32) {
        let rotation = Mat4::from_rotation_y(angle);
        self.right = rotation.transform_vector3(self.right);
        self.up = rotation.transform_vector3(self.up);
        self.look = rotation.transform_vector3(self.look);
        self.view_dirty = true;
    }

    /// Re-orthonormalizes the basis and rebuilds the view matrix if needed.
    pub fn update_view_matrix(&mut self) {
        if !self.view_dirty {
            return;
        }
        self.look = self.look.normalize();
        self.up = self.look.cross(self.right).normalize();
        self.right = self.up.cross(self.look);
        self.view = Mat4::look_to_lh(self.position, self.look, self.up);
        self.view_dirty = false;
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        debug_assert!(!self.view_dirty, "view matrix read before update");
        self.view
    }

    #[inline]
    pub fn proj(&self) -> Mat4 {
        self.proj
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera_at(position: Vec3) -> Camera {
        let mut camera = Camera::new();
        camera.set_position(position);
        camera.update_view_matrix();
        camera
    }

    #[test]
    fn test_default_lens() {
        let camera = Camera::new();
        assert_relative_eq!(camera.fov_y(), 0.25 * std::f32::consts::PI);
        assert_eq!(camera.near_z(), 1.0);
        assert_eq!(camera.far_z(), 1000.0);
    }

    #[test]
    fn test_walk_moves_along_look() {
        let mut camera = camera_at(Vec3::new(0.0, 2.0, -15.0));
        camera.walk(10.0);
        camera.update_view_matrix();
        assert_relative_eq!(camera.position().z, -5.0, epsilon = 1e-5);
        assert_relative_eq!(camera.position().y, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_view_maps_forward_point_to_positive_z() {
        let camera = camera_at(Vec3::new(0.0, 2.0, -15.0));
        let ahead = camera.view().transform_point3(Vec3::new(1.0, 2.0, -5.0));
        assert_relative_eq!(ahead.z, 10.0, epsilon = 1e-4);
        assert_relative_eq!(ahead.x, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_rotate_y_turns_right() {
        let mut camera = camera_at(Vec3::ZERO);
        camera.rotate_y(0.5);
        camera.update_view_matrix();
        assert!(camera.look().x > 0.0);
    }

    #[test]
    fn test_positive_pitch_looks_down() {
        let mut camera = camera_at(Vec3::ZERO);
        camera.pitch(0.3);
        camera.update_view_matrix();
        assert!(camera.look().y < 0.0);
    }

    #[test]
    fn test_rotate_keeps_basis_orthonormal() {
        let mut camera = camera_at(Vec3::ZERO);
        camera.rotate_y(0.7);
        camera.pitch(0.3);
        camera.update_view_matrix();
        assert_relative_eq!(camera.look().length(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(camera.look().dot(camera.up()), 0.0, epsilon = 1e-5);
        assert_relative_eq!(camera.right().dot(camera.up()), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_look_at_target() {
        let mut camera = Camera::new();
        camera.look_at(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::Y);
        camera.update_view_matrix();
        assert_relative_eq!(camera.look().x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(camera.up().y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(camera.right().z, -1.0, epsilon = 1e-6);
    }
}
