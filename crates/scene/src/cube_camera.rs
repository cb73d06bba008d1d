//! Cameras for rendering a dynamic cube map.

use glam::Vec3;

use crate::camera::Camera;
use crate::shadow::CUBE_FACE_DIRECTIONS;

/// Six 90° cameras sharing one center, in cube face order +X, -X, +Y, -Y,
/// +Z, -Z.
#[derive(Clone, Debug)]
pub struct CubeFaceCameras {
    center: Vec3,
    faces: [Camera; 6],
}

impl CubeFaceCameras {
    pub const NEAR_Z: f32 = 0.1;
    pub const FAR_Z: f32 = 1000.0;

    pub fn new(center: Vec3) -> Self {
        let faces = CUBE_FACE_DIRECTIONS.map(|(direction, up)| {
            let mut camera = Camera::new();
            camera.look_at(center, center + direction, up);
            camera.set_lens(0.5 * std::f32::consts::PI, 1.0, Self::NEAR_Z, Self::FAR_Z);
            camera.update_view_matrix();
            camera
        });
        Self { center, faces }
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        self.center
    }

    #[inline]
    pub fn faces(&self) -> &[Camera; 6] {
        &self.faces
    }

    #[inline]
    pub fn face(&self, index: usize) -> &Camera {
        &self.faces[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_faces_look_along_axes() {
        let cameras = CubeFaceCameras::new(Vec3::new(0.0, 2.0, -3.0));
        assert_relative_eq!(cameras.face(0).look(), Vec3::X, epsilon = 1e-6);
        assert_relative_eq!(cameras.face(3).look(), Vec3::NEG_Y, epsilon = 1e-6);
        assert_relative_eq!(cameras.face(5).look(), Vec3::NEG_Z, epsilon = 1e-6);
        for face in cameras.faces() {
            assert_eq!(face.position(), Vec3::new(0.0, 2.0, -3.0));
            assert_relative_eq!(face.aspect(), 1.0);
        }
    }

    #[test]
    fn test_face_centers_project_to_middle() {
        let cameras = CubeFaceCameras::new(Vec3::ZERO);
        for (camera, (direction, _)) in cameras.faces().iter().zip(CUBE_FACE_DIRECTIONS) {
            let ndc = camera.view_proj().project_point3(10.0 * direction);
            assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
            assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        }
    }
}
