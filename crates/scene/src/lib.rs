//! Scene-side math for the frame pipeline.
//!
//! - [`camera`]: the first-person camera
//! - [`bounds`]: boxes, spheres and frustum containment
//! - [`light`]: light descriptions and their shader packing
//! - [`shadow`]: cascade, scene-fit, spot and point shadow transforms
//! - [`cube_camera`]: the six cameras of a dynamic cube map

pub mod bounds;
pub mod camera;
pub mod cube_camera;
pub mod light;
pub mod shadow;

pub use bounds::{Aabb, BoundingSphere, Containment, Frustum};
pub use camera::Camera;
pub use cube_camera::CubeFaceCameras;
pub use light::{DirectionalLight, Light, LightCounts, LightRig, MAX_LIGHTS, PointLight, SpotLight};
pub use shadow::{NDC_TO_TEXTURE, ShadowTransform};
