//! Light definitions for the scene.
//!
//! [`DirectionalLight`], [`PointLight`] and [`SpotLight`] describe lights on
//! the CPU side. [`LightRig::gpu_lights`] packs them into the fixed-size
//! [`Light`] array carried by the pass constants, ordered directional, then
//! point, then spot.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Capacity of the light array in the pass constants.
pub const MAX_LIGHTS: usize = 16;

/// Shader-side light record (48 bytes, std140 compatible).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Light {
    pub strength: Vec3,
    /// Point and spot only.
    pub falloff_start: f32,
    /// Directional and spot only.
    pub direction: Vec3,
    /// Point and spot only.
    pub falloff_end: f32,
    /// Point and spot only.
    pub position: Vec3,
    /// Spot only.
    pub spot_power: f32,
}

/// A directional light (sun-like).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels, normalized.
    pub direction: Vec3,
    pub strength: Vec3,
}

/// A point light (omnidirectional). Casts shadows through six cube faces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub strength: Vec3,
    pub falloff_start: f32,
    pub falloff_end: f32,
}

/// A spot light (cone-shaped).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub strength: Vec3,
    pub falloff_start: f32,
    pub falloff_end: f32,
    pub spot_power: f32,
    /// Point the shadow view looks at.
    pub shadow_target: Vec3,
    /// Up vector for the shadow view; must not be parallel to the view.
    pub shadow_up: Vec3,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            strength: Vec3::ONE,
            falloff_start: 1.0,
            falloff_end: 10.0,
            spot_power: 8.0,
            shadow_target: Vec3::NEG_Y,
            shadow_up: Vec3::Z,
        }
    }
}

/// Number of lights of each kind in a packed array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LightCounts {
    pub directional: u32,
    pub point: u32,
    pub spot: u32,
}

/// Every light in the scene. The first directional light is the key light
/// and is the only directional light that casts shadows.
#[derive(Clone, Debug, Default)]
pub struct LightRig {
    pub directional: Vec<DirectionalLight>,
    pub points: Vec<PointLight>,
    pub spots: Vec<SpotLight>,
}

impl LightRig {
    pub fn key_light(&self) -> Option<&DirectionalLight> {
        self.directional.first()
    }

    pub fn len(&self) -> usize {
        self.directional.len() + self.points.len() + self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Packs the rig into the shader array. Lights past [`MAX_LIGHTS`] are
    /// dropped and not counted.
    pub fn gpu_lights(&self) -> ([Light; MAX_LIGHTS], LightCounts) {
        let mut lights = [Light::default(); MAX_LIGHTS];
        let mut counts = LightCounts::default();
        let mut slot = 0;

        for light in &self.directional {
            if slot == MAX_LIGHTS {
                break;
            }
            lights[slot] = Light {
                strength: light.strength,
                direction: light.direction,
                ..Default::default()
            };
            slot += 1;
            counts.directional += 1;
        }
        for light in &self.points {
            if slot == MAX_LIGHTS {
                break;
            }
            lights[slot] = Light {
                strength: light.strength,
                falloff_start: light.falloff_start,
                falloff_end: light.falloff_end,
                position: light.position,
                ..Default::default()
            };
            slot += 1;
            counts.point += 1;
        }
        for light in &self.spots {
            if slot == MAX_LIGHTS {
                break;
            }
            lights[slot] = Light {
                strength: light.strength,
                falloff_start: light.falloff_start,
                direction: light.direction,
                falloff_end: light.falloff_end,
                position: light.position,
                spot_power: light.spot_power,
            };
            slot += 1;
            counts.spot += 1;
        }
        (lights, counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_layout() {
        assert_eq!(std::mem::size_of::<Light>(), 48);
        assert_eq!(std::mem::offset_of!(Light, direction), 16);
        assert_eq!(std::mem::offset_of!(Light, position), 32);
    }

    #[test]
    fn test_gpu_lights_order() {
        let rig = LightRig {
            directional: vec![DirectionalLight {
                direction: Vec3::new(0.57735, -0.57735, 0.57735),
                strength: Vec3::new(2.9, 2.8, 2.7),
            }],
            points: vec![PointLight {
                position: Vec3::Y,
                strength: Vec3::ONE,
                falloff_start: 1.0,
                falloff_end: 8.0,
            }],
            spots: vec![SpotLight {
                spot_power: 4.0,
                ..Default::default()
            }],
        };
        let (lights, counts) = rig.gpu_lights();
        assert_eq!(
            counts,
            LightCounts {
                directional: 1,
                point: 1,
                spot: 1
            }
        );
        assert_eq!(lights[0].strength, Vec3::new(2.9, 2.8, 2.7));
        assert_eq!(lights[1].falloff_end, 8.0);
        assert_eq!(lights[2].spot_power, 4.0);
        assert_eq!(lights[3], Light::default());
    }

    #[test]
    fn test_gpu_lights_truncates() {
        let rig = LightRig {
            points: vec![
                PointLight {
                    position: Vec3::ZERO,
                    strength: Vec3::ONE,
                    falloff_start: 1.0,
                    falloff_end: 2.0,
                };
                20
            ],
            ..Default::default()
        };
        let (_, counts) = rig.gpu_lights();
        assert_eq!(counts.point as usize, MAX_LIGHTS);
        assert_eq!(rig.len(), 20);
    }
}
