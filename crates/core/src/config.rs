//! Renderer configuration.
//!
//! [`RenderConfig`] is read once at startup and handed to the frame pipeline
//! by value. Nothing toggles it afterwards: the pass topology of a running
//! renderer is fixed by the config it was built with.
//!
//! # Example
//!
//! ```
//! use prism_core::{RenderConfig, ShadingPath};
//!
//! let config = RenderConfig::from_toml_str(
//!     r#"
//!     shading = "forward"
//!     ssao = false
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.shading, ShadingPath::Forward);
//! assert_eq!(config.frames_in_flight, 3);
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};

/// Upper bound on ring depth accepted by [`RenderConfig::validate`].
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Size of the shadow transform array in the pass constants.
pub const MAX_SHADOW_TRANSFORMS: usize = 12;

/// Faces of a cube map.
pub const CUBE_FACE_COUNT: usize = 6;

/// How the main color pass shades opaque geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadingPath {
    /// G-buffer fill followed by a full-screen lighting composite.
    Deferred,
    /// Opaque items are shaded directly into the backbuffer.
    Forward,
}

/// Initial window parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "prism".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Immutable pipeline configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Depth of the frame-resource ring.
    pub frames_in_flight: usize,
    pub shading: ShadingPath,
    /// Cull scene instances against the camera frustum.
    pub frustum_culling: bool,
    /// Enables the normal/depth pre-pass and the ambient occlusion pass.
    pub ssao: bool,
    /// Horizontal+vertical blur iterations applied to the ambient map.
    pub ssao_blur_count: u32,
    /// Re-render the reflection cube map every frame.
    pub dynamic_cube_map: bool,
    pub cube_map_size: u32,
    pub shadow_map_size: u32,
    /// Directional light cascades. Zero fits one map to the whole scene.
    pub cascade_count: usize,
    /// Draw the first shadow map into a corner quad.
    pub show_shadow_debug: bool,
    pub vsync: bool,
    pub window: WindowConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            shading: ShadingPath::Deferred,
            frustum_culling: true,
            ssao: true,
            ssao_blur_count: 3,
            dynamic_cube_map: true,
            cube_map_size: 512,
            shadow_map_size: 2048,
            cascade_count: 3,
            show_shadow_debug: false,
            vsync: true,
            window: WindowConfig::default(),
        }
    }
}

impl RenderConfig {
    /// Parses and validates a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        info!("Loaded render config from {}", path.display());
        Ok(config)
    }

    /// Rejects configurations the frame pipeline cannot be built from.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::Config(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }
        if self.cube_map_size == 0 || self.shadow_map_size == 0 {
            return Err(Error::Config(
                "cube_map_size and shadow_map_size must be non-zero".to_string(),
            ));
        }
        if self.cascade_count > MAX_SHADOW_TRANSFORMS {
            return Err(Error::Config(format!(
                "cascade_count {} exceeds the {} shadow transforms available",
                self.cascade_count, MAX_SHADOW_TRANSFORMS
            )));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config("window size must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Whether the G-buffer pass runs.
    #[inline]
    pub fn is_deferred(&self) -> bool {
        self.shading == ShadingPath::Deferred
    }

    /// Shadow slots taken by the directional light.
    #[inline]
    pub fn directional_shadow_slots(&self) -> usize {
        self.cascade_count.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RenderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frames_in_flight, 3);
        assert!(config.is_deferred());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RenderConfig::from_toml_str(
            r#"
            frustum_culling = false
            cascade_count = 0

            [window]
            width = 800
            "#,
        )
        .unwrap();

        assert!(!config.frustum_culling);
        assert_eq!(config.directional_shadow_slots(), 1);
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.shadow_map_size, 2048);
    }

    #[test]
    fn test_zero_frames_in_flight_rejected() {
        let err = RenderConfig::from_toml_str("frames_in_flight = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = RenderConfig::from_toml_str("deferred = true").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_too_many_cascades_rejected() {
        let config = RenderConfig {
            cascade_count: MAX_SHADOW_TRANSFORMS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
