//! Error types for scene resources.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Material '{0}' is already registered")]
    DuplicateMaterial(String),

    #[error("Unknown material '{0}'")]
    UnknownMaterial(String),

    #[error("Material id {0} is out of range")]
    MaterialOutOfRange(usize),

    #[error("Submesh '{submesh}' is already part of geometry '{geometry}'")]
    DuplicateSubmesh { geometry: String, submesh: String },

    #[error("Geometry '{geometry}' has no submesh '{submesh}'")]
    UnknownSubmesh { geometry: String, submesh: String },

    #[error("Geometry '{0}' has no submeshes")]
    EmptyGeometry(String),

    #[error("Texture '{0}' is already registered")]
    DuplicateTexture(String),
}

pub type ResourceResult<T> = Result<T, ResourceError>;
