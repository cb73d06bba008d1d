//! Scene resources: materials, textures and procedural geometry.
//!
//! Everything here is CPU-side and read-only once the scene is built, except
//! material edits, which are replicated into the frame ring through
//! [`MaterialLibrary::upload_dirty`].

mod error;

pub mod geometry;
pub mod geometry_generator;
pub mod material;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use geometry::{MeshData, MeshGeometry, SubmeshGeometry};
pub use material::{Material, MaterialData, MaterialId, MaterialLibrary};
pub use texture::{TextureDesc, TextureTable};
