//! CPU-side mesh geometry with named submeshes.
//!
//! Several meshes are concatenated into one [`MeshGeometry`] so they share a
//! vertex and an index buffer. Each [`SubmeshGeometry`] is the draw range of
//! one original mesh plus its local-space bounds.

use std::collections::BTreeMap;

use glam::Vec3;
use prism_rhi::vertex::Vertex;
use prism_scene::Aabb;
use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// One indexed triangle mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(|v| v.position))
            .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO))
    }
}

/// Draw range of a submesh inside its geometry's buffers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubmeshGeometry {
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
    pub bounds: Aabb,
}

/// Vertices and indices of several submeshes packed back to back.
#[derive(Clone, Debug)]
pub struct MeshGeometry {
    name: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    submeshes: BTreeMap<String, SubmeshGeometry>,
}

impl MeshGeometry {
    pub fn builder(name: impl Into<String>) -> MeshGeometryBuilder {
        MeshGeometryBuilder {
            name: name.into(),
            meshes: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn submesh(&self, name: &str) -> Option<&SubmeshGeometry> {
        self.submeshes.get(name)
    }

    pub fn submeshes(&self) -> impl Iterator<Item = (&str, &SubmeshGeometry)> {
        self.submeshes.iter().map(|(name, sub)| (name.as_str(), sub))
    }
}

/// Collects named meshes for a [`MeshGeometry`].
pub struct MeshGeometryBuilder {
    name: String,
    meshes: Vec<(String, MeshData)>,
}

impl MeshGeometryBuilder {
    pub fn submesh(mut self, name: impl Into<String>, mesh: MeshData) -> Self {
        self.meshes.push((name.into(), mesh));
        self
    }

    pub fn build(self) -> ResourceResult<MeshGeometry> {
        if self.meshes.is_empty() {
            return Err(ResourceError::EmptyGeometry(self.name));
        }

        let vertex_total = self.meshes.iter().map(|(_, m)| m.vertices.len()).sum();
        let index_total = self.meshes.iter().map(|(_, m)| m.indices.len()).sum();
        let mut vertices = Vec::with_capacity(vertex_total);
        let mut indices = Vec::with_capacity(index_total);
        let mut submeshes = BTreeMap::new();

        for (submesh_name, mesh) in self.meshes {
            let submesh = SubmeshGeometry {
                index_count: mesh.indices.len() as u32,
                start_index: indices.len() as u32,
                base_vertex: vertices.len() as i32,
                bounds: mesh.bounds(),
            };
            if submeshes.insert(submesh_name.clone(), submesh).is_some() {
                return Err(ResourceError::DuplicateSubmesh {
                    geometry: self.name,
                    submesh: submesh_name,
                });
            }
            vertices.extend_from_slice(&mesh.vertices);
            indices.extend_from_slice(&mesh.indices);
        }

        debug!(
            "Built geometry '{}': {} vertices, {} indices, {} submeshes",
            self.name,
            vertices.len(),
            indices.len(),
            submeshes.len()
        );
        Ok(MeshGeometry {
            name: self.name,
            vertices,
            indices,
            submeshes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry_generator as shapes;

    #[test]
    fn test_submesh_ranges_are_contiguous() {
        let cube = shapes::create_box(1.0, 1.0, 1.0);
        let grid = shapes::create_grid(20.0, 30.0, 4, 5);
        let geometry = MeshGeometry::builder("shapes")
            .submesh("box", cube.clone())
            .submesh("grid", grid.clone())
            .build()
            .unwrap();

        let b = geometry.submesh("box").unwrap();
        let g = geometry.submesh("grid").unwrap();
        assert_eq!((b.start_index, b.base_vertex), (0, 0));
        assert_eq!(g.start_index, cube.indices.len() as u32);
        assert_eq!(g.base_vertex, cube.vertices.len() as i32);
        assert_eq!(
            geometry.indices().len(),
            cube.indices.len() + grid.indices.len()
        );
        assert_eq!(g.bounds.extents, Vec3::new(10.0, 0.0, 15.0));
    }

    #[test]
    fn test_duplicate_submesh_rejected() {
        let result = MeshGeometry::builder("shapes")
            .submesh("box", shapes::create_box(1.0, 1.0, 1.0))
            .submesh("box", shapes::create_box(2.0, 2.0, 2.0))
            .build();
        assert!(matches!(
            result,
            Err(ResourceError::DuplicateSubmesh { .. })
        ));
    }

    #[test]
    fn test_empty_geometry_rejected() {
        assert_eq!(
            MeshGeometry::builder("nothing").build().err(),
            Some(ResourceError::EmptyGeometry("nothing".to_string()))
        );
    }
}
