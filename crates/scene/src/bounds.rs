//! Bounding volumes and frustum containment tests.

use glam::{Mat4, Vec3, Vec4};

/// Result of a containment test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Containment {
    Disjoint,
    Intersects,
    Contains,
}

/// Axis-aligned box stored as center and half extents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub center: Vec3,
    pub extents: Vec3,
}

impl Aabb {
    pub fn new(center: Vec3, extents: Vec3) -> Self {
        Self { center, extents }
    }

    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: 0.5 * (min + max),
            extents: 0.5 * (max - min),
        }
    }

    /// Smallest box around `points`, or `None` when empty.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self::from_min_max(min, max))
    }

    #[inline]
    pub fn min(&self) -> Vec3 {
        self.center - self.extents
    }

    #[inline]
    pub fn max(&self) -> Vec3 {
        self.center + self.extents
    }

    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb::from_min_max(self.min().min(other.min()), self.max().max(other.max()))
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (min, max) = (self.min(), self.max());
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            )
        })
    }

    /// Box around the transformed corners.
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let corners = self.corners().map(|c| matrix.transform_point3(c));
        let (min, max) = corners[1..]
            .iter()
            .fold((corners[0], corners[0]), |(min, max), &p| (min.min(p), max.max(p)));
        Aabb::from_min_max(min, max)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Sphere centered on the centroid of `points`. Returns a zero sphere
    /// at the origin for an empty slice.
    pub fn from_points(points: &[Vec3]) -> Self {
        if points.is_empty() {
            return Self::new(Vec3::ZERO, 0.0);
        }
        let center = points.iter().copied().sum::<Vec3>() / points.len() as f32;
        let radius = points
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0_f32, f32::max);
        Self { center, radius }
    }
}

/// A convex view volume: six inward-facing planes plus its eight corners.
///
/// Corner `i` has x from bit 0, y from bit 1 and near/far from bit 2.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
    corners: [Vec3; 8],
}

/// Corner triples spanning each plane: left, right, bottom, top, near, far.
const PLANE_CORNERS: [[usize; 3]; 6] = [
    [0, 2, 4],
    [1, 3, 5],
    [0, 1, 4],
    [2, 3, 6],
    [0, 1, 2],
    [4, 5, 6],
];

impl Frustum {
    /// View-space frustum of a projection with 0..1 clip depth.
    pub fn from_projection(proj: &Mat4) -> Self {
        let inv_proj = proj.inverse();
        let corners = std::array::from_fn(|i| {
            let ndc = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { 0.0 } else { 1.0 },
            );
            inv_proj.project_point3(ndc)
        });
        Self::from_corners(corners)
    }

    pub fn from_corners(corners: [Vec3; 8]) -> Self {
        let centroid = corners.iter().copied().sum::<Vec3>() / 8.0;
        let planes = PLANE_CORNERS.map(|[a, b, c]| {
            let (a, b, c) = (corners[a], corners[b], corners[c]);
            let normal = (b - a).cross(c - a).normalize();
            let plane = normal.extend(-normal.dot(a));
            if plane.dot(centroid.extend(1.0)) < 0.0 {
                -plane
            } else {
                plane
            }
        });
        Self { planes, corners }
    }

    /// The same volume expressed in another space.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self::from_corners(self.corners.map(|c| matrix.transform_point3(c)))
    }

    #[inline]
    pub fn corners(&self) -> &[Vec3; 8] {
        &self.corners
    }

    #[inline]
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.dot(point.extend(1.0)) >= 0.0)
    }

    pub fn contains_aabb(&self, aabb: &Aabb) -> Containment {
        let mut intersects = false;
        for plane in &self.planes {
            let normal = plane.truncate();
            let distance = normal.dot(aabb.center) + plane.w;
            let radius = aabb.extents.dot(normal.abs());
            if distance + radius < 0.0 {
                return Containment::Disjoint;
            }
            if distance - radius < 0.0 {
                intersects = true;
            }
        }
        if intersects {
            Containment::Intersects
        } else {
            Containment::Contains
        }
    }
}
