//! Procedural meshes.
//!
//! All shapes are centered at the origin in the left-handed scene space and
//! wind their triangles clockwise when seen from outside.

use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};
use prism_rhi::vertex::Vertex;

use crate::geometry::MeshData;

/// Box faces as (outward normal, tangent along +u).
const BOX_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::NEG_Z, Vec3::X),
    (Vec3::Z, Vec3::NEG_X),
    (Vec3::Y, Vec3::X),
    (Vec3::NEG_Y, Vec3::NEG_X),
    (Vec3::NEG_X, Vec3::NEG_Z),
    (Vec3::X, Vec3::Z),
];

/// A box with four vertices per face.
pub fn create_box(width: f32, height: f32, depth: f32) -> MeshData {
    let half = 0.5 * Vec3::new(width, height, depth);
    let corner_uvs = [
        Vec2::new(0.0, 1.0),
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
    ];

    let mut mesh = MeshData::default();
    for (face, (normal, tangent)) in BOX_FACES.into_iter().enumerate() {
        let up = tangent.cross(normal);
        for uv in corner_uvs {
            let position = half
                * (normal + (2.0 * uv.x - 1.0) * tangent + (1.0 - 2.0 * uv.y) * up);
            mesh.vertices
                .push(Vertex::new(position, normal, uv, tangent));
        }
        let base = 4 * face as u32;
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

/// A UV sphere. Poles get a single vertex each.
pub fn create_sphere(radius: f32, slice_count: u32, stack_count: u32) -> MeshData {
    let mut mesh = MeshData::default();
    mesh.vertices.push(Vertex::new(
        Vec3::new(0.0, radius, 0.0),
        Vec3::Y,
        Vec2::ZERO,
        Vec3::X,
    ));

    let phi_step = PI / stack_count as f32;
    let theta_step = TAU / slice_count as f32;
    for i in 1..stack_count {
        let phi = i as f32 * phi_step;
        for j in 0..=slice_count {
            let theta = j as f32 * theta_step;
            let position = radius
                * Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
            let tangent = Vec3::new(-phi.sin() * theta.sin(), 0.0, phi.sin() * theta.cos())
                .normalize();
            mesh.vertices.push(Vertex::new(
                position,
                position.normalize(),
                Vec2::new(theta / TAU, phi / PI),
                tangent,
            ));
        }
    }
    mesh.vertices.push(Vertex::new(
        Vec3::new(0.0, -radius, 0.0),
        Vec3::NEG_Y,
        Vec2::new(0.0, 1.0),
        Vec3::X,
    ));

    for i in 1..=slice_count {
        mesh.indices.extend_from_slice(&[0, i + 1, i]);
    }

    let base = 1;
    let ring = slice_count + 1;
    for i in 0..stack_count.saturating_sub(2) {
        for j in 0..slice_count {
            let a = base + i * ring + j;
            let b = base + (i + 1) * ring + j;
            mesh.indices
                .extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
        }
    }

    let south = mesh.vertices.len() as u32 - 1;
    let base = south - ring;
    for i in 0..slice_count {
        mesh.indices
            .extend_from_slice(&[south, base + i, base + i + 1]);
    }
    mesh
}

/// A capped cylinder or cone frustum along +y.
pub fn create_cylinder(
    bottom_radius: f32,
    top_radius: f32,
    height: f32,
    slice_count: u32,
    stack_count: u32,
) -> MeshData {
    let mut mesh = MeshData::default();
    let stack_height = height / stack_count as f32;
    let radius_step = (top_radius - bottom_radius) / stack_count as f32;
    let theta_step = TAU / slice_count as f32;

    for i in 0..=stack_count {
        let y = -0.5 * height + i as f32 * stack_height;
        let r = bottom_radius + i as f32 * radius_step;
        for j in 0..=slice_count {
            let (s, c) = (j as f32 * theta_step).sin_cos();
            let tangent = Vec3::new(-s, 0.0, c);
            let dr = bottom_radius - top_radius;
            let bitangent = Vec3::new(dr * c, -height, dr * s);
            mesh.vertices.push(Vertex::new(
                Vec3::new(r * c, y, r * s),
                tangent.cross(bitangent).normalize(),
                Vec2::new(
                    j as f32 / slice_count as f32,
                    1.0 - i as f32 / stack_count as f32,
                ),
                tangent,
            ));
        }
    }

    let ring = slice_count + 1;
    for i in 0..stack_count {
        for j in 0..slice_count {
            let a = i * ring + j;
            let b = (i + 1) * ring + j;
            mesh.indices
                .extend_from_slice(&[a, b, b + 1, a, b + 1, a + 1]);
        }
    }

    add_cylinder_cap(&mut mesh, top_radius, height, slice_count, true);
    add_cylinder_cap(&mut mesh, bottom_radius, height, slice_count, false);
    mesh
}

fn add_cylinder_cap(mesh: &mut MeshData, radius: f32, height: f32, slice_count: u32, top: bool) {
    let base = mesh.vertices.len() as u32;
    let (y, normal) = if top {
        (0.5 * height, Vec3::Y)
    } else {
        (-0.5 * height, Vec3::NEG_Y)
    };
    let theta_step = TAU / slice_count as f32;

    for i in 0..=slice_count {
        let (s, c) = (i as f32 * theta_step).sin_cos();
        let (x, z) = (radius * c, radius * s);
        let uv = Vec2::new(x / height + 0.5, z / height + 0.5);
        mesh.vertices
            .push(Vertex::new(Vec3::new(x, y, z), normal, uv, Vec3::X));
    }
    mesh.vertices.push(Vertex::new(
        Vec3::new(0.0, y, 0.0),
        normal,
        Vec2::splat(0.5),
        Vec3::X,
    ));

    let center = mesh.vertices.len() as u32 - 1;
    for i in 0..slice_count {
        if top {
            mesh.indices
                .extend_from_slice(&[center, base + i + 1, base + i]);
        } else {
            mesh.indices
                .extend_from_slice(&[center, base + i, base + i + 1]);
        }
    }
}

/// An `m` x `n` vertex grid in the xz-plane, facing +y.
pub fn create_grid(width: f32, depth: f32, m: u32, n: u32) -> MeshData {
    let mut mesh = MeshData::default();
    let dx = width / (n - 1) as f32;
    let dz = depth / (m - 1) as f32;
    let du = 1.0 / (n - 1) as f32;
    let dv = 1.0 / (m - 1) as f32;

    for i in 0..m {
        let z = 0.5 * depth - i as f32 * dz;
        for j in 0..n {
            let x = -0.5 * width + j as f32 * dx;
            mesh.vertices.push(Vertex::new(
                Vec3::new(x, 0.0, z),
                Vec3::Y,
                Vec2::new(j as f32 * du, i as f32 * dv),
                Vec3::X,
            ));
        }
    }

    for i in 0..m - 1 {
        for j in 0..n - 1 {
            let a = i * n + j;
            let b = (i + 1) * n + j;
            mesh.indices
                .extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
        }
    }
    mesh
}

/// A screen-aligned quad with its top-left corner at (`x`, `y`), facing -z.
pub fn create_quad(x: f32, y: f32, width: f32, height: f32, depth: f32) -> MeshData {
    let corner = |px: f32, py: f32, u: f32, v: f32| {
        Vertex::new(Vec3::new(px, py, depth), Vec3::NEG_Z, Vec2::new(u, v), Vec3::X)
    };
    MeshData {
        vertices: vec![
            corner(x, y - height, 0.0, 1.0),
            corner(x, y, 0.0, 0.0),
            corner(x + width, y, 1.0, 0.0),
            corner(x + width, y - height, 1.0, 1.0),
        ],
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}
