//! The procedural demo scene.
//!
//! A tiled floor, a flare-textured box, two crates, five pairs of brick
//! columns topped with mirror spheres, a mirror globe that reflects the
//! dynamic cube map, the sky sphere and the shadow-map debug quad. The items
//! seen by the cube-map cameras are duplicated after the scene items so
//! their instances are never culled against the main camera.

use glam::{Mat4, Quat, Vec3, Vec4};
use prism_core::RenderConfig;
use prism_resources::geometry_generator::{create_box, create_cylinder, create_grid, create_quad, create_sphere};
use prism_resources::{Material, MaterialId, MaterialLibrary, MeshGeometry, ResourceError, SubmeshGeometry, TextureTable};
use prism_scene::{BoundingSphere, DirectionalLight, LightRig, SpotLight};
use tracing::info;

use crate::error::RendererResult;
use crate::frame_core::FrameScene;
use crate::render_item::{GeometryId, InstanceRecord, RenderItem, RenderItems, RenderLayer};

/// Id of the shared shape geometry.
pub const SHAPES: GeometryId = 0;

pub const AMBIENT_LIGHT: Vec4 = Vec4::new(0.25, 0.25, 0.35, 1.0);
pub const CAMERA_START: Vec3 = Vec3::new(0.0, 2.0, -15.0);
pub const GLOBE_CENTER: Vec3 = Vec3::new(0.0, 2.0, -3.0);

const COLUMN_ROWS: usize = 5;
const SKY_SCALE: f32 = 5000.0;

/// Placeholder colours of the demo textures, in table order.
const TEXTURES: [(&str, [u8; 4]); 12] = [
    ("bricks", [150, 72, 52, 255]),
    ("bricks_normal", [128, 128, 255, 255]),
    ("stone", [128, 124, 118, 255]),
    ("tile", [210, 210, 200, 255]),
    ("tile_normal", [128, 128, 255, 255]),
    ("crate", [160, 120, 70, 255]),
    ("crate02", [130, 95, 55, 255]),
    ("flare", [240, 200, 90, 255]),
    ("flare_normal", [128, 128, 255, 255]),
    ("ice", [200, 225, 245, 255]),
    ("default", [255, 255, 255, 255]),
    ("default_normal", [128, 128, 255, 255]),
];

/// Everything the renderer uploads once at startup, plus the frame scene.
pub struct DemoScene {
    pub frame: FrameScene,
    /// Geometry table; index [`SHAPES`] is the only entry.
    pub geometries: Vec<MeshGeometry>,
    pub textures: TextureTable,
}

pub fn build(config: &RenderConfig) -> RendererResult<DemoScene> {
    let shapes = MeshGeometry::builder("shapes")
        .submesh("box", create_box(1.0, 1.0, 1.0))
        .submesh("grid", create_grid(20.0, 30.0, 60, 40))
        .submesh("sphere", create_sphere(0.5, 20, 20))
        .submesh("cylinder", create_cylinder(0.5, 0.3, 3.0, 20, 20))
        .submesh("quad", create_quad(0.0, 0.0, 1.0, 1.0, 0.0))
        .build()?;

    let mut textures = TextureTable::new();
    for (name, color) in TEXTURES {
        textures.insert(name, color)?;
    }

    let materials = build_materials(config.frames_in_flight, &textures)?;
    let items = build_items(&shapes, &materials)?;

    info!(
        "Built demo scene: {} render items ({} scene), {} materials, {} textures",
        items.len(),
        items.scene_item_count(),
        materials.len(),
        textures.len()
    );

    Ok(DemoScene {
        frame: FrameScene {
            items,
            materials,
            lights: lights(),
            ambient_light: AMBIENT_LIGHT,
            bounds: BoundingSphere::new(Vec3::ZERO, (20.0f32 * 20.0 + 30.0 * 30.0).sqrt()),
            cube_center: GLOBE_CENTER,
            camera_position: CAMERA_START,
        },
        geometries: vec![shapes],
        textures,
    })
}

fn build_materials(ring_slots: usize, textures: &TextureTable) -> RendererResult<MaterialLibrary> {
    let texture = |name: &str| textures.index(name).unwrap_or(0);

    let mut library = MaterialLibrary::new(ring_slots);
    library.insert(Material {
        diffuse_map_index: texture("bricks"),
        normal_map_index: texture("bricks_normal"),
        fresnel_r0: Vec3::splat(0.1),
        roughness: 0.5,
        metalness: 0.3,
        ..Material::new("bricks0")
    })?;
    library.insert(Material {
        diffuse_map_index: texture("stone"),
        normal_map_index: texture("default_normal"),
        fresnel_r0: Vec3::splat(0.05),
        roughness: 0.3,
        ..Material::new("stone0")
    })?;
    library.insert(Material {
        diffuse_map_index: texture("tile"),
        normal_map_index: texture("tile_normal"),
        diffuse_albedo: Vec4::new(0.9, 0.9, 0.9, 1.0),
        fresnel_r0: Vec3::splat(0.2),
        roughness: 0.5,
        metalness: 0.2,
        ..Material::new("tile0")
    })?;
    for (name, map) in [("crate0", "crate"), ("crate1", "crate02")] {
        library.insert(Material {
            diffuse_map_index: texture(map),
            normal_map_index: texture("default_normal"),
            fresnel_r0: Vec3::splat(0.05),
            roughness: 0.2,
            ..Material::new(name)
        })?;
    }
    library.insert(Material {
        diffuse_map_index: texture("flare"),
        normal_map_index: texture("flare_normal"),
        fresnel_r0: Vec3::splat(0.05),
        roughness: 0.2,
        metalness: 0.12,
        ..Material::new("flare")
    })?;
    library.insert(Material {
        diffuse_map_index: texture("ice"),
        normal_map_index: texture("default_normal"),
        fresnel_r0: Vec3::splat(0.05),
        roughness: 0.2,
        ..Material::new("ice")
    })?;
    library.insert(Material {
        diffuse_map_index: texture("default"),
        normal_map_index: texture("default_normal"),
        fresnel_r0: Vec3::splat(0.05),
        roughness: 0.1,
        ..Material::new("default")
    })?;
    library.insert(Material {
        diffuse_map_index: texture("default"),
        normal_map_index: texture("default_normal"),
        fresnel_r0: Vec3::splat(0.95),
        roughness: 0.1,
        metalness: 0.95,
        ..Material::new("mirror")
    })?;
    library.insert(Material {
        diffuse_map_index: texture("default"),
        normal_map_index: texture("default_normal"),
        roughness: 1.0,
        ..Material::new("sky")
    })?;
    Ok(library)
}

fn submesh<'a>(shapes: &'a MeshGeometry, name: &str) -> RendererResult<&'a SubmeshGeometry> {
    shapes.submesh(name).ok_or_else(|| {
        ResourceError::UnknownSubmesh {
            geometry: shapes.name().to_string(),
            submesh: name.to_string(),
        }
        .into()
    })
}

/// Opaque items in both the main and the cube-map views.
struct SharedItems {
    opaque: Vec<RenderItem>,
    sky: RenderItem,
}

fn shared_items(shapes: &MeshGeometry, materials: &MaterialLibrary) -> RendererResult<SharedItems> {
    let mat = |name: &str| -> RendererResult<MaterialId> { Ok(materials.id(name)?) };
    let item = |name: &str, material: MaterialId| -> RendererResult<RenderItem> {
        Ok(RenderItem::new(SHAPES, submesh(shapes, name)?, material))
    };

    let flare = mat("flare")?;
    let box_item = item("box", flare)?.with_instance(InstanceRecord::new(
        Mat4::from_scale_rotation_translation(Vec3::splat(2.0), Quat::IDENTITY, Vec3::new(2.0, 1.0, 0.0)),
        flare,
    ));

    let tile = mat("tile0")?;
    let grid = item("grid", tile)?.with_instance(
        InstanceRecord::new(Mat4::from_scale(Vec3::splat(2.0)), tile)
            .with_tex_transform(Mat4::from_scale(Vec3::new(8.0, 8.0, 1.0))),
    );

    let crates = item("box", mat("crate0")?)?.with_instances([
        InstanceRecord::new(Mat4::from_translation(Vec3::new(-3.0, 0.5, 0.0)), mat("crate0")?),
        InstanceRecord::new(
            Mat4::from_scale_rotation_translation(Vec3::splat(0.75), Quat::IDENTITY, Vec3::new(-3.0, 1.375, 0.0)),
            mat("crate1")?,
        ),
        InstanceRecord::new(Mat4::from_translation(Vec3::new(-2.0, 0.5, 1.5)), mat("ice")?),
    ]);

    let bricks = mat("bricks0")?;
    let mirror = mat("mirror")?;
    let brick_tex = Mat4::from_scale(Vec3::new(1.5, 2.0, 1.0));
    let row_z = |i: usize| -10.0 + i as f32 * 5.0;

    let mut columns = Vec::new();
    let mut balls = Vec::new();
    for x in [-5.0, 5.0] {
        columns.push(item("cylinder", bricks)?.with_instances((0..COLUMN_ROWS).map(|i| {
            InstanceRecord::new(Mat4::from_translation(Vec3::new(x, 1.5, row_z(i))), bricks)
                .with_tex_transform(brick_tex)
        })));
        balls.push(item("sphere", mirror)?.with_instances((0..COLUMN_ROWS).map(|i| {
            InstanceRecord::new(Mat4::from_translation(Vec3::new(x, 3.5, row_z(i))), mirror)
                .with_tex_transform(brick_tex)
        })));
    }

    let sky_material = mat("sky")?;
    let sky = item("sphere", sky_material)?
        .with_instance(InstanceRecord::new(Mat4::from_scale(Vec3::splat(SKY_SCALE)), sky_material));

    let mut opaque = vec![box_item, grid, crates];
    opaque.extend(columns);
    opaque.extend(balls);
    Ok(SharedItems { opaque, sky })
}

fn build_items(shapes: &MeshGeometry, materials: &MaterialLibrary) -> RendererResult<RenderItems> {
    let mut items = RenderItems::new();

    let shared = shared_items(shapes, materials)?;
    for item in shared.opaque.iter().cloned() {
        items.push(item, &[RenderLayer::Opaque, RenderLayer::OpaqueShadow]);
    }
    items.push(shared.sky.clone(), &[RenderLayer::Sky]);

    let mirror = materials.id("mirror")?;
    let globe = RenderItem::new(SHAPES, submesh(shapes, "sphere")?, mirror).with_instance(InstanceRecord::new(
        Mat4::from_scale_rotation_translation(Vec3::splat(2.0), Quat::IDENTITY, GLOBE_CENTER),
        mirror,
    ));
    items.push(
        globe,
        &[RenderLayer::OpaqueDynamicReflectors, RenderLayer::OpaqueShadow],
    );

    let quad = RenderItem::new(SHAPES, submesh(shapes, "quad")?, mirror)
        .with_instance(InstanceRecord::new(Mat4::IDENTITY, mirror));
    items.push(quad, &[RenderLayer::Debug]);

    items.end_scene_items();

    for item in shared.opaque {
        items.push(item, &[RenderLayer::OpaqueDynamicCamera]);
    }
    items.push(shared.sky, &[RenderLayer::SkyDynamicCamera]);

    Ok(items)
}

fn lights() -> LightRig {
    let spots = (0..2)
        .map(|i| SpotLight {
            position: [Vec3::new(4.0, 3.5, -10.0), Vec3::new(2.0, 7.5, 0.0)][i],
            direction: Vec3::NEG_Y,
            strength: Vec3::new(10.2, 10.1, 10.0),
            falloff_start: 1.0,
            falloff_end: [10.1, 30.1][i],
            spot_power: 8.0,
            shadow_target: Vec3::new(5.0, 0.0, -10.0 + 5.0 * i as f32),
            shadow_up: Vec3::Z,
        })
        .collect();

    LightRig {
        directional: vec![DirectionalLight {
            direction: Vec3::new(0.57735, -0.57735, 0.57735),
            strength: Vec3::new(2.9, 2.8, 2.7),
        }],
        points: Vec::new(),
        spots,
    }
}
