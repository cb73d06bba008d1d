//! Per-frame visibility culling and instance upload.
//!
//! Instead of transforming every item's bounds into view space, the camera
//! frustum is brought into each instance's local space
//! (`inv_world * inv_view`) and tested against the item's local box. Kept
//! instances are packed, in order and without gaps, into the item's
//! instance buffer for the current ring slot.

use glam::Mat4;
use prism_scene::{Containment, Frustum};

use crate::error::RendererResult;
use crate::frame_resource::{FrameBackend, FrameResource, UploadArray};
use crate::gpu_types::InstanceData;
use crate::render_item::{RenderItem, RenderItems};

/// Instance counts over scene items for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VisibilityStats {
    pub visible: usize,
    pub total: usize,
}

/// Culling inputs shared by every item in a frame.
#[derive(Clone, Copy, Debug)]
pub struct CullView<'a> {
    pub view: Mat4,
    /// View-space camera frustum.
    pub frustum: &'a Frustum,
    pub culling: bool,
}

/// Packs the instances of `item` that survive culling.
///
/// `exempt` items keep all their instances. Otherwise an instance is
/// dropped only when its bounds are entirely outside the frustum.
pub fn cull_instances(item: &RenderItem, inv_view: &Mat4, cull: &CullView<'_>, exempt: bool) -> Vec<InstanceData> {
    item.instances
        .iter()
        .filter(|instance| {
            if exempt || !cull.culling {
                return true;
            }
            let view_to_local = instance.world.inverse() * *inv_view;
            let local_frustum = cull.frustum.transformed(&view_to_local);
            local_frustum.contains_aabb(&item.bounds) != Containment::Disjoint
        })
        .map(|instance| {
            InstanceData::new(instance.world, instance.tex_transform, instance.material as u32)
        })
        .collect()
}

/// Culls every item, uploads the survivors into `frame` and sets each
/// item's `visible_instance_count`.
///
/// Items referring to a material past the end of the library upload
/// nothing and count as fully culled.
pub fn update_instances<B: FrameBackend>(
    items: &mut RenderItems,
    cull: &CullView<'_>,
    frame: &mut FrameResource<B>,
) -> RendererResult<VisibilityStats> {
    let inv_view = cull.view.inverse();
    let scene_item_count = items.scene_item_count();
    let mut stats = VisibilityStats::default();

    for item in items.items_mut() {
        let exempt = item.item_index >= scene_item_count;
        if item.dangling_material(frame.material_count()).is_some() {
            item.visible_instance_count = 0;
            if !exempt {
                stats.total += item.instances.len();
            }
            continue;
        }
        let visible = cull_instances(item, &inv_view, cull, exempt);

        frame
            .instance_buffer_mut(item.item_index)?
            .write_slice(&visible)?;
        item.visible_instance_count = visible.len() as u32;

        if !exempt {
            stats.visible += visible.len();
            stats.total += item.instances.len();
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_resource::{FrameLayout, HostBackend};
    use crate::render_item::{InstanceRecord, RenderLayer};
    use glam::Vec3;
    use prism_resources::SubmeshGeometry;
    use prism_scene::{Aabb, Camera};

    fn unit_box() -> SubmeshGeometry {
        SubmeshGeometry {
            index_count: 36,
            start_index: 0,
            base_vertex: 0,
            bounds: Aabb::new(Vec3::ZERO, Vec3::splat(0.5)),
        }
    }

    fn camera() -> Camera {
        let mut camera = Camera::new();
        camera.set_lens(0.25 * std::f32::consts::PI, 1.0, 1.0, 1000.0);
        camera.look_at(Vec3::new(0.0, 0.0, -10.0), Vec3::ZERO, Vec3::Y);
        camera.update_view_matrix();
        camera
    }

    fn frame_for(items: &RenderItems) -> FrameResource<HostBackend> {
        let layout = FrameLayout {
            pass_count: 1,
            material_count: 1,
            instance_counts: items.instance_counts(),
        };
        FrameResource::new(&HostBackend::new(), &layout).unwrap()
    }

    /// Instances 1 and 3 sit far to the sides and 4 is behind the camera.
    fn mixed_item() -> RenderItem {
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(500.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 5.0),
            Vec3::new(-500.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -50.0),
        ];
        RenderItem::new(0, &unit_box(), 0).with_instances(
            positions
                .iter()
                .map(|&p| InstanceRecord::new(Mat4::from_translation(p), 0)),
        )
    }

    #[test]
    fn test_culling_disabled_keeps_everything() {
        let camera = camera();
        let frustum = Frustum::from_projection(&camera.proj());
        let mut items = RenderItems::new();
        items.push(mixed_item(), &[RenderLayer::Opaque]);
        let mut frame = frame_for(&items);

        let cull = CullView {
            view: camera.view(),
            frustum: &frustum,
            culling: false,
        };
        let stats = update_instances(&mut items, &cull, &mut frame).unwrap();
        assert_eq!(stats, VisibilityStats { visible: 5, total: 5 });
        assert_eq!(items.items()[0].visible_instance_count, 5);
    }

    #[test]
    fn test_culled_instances_are_compacted_in_order() {
        let camera = camera();
        let frustum = Frustum::from_projection(&camera.proj());
        let mut items = RenderItems::new();
        items.push(mixed_item(), &[RenderLayer::Opaque]);
        let mut frame = frame_for(&items);

        let cull = CullView {
            view: camera.view(),
            frustum: &frustum,
            culling: true,
        };
        let stats = update_instances(&mut items, &cull, &mut frame).unwrap();
        assert_eq!(stats.visible, 2);

        let item = &items.items()[0];
        assert_eq!(item.visible_instance_count, 2);
        let written = frame.instance_buffer(0).unwrap().as_slice();
        assert_eq!(written[0].world_matrix(), item.instances[0].world);
        assert_eq!(written[1].world_matrix(), item.instances[2].world);
    }

    #[test]
    fn test_helper_items_are_never_culled() {
        let camera = camera();
        let frustum = Frustum::from_projection(&camera.proj());
        let mut items = RenderItems::new();
        items.push(mixed_item(), &[RenderLayer::Opaque]);
        items.end_scene_items();
        items.push(mixed_item(), &[RenderLayer::OpaqueDynamicCamera]);
        let mut frame = frame_for(&items);

        let cull = CullView {
            view: camera.view(),
            frustum: &frustum,
            culling: true,
        };
        let stats = update_instances(&mut items, &cull, &mut frame).unwrap();
        assert_eq!(items.items()[0].visible_instance_count, 2);
        assert_eq!(items.items()[1].visible_instance_count, 5);
        // Only scene items count toward the statistics.
        assert_eq!(stats, VisibilityStats { visible: 2, total: 5 });
    }

    #[test]
    fn test_dangling_material_uploads_nothing() {
        let camera = camera();
        let frustum = Frustum::from_projection(&camera.proj());
        let mut items = RenderItems::new();
        items.push(
            RenderItem::new(0, &unit_box(), 0).with_instance(InstanceRecord::new(Mat4::IDENTITY, 9)),
            &[RenderLayer::Opaque],
        );
        items.push(
            RenderItem::new(0, &unit_box(), 0).with_instance(InstanceRecord::new(Mat4::IDENTITY, 0)),
            &[RenderLayer::Opaque],
        );
        let mut frame = frame_for(&items);

        let cull = CullView {
            view: camera.view(),
            frustum: &frustum,
            culling: false,
        };
        let stats = update_instances(&mut items, &cull, &mut frame).unwrap();
        assert_eq!(stats, VisibilityStats { visible: 1, total: 2 });
        assert_eq!(items.items()[0].visible_instance_count, 0);
        assert_eq!(frame.instance_buffer(0).unwrap().as_slice()[0], <InstanceData as bytemuck::Zeroable>::zeroed());
        assert_eq!(items.items()[1].visible_instance_count, 1);
    }

    #[test]
    fn test_everything_culled_gives_zero_count() {
        let camera = camera();
        let frustum = Frustum::from_projection(&camera.proj());
        let mut items = RenderItems::new();
        let item = RenderItem::new(0, &unit_box(), 0).with_instance(InstanceRecord::new(
            Mat4::from_translation(Vec3::new(0.0, 0.0, -100.0)),
            0,
        ));
        items.push(item, &[RenderLayer::Opaque]);
        let mut frame = frame_for(&items);

        let cull = CullView {
            view: camera.view(),
            frustum: &frustum,
            culling: true,
        };
        update_instances(&mut items, &cull, &mut frame).unwrap();
        assert_eq!(items.items()[0].visible_instance_count, 0);
    }

    #[test]
    fn test_partially_inside_instance_is_kept() {
        let camera = camera();
        let frustum = Frustum::from_projection(&camera.proj());
        // Straddles the near plane at z = -9.
        let world = Mat4::from_translation(Vec3::new(0.0, 0.0, -9.0)) * Mat4::from_scale(Vec3::splat(2.0));
        let item = RenderItem::new(0, &unit_box(), 0).with_instance(InstanceRecord::new(world, 0));
        let cull = CullView {
            view: camera.view(),
            frustum: &frustum,
            culling: true,
        };
        let kept = cull_instances(&item, &camera.view().inverse(), &cull, false);
        assert_eq!(kept.len(), 1);
    }
}
