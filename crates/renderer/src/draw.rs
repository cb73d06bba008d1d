//! The render-item draw loop.

use std::collections::HashSet;

use tracing::warn;

use crate::error::RendererResult;
use crate::frame_resource::{FrameBackend, FrameResource, UploadArray};
use crate::recorder::CommandRecorder;
use crate::render_item::{RenderItems, RenderLayer};

/// Draws layers of render items, one instanced draw per item.
///
/// Items whose geometry or material is missing are skipped with a single
/// warning each.
#[derive(Debug, Default)]
pub struct ItemDrawer {
    warned: HashSet<usize>,
}

impl ItemDrawer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every item of `layer`. Returns the number of draws issued.
    ///
    /// # Errors
    ///
    /// Fails if an item has no instance buffer in `frame`.
    pub fn draw_layer<R, B>(
        &mut self,
        recorder: &mut R,
        items: &RenderItems,
        layer: RenderLayer,
        frame: &FrameResource<B>,
    ) -> RendererResult<usize>
    where
        R: CommandRecorder,
        B: FrameBackend,
    {
        let mut draws = 0;
        for &index in items.layer(layer) {
            let item = &items.items()[index];
            if let Some(material) = item.dangling_material(frame.material_count()) {
                if self.warned.insert(item.item_index) {
                    warn!(
                        "Skipping render item {}: material {} does not exist ({} materials)",
                        item.item_index,
                        material,
                        frame.material_count()
                    );
                }
                continue;
            }
            if !recorder.bind_geometry(item.geometry) {
                if self.warned.insert(item.item_index) {
                    warn!(
                        "Skipping render item {}: geometry {} does not exist",
                        item.item_index, item.geometry
                    );
                }
                continue;
            }
            recorder.set_topology(item.topology);

            let instances = frame.instance_buffer(item.item_index)?;
            recorder.bind_instances(instances.address()?);
            recorder.draw_indexed(
                item.index_count,
                item.visible_instance_count,
                item.start_index,
                item.base_vertex,
            );
            draws += 1;
        }
        Ok(draws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_resource::{FrameLayout, HostBackend};
    use crate::recorder::{Command, CommandLog};
    use crate::render_item::{InstanceRecord, RenderItem};
    use glam::{Mat4, Vec3};
    use prism_resources::SubmeshGeometry;
    use prism_scene::Aabb;

    fn item(geometry: usize, instances: usize) -> RenderItem {
        let submesh = SubmeshGeometry {
            index_count: 36,
            start_index: 12,
            base_vertex: 8,
            bounds: Aabb::new(Vec3::ZERO, Vec3::ONE),
        };
        RenderItem::new(geometry, &submesh, 0)
            .with_instances((0..instances).map(|_| InstanceRecord::new(Mat4::IDENTITY, 0)))
    }

    fn frame_for(items: &RenderItems) -> FrameResource<HostBackend> {
        FrameResource::new(
            &HostBackend::new(),
            &FrameLayout {
                pass_count: 1,
                material_count: 1,
                instance_counts: items.instance_counts(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_one_draw_per_item_with_visible_count() {
        let mut items = RenderItems::new();
        items.push(item(0, 5), &[RenderLayer::Opaque]);
        items.push(item(0, 3), &[RenderLayer::Opaque]);
        items.items_mut()[0].visible_instance_count = 5;
        items.items_mut()[1].visible_instance_count = 0;
        let frame = frame_for(&items);

        let mut log = CommandLog::new([0]);
        let draws = ItemDrawer::new()
            .draw_layer(&mut log, &items, RenderLayer::Opaque, &frame)
            .unwrap();

        assert_eq!(draws, 2);
        assert_eq!(log.draw_instance_counts(), vec![5, 0]);
        assert_eq!(
            log.commands()[3],
            Command::DrawIndexed {
                index_count: 36,
                instance_count: 5,
                start_index: 12,
                base_vertex: 8,
            }
        );
    }

    #[test]
    fn test_each_item_binds_its_own_instance_buffer() {
        let mut items = RenderItems::new();
        items.push(item(0, 1), &[RenderLayer::Opaque]);
        items.push(item(0, 1), &[RenderLayer::Opaque]);
        let frame = frame_for(&items);

        let mut log = CommandLog::new([0]);
        ItemDrawer::new()
            .draw_layer(&mut log, &items, RenderLayer::Opaque, &frame)
            .unwrap();

        let bound: Vec<u64> = log
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::BindInstances(address) => Some(*address),
                _ => None,
            })
            .collect();
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0], frame.instance_buffer(0).unwrap().address().unwrap());
        assert_eq!(bound[1], frame.instance_buffer(1).unwrap().address().unwrap());
    }

    #[test]
    fn test_missing_geometry_is_skipped() {
        let mut items = RenderItems::new();
        items.push(item(7, 1), &[RenderLayer::Opaque]);
        items.push(item(0, 1), &[RenderLayer::Opaque]);
        let frame = frame_for(&items);

        let mut drawer = ItemDrawer::new();
        let mut log = CommandLog::new([0]);
        for _ in 0..2 {
            let draws = drawer
                .draw_layer(&mut log, &items, RenderLayer::Opaque, &frame)
                .unwrap();
            assert_eq!(draws, 1);
        }
        assert_eq!(drawer.warned.len(), 1);
    }

    #[test]
    fn test_dangling_material_is_skipped() {
        let mut items = RenderItems::new();
        let mut bad_item = item(0, 1);
        bad_item.material = 9;
        items.push(bad_item, &[RenderLayer::Opaque]);
        let mut bad_instance = item(0, 2);
        bad_instance.instances[1].material = 3;
        items.push(bad_instance, &[RenderLayer::Opaque]);
        items.push(item(0, 1), &[RenderLayer::Opaque]);
        for item in items.items_mut() {
            item.visible_instance_count = 1;
        }
        let frame = frame_for(&items);

        let mut drawer = ItemDrawer::new();
        let mut log = CommandLog::new([0]);
        for _ in 0..2 {
            let draws = drawer
                .draw_layer(&mut log, &items, RenderLayer::Opaque, &frame)
                .unwrap();
            assert_eq!(draws, 1);
        }
        assert_eq!(drawer.warned.len(), 2);
        assert_eq!(log.draw_instance_counts(), vec![1, 1]);
    }

    #[test]
    fn test_empty_layer_draws_nothing() {
        let items = RenderItems::new();
        let frame = frame_for(&items);
        let mut log = CommandLog::new([0]);
        let draws = ItemDrawer::new()
            .draw_layer(&mut log, &items, RenderLayer::Sky, &frame)
            .unwrap();
        assert_eq!(draws, 0);
        assert!(log.commands().is_empty());
    }
}
