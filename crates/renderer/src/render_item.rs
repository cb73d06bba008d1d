//! Render items and the layers that select them.

use ash::vk;
use glam::Mat4;
use prism_resources::{MaterialId, SubmeshGeometry};
use prism_scene::Aabb;

/// Index into the renderer's geometry table.
pub type GeometryId = usize;

/// Buckets of items drawn together by one pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderLayer {
    Opaque,
    /// Items that sample the dynamic cube map.
    OpaqueDynamicReflectors,
    /// Opaque items seen by the cube-map cameras.
    OpaqueDynamicCamera,
    /// The sky as seen by the cube-map cameras.
    SkyDynamicCamera,
    /// Shadow casters.
    OpaqueShadow,
    Debug,
    Sky,
}

impl RenderLayer {
    pub const COUNT: usize = 7;

    pub const ALL: [RenderLayer; Self::COUNT] = [
        RenderLayer::Opaque,
        RenderLayer::OpaqueDynamicReflectors,
        RenderLayer::OpaqueDynamicCamera,
        RenderLayer::SkyDynamicCamera,
        RenderLayer::OpaqueShadow,
        RenderLayer::Debug,
        RenderLayer::Sky,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One instance of an item.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InstanceRecord {
    pub world: Mat4,
    pub tex_transform: Mat4,
    pub material: MaterialId,
}

impl InstanceRecord {
    pub fn new(world: Mat4, material: MaterialId) -> Self {
        Self {
            world,
            tex_transform: Mat4::IDENTITY,
            material,
        }
    }

    pub fn with_tex_transform(mut self, tex_transform: Mat4) -> Self {
        self.tex_transform = tex_transform;
        self
    }
}

/// A drawable: one submesh range, drawn once per visible instance.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderItem {
    /// Position in the master list; selects the instance buffer.
    pub item_index: usize,
    pub geometry: GeometryId,
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
    pub material: MaterialId,
    pub topology: vk::PrimitiveTopology,
    pub instances: Vec<InstanceRecord>,
    /// Local-space bounds shared by every instance.
    pub bounds: Aabb,
    /// Instances written this frame.
    pub visible_instance_count: u32,
}

impl RenderItem {
    /// An item drawing `submesh` of `geometry` as a triangle list.
    pub fn new(geometry: GeometryId, submesh: &SubmeshGeometry, material: MaterialId) -> Self {
        Self {
            item_index: 0,
            geometry,
            index_count: submesh.index_count,
            start_index: submesh.start_index,
            base_vertex: submesh.base_vertex,
            material,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            instances: Vec::new(),
            bounds: submesh.bounds,
            visible_instance_count: 0,
        }
    }

    pub fn with_instance(mut self, instance: InstanceRecord) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn with_instances(mut self, instances: impl IntoIterator<Item = InstanceRecord>) -> Self {
        self.instances.extend(instances);
        self
    }

    /// First material of the item or its instances that is not below
    /// `material_count`.
    pub fn dangling_material(&self, material_count: usize) -> Option<MaterialId> {
        std::iter::once(self.material)
            .chain(self.instances.iter().map(|instance| instance.material))
            .find(|&material| material >= material_count)
    }
}

/// The master item list plus per-layer index lists.
///
/// Items past [`scene_item_count`](RenderItems::scene_item_count) are
/// helpers (such as the copies drawn by the cube-map cameras) and are never
/// culled.
#[derive(Clone, Debug, Default)]
pub struct RenderItems {
    items: Vec<RenderItem>,
    layers: [Vec<usize>; RenderLayer::COUNT],
    scene_item_count: Option<usize>,
}

impl RenderItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `item` to the master list and to each of `layers`. Returns
    /// its `item_index`.
    pub fn push(&mut self, mut item: RenderItem, layers: &[RenderLayer]) -> usize {
        let index = self.items.len();
        item.item_index = index;
        for layer in layers {
            self.layers[layer.index()].push(index);
        }
        self.items.push(item);
        index
    }

    /// Marks every item pushed so far as part of the scene proper.
    pub fn end_scene_items(&mut self) {
        self.scene_item_count = Some(self.items.len());
    }

    /// Items with a lower index take part in culling and statistics.
    pub fn scene_item_count(&self) -> usize {
        self.scene_item_count.unwrap_or(self.items.len())
    }

    pub fn layer(&self, layer: RenderLayer) -> &[usize] {
        &self.layers[layer.index()]
    }

    #[inline]
    pub fn items(&self) -> &[RenderItem] {
        &self.items
    }

    #[inline]
    pub fn items_mut(&mut self) -> &mut [RenderItem] {
        &mut self.items
    }

    pub fn get(&self, item_index: usize) -> Option<&RenderItem> {
        self.items.get(item_index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Instance buffer sizes, indexed by `item_index`.
    pub fn instance_counts(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.instances.len()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn submesh() -> SubmeshGeometry {
        SubmeshGeometry {
            index_count: 36,
            start_index: 6,
            base_vertex: 24,
            bounds: Aabb::new(Vec3::ZERO, Vec3::splat(0.5)),
        }
    }

    #[test]
    fn test_push_assigns_item_index_and_layers() {
        let mut items = RenderItems::new();
        let a = items.push(RenderItem::new(0, &submesh(), 0), &[RenderLayer::Opaque]);
        let b = items.push(
            RenderItem::new(0, &submesh(), 1),
            &[RenderLayer::Opaque, RenderLayer::OpaqueShadow],
        );

        assert_eq!((a, b), (0, 1));
        assert_eq!(items.get(1).unwrap().item_index, 1);
        assert_eq!(items.layer(RenderLayer::Opaque), &[0, 1]);
        assert_eq!(items.layer(RenderLayer::OpaqueShadow), &[1]);
        assert!(items.layer(RenderLayer::Sky).is_empty());
    }

    #[test]
    fn test_scene_item_count() {
        let mut items = RenderItems::new();
        items.push(RenderItem::new(0, &submesh(), 0), &[]);
        assert_eq!(items.scene_item_count(), 1);
        items.end_scene_items();
        items.push(RenderItem::new(0, &submesh(), 0), &[]);
        assert_eq!(items.scene_item_count(), 1);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_item_copies_submesh_range() {
        let item = RenderItem::new(2, &submesh(), 3)
            .with_instance(InstanceRecord::new(Mat4::IDENTITY, 3))
            .with_instance(InstanceRecord::new(Mat4::IDENTITY, 4));
        assert_eq!((item.index_count, item.start_index, item.base_vertex), (36, 6, 24));
        assert_eq!(item.instances.len(), 2);
        assert_eq!(item.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
    }

    #[test]
    fn test_dangling_material() {
        let item = RenderItem::new(2, &submesh(), 3)
            .with_instance(InstanceRecord::new(Mat4::IDENTITY, 3))
            .with_instance(InstanceRecord::new(Mat4::IDENTITY, 4));
        assert_eq!(item.dangling_material(5), None);
        assert_eq!(item.dangling_material(4), Some(4));
        assert_eq!(item.dangling_material(3), Some(3));
    }

    #[test]
    fn test_layer_indices_are_stable() {
        for (i, layer) in RenderLayer::ALL.iter().enumerate() {
            assert_eq!(layer.index(), i);
        }
    }
}
