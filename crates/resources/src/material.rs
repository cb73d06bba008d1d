//! Materials and their per-frame replication.
//!
//! Every ring slot holds its own copy of the material buffer. Editing a
//! material sets one dirty bit per slot; uploading into a slot clears only
//! that slot's bit, so an edit reaches all slots after one full trip around
//! the ring and never before it was made.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Index of a material in its library. Doubles as the material-buffer slot.
pub type MaterialId = usize;

/// Shader-side material record (112 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MaterialData {
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    /// Transposed, column-major in the buffer like every other matrix.
    pub transform: Mat4,
    pub diffuse_map_index: u32,
    pub normal_map_index: u32,
    pub metalness: f32,
    pub _pad: f32,
}

/// Surface parameters of one material.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub diffuse_map_index: u32,
    pub normal_map_index: u32,
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    pub metalness: f32,
    /// Texture-coordinate transform.
    pub transform: Mat4,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diffuse_map_index: 0,
            normal_map_index: 0,
            diffuse_albedo: Vec4::ONE,
            fresnel_r0: Vec3::splat(0.01),
            roughness: 0.5,
            metalness: 0.0,
            transform: Mat4::IDENTITY,
        }
    }

    pub fn to_gpu(&self) -> MaterialData {
        MaterialData {
            diffuse_albedo: self.diffuse_albedo,
            fresnel_r0: self.fresnel_r0,
            roughness: self.roughness,
            transform: self.transform.transpose(),
            diffuse_map_index: self.diffuse_map_index,
            normal_map_index: self.normal_map_index,
            metalness: self.metalness,
            _pad: 0.0,
        }
    }
}

/// All materials of the scene plus their per-slot dirty bits.
#[derive(Debug)]
pub struct MaterialLibrary {
    materials: Vec<Material>,
    by_name: HashMap<String, MaterialId>,
    dirty: Vec<u32>,
    all_slots: u32,
}

impl MaterialLibrary {
    /// Library replicated into `slot_count` ring slots (at most 32).
    pub fn new(slot_count: usize) -> Self {
        assert!(
            (1..=32).contains(&slot_count),
            "slot count must be within 1..=32"
        );
        Self {
            materials: Vec::new(),
            by_name: HashMap::new(),
            dirty: Vec::new(),
            all_slots: u32::MAX >> (32 - slot_count),
        }
    }

    /// Registers a material; its id is the next buffer slot.
    pub fn insert(&mut self, material: Material) -> ResourceResult<MaterialId> {
        if self.by_name.contains_key(&material.name) {
            return Err(ResourceError::DuplicateMaterial(material.name));
        }
        let id = self.materials.len();
        debug!("Registered material '{}' in slot {}", material.name, id);
        self.by_name.insert(material.name.clone(), id);
        self.materials.push(material);
        self.dirty.push(self.all_slots);
        Ok(id)
    }

    pub fn id(&self, name: &str) -> ResourceResult<MaterialId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ResourceError::UnknownMaterial(name.to_string()))
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Material> {
        self.by_name.get(name).map(|&id| &self.materials[id])
    }

    /// Applies `edit` and marks the material dirty in every slot.
    pub fn edit(&mut self, id: MaterialId, edit: impl FnOnce(&mut Material)) -> ResourceResult<()> {
        let material = self
            .materials
            .get_mut(id)
            .ok_or(ResourceError::MaterialOutOfRange(id))?;
        edit(material);
        self.dirty[id] = self.all_slots;
        Ok(())
    }

    pub fn is_dirty(&self, id: MaterialId, slot: usize) -> bool {
        self.dirty
            .get(id)
            .is_some_and(|bits| bits & (1 << slot) != 0)
    }

    /// Writes every material dirty for `slot` through `write` and clears
    /// that slot's bit. Returns how many were written.
    pub fn upload_dirty(
        &mut self,
        slot: usize,
        mut write: impl FnMut(MaterialId, &MaterialData),
    ) -> usize {
        let bit = 1u32 << slot;
        let mut written = 0;
        for (id, material) in self.materials.iter().enumerate() {
            if self.dirty[id] & bit != 0 {
                write(id, &material.to_gpu());
                self.dirty[id] &= !bit;
                written += 1;
            }
        }
        written
    }

    /// Number of ring slots the dirty bits track.
    pub fn slot_count(&self) -> usize {
        self.all_slots.count_ones() as usize
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.materials.iter().enumerate()
    }
}
