//! Named texture table.
//!
//! Textures are 1x1 solid-color placeholders; a material refers to one by
//! its position in the table, which is also its slot in the shader's
//! texture array.

use std::collections::HashMap;

use crate::error::{ResourceError, ResourceResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub name: String,
    /// RGBA8, sRGB encoded.
    pub color: [u8; 4],
}

#[derive(Debug, Default)]
pub struct TextureTable {
    textures: Vec<TextureDesc>,
    by_name: HashMap<String, u32>,
}

impl TextureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, color: [u8; 4]) -> ResourceResult<u32> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(ResourceError::DuplicateTexture(name));
        }
        let index = self.textures.len() as u32;
        self.by_name.insert(name.clone(), index);
        self.textures.push(TextureDesc { name, color });
        Ok(index)
    }

    pub fn index(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn textures(&self) -> &[TextureDesc] {
        &self.textures
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_follow_insertion() {
        let mut table = TextureTable::new();
        assert_eq!(table.insert("bricks", [150, 60, 40, 255]), Ok(0));
        assert_eq!(table.insert("bricks_nmap", [128, 128, 255, 255]), Ok(1));
        assert_eq!(table.index("bricks_nmap"), Some(1));
        assert!(table.insert("bricks", [0; 4]).is_err());
        assert_eq!(table.len(), 2);
    }
}
