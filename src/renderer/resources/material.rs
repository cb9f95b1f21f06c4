use std::path::PathBuf;
use crate::renderer::shader_data::MaterialProperties;

/// Handle into a [`MaterialTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u32);

impl MaterialId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    /// Diffuse map, relative to the model's directory
    pub diffuse_texture: Option<PathBuf>,
    pub properties: MaterialProperties,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diffuse_texture: None,
            properties: MaterialProperties::default(),
        }
    }
}

/// Owns every material of a model. Runs and draws refer to entries by [`MaterialId`].
#[derive(Debug, Clone, Default)]
pub struct MaterialTable {
    materials: Vec<Material>,
}

impl MaterialTable {
    pub const DEFAULT_NAME: &'static str = "default";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.materials.len() as u32);
        self.materials.push(material);
        id
    }

    /// Material used by geometry that names none, created on first use
    pub fn default_material(&mut self) -> MaterialId {
        match self.find(Self::DEFAULT_NAME) {
            Some(id) => id,
            None => self.insert(Material::new(Self::DEFAULT_NAME)),
        }
    }

    pub fn find(&self, name: &str) -> Option<MaterialId> {
        self.materials
            .iter()
            .position(|m| m.name == name)
            .map(|i| MaterialId(i as u32))
    }

    #[cfg(test)]
    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.index())
    }

    /// Shading parameters of every material, indexed by [`MaterialId::index`]
    pub fn property_snapshot(&self) -> Vec<MaterialProperties> {
        self.materials.iter().map(|m| m.properties).collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (MaterialId, &mut Material)> {
        self.materials
            .iter_mut()
            .enumerate()
            .map(|(i, m)| (MaterialId(i as u32), m))
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_indices() {
        let mut table = MaterialTable::new();
        let red = table.insert(Material::new("red"));
        let blue = table.insert(Material::new("blue"));

        assert_ne!(red, blue);
        assert_eq!(table.get(blue).unwrap().name, "blue");
        assert_eq!(table.find("red"), Some(red));
        assert_eq!(table.find("green"), None);
    }

    #[test]
    fn default_material_is_created_once() {
        let mut table = MaterialTable::new();
        let a = table.default_material();
        let b = table.default_material();
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(a).unwrap().properties.shininess, 32.0);
    }
}
