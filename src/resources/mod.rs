//! Asset registry consumed by the scene.
//!
//! Loading and decoding assets happens elsewhere; the registry only hands out
//! resolved handles. Lookups never fail hard: a missing mesh or material is
//! `None`, a missing texture is `-1`, and the scene degrades from there.

use std::{collections::HashMap, sync::Arc};

use crate::data_structures::model::{Material, MaterialId, Mesh};

pub mod animation;

use animation::Animation;

#[derive(Debug, Default)]
pub struct AssetRegistry {
    meshes: HashMap<String, Arc<Mesh>>,
    animations: HashMap<String, Arc<Animation>>,
    materials: Vec<Material>,
    material_names: HashMap<String, MaterialId>,
    textures: HashMap<String, i32>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `mesh` under its name, replacing an older mesh of the same name.
    pub fn add_mesh(&mut self, mesh: Mesh) -> Arc<Mesh> {
        let mesh = Arc::new(mesh);
        self.meshes.insert(mesh.name.clone(), mesh.clone());
        mesh
    }

    pub fn mesh(&self, name: &str) -> Option<Arc<Mesh>> {
        let mesh = self.meshes.get(name).cloned();
        if mesh.is_none() {
            log::warn!("Mesh {} is not registered", name);
        }
        mesh
    }

    pub fn add_animation(&mut self, animation: Animation) -> Arc<Animation> {
        let animation = Arc::new(animation);
        self.animations
            .insert(animation.name.clone(), animation.clone());
        animation
    }

    pub fn animation(&self, name: &str) -> Option<Arc<Animation>> {
        self.animations.get(name).cloned()
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        if let Some(id) = self.material_names.get(&material.name) {
            self.materials[id.0 as usize] = material;
            return *id;
        }
        let id = MaterialId(self.materials.len() as u32);
        self.material_names.insert(material.name.clone(), id);
        self.materials.push(material);
        id
    }

    pub fn material(&self, name: &str) -> Option<MaterialId> {
        let id = self.material_names.get(name).copied();
        if id.is_none() {
            log::warn!("Material {} is not registered", name);
        }
        id
    }

    pub fn material_by_id(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize)
    }

    /// Reserves the next bindless texture slot for `name`, or returns its existing slot.
    pub fn add_texture(&mut self, name: &str) -> i32 {
        let next = self.textures.len() as i32;
        *self.textures.entry(name.to_string()).or_insert(next)
    }

    /// Bindless slot of `name`, `-1` if unknown.
    pub fn find_texture(&self, name: &str) -> i32 {
        self.textures.get(name).copied().unwrap_or(-1)
    }
}
