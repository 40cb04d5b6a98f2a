//! Per-mesh instance aggregation.
//!
//! Every object added to the scene is registered here. The aggregator keeps one
//! entry per distinct mesh (with a representative object that decides the draw
//! category) and counts how many objects reference each mesh. Those counts are
//! the per-mesh instance capacities of the dynamic batch.

use std::{collections::HashMap, sync::Arc};

use crate::{
    data_structures::{
        model::{DrawCategory, Mesh, MeshId},
        scene_graph::Object,
    },
    resources::animation::{Animation, AnimationId},
};

/// A distinct mesh and the first object that referenced it.
#[derive(Clone, Debug)]
pub struct MeshObject {
    pub mesh: Arc<Mesh>,
    pub object: Object,
}

impl MeshObject {
    pub fn category(&self) -> DrawCategory {
        self.object.category
    }
}

#[derive(Debug, Default)]
pub struct InstanceAggregator {
    meshes: Vec<MeshObject>,
    mesh_count: HashMap<MeshId, u32>,
    animations: Vec<Arc<Animation>>,
    anim_count: HashMap<AnimationId, u32>,
    revision: u64,
}

impl InstanceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_objects<'a, I>(objects: I) -> Self
    where
        I: IntoIterator<Item = &'a Object>,
    {
        let mut aggregator = Self::new();
        for object in objects {
            aggregator.register(object);
        }
        aggregator
    }

    /**
     * Registers an object. Each distinct LOD mesh gets its count incremented once,
     * so an object whose mid LOD aliases its full mesh counts a single instance.
     * Objects with neither mesh nor animation are ignored.
     *
     * Returns `true` when the object was registered as an animation.
     */
    pub fn register(&mut self, object: &Object) -> bool {
        let meshes = object.meshes();
        if !meshes.is_empty() {
            for mesh in meshes {
                let count = self.mesh_count.entry(mesh.id()).or_insert(0);
                if *count == 0 {
                    self.meshes.push(MeshObject {
                        mesh: mesh.clone(),
                        object: object.clone(),
                    });
                }
                *count += 1;
            }
            self.revision += 1;
            return false;
        }
        if let Some(animation) = &object.animation {
            let count = self.anim_count.entry(animation.id()).or_insert(0);
            if *count == 0 {
                self.animations.push(animation.clone());
            }
            *count += 1;
            self.revision += 1;
            return true;
        }
        false
    }

    pub fn mesh_objects(&self) -> &[MeshObject] {
        &self.meshes
    }

    pub fn count(&self, mesh: MeshId) -> u32 {
        self.mesh_count.get(&mesh).copied().unwrap_or(0)
    }

    pub fn animations(&self) -> &[Arc<Animation>] {
        &self.animations
    }

    pub fn animation_count(&self, animation: AnimationId) -> u32 {
        self.anim_count.get(&animation).copied().unwrap_or(0)
    }

    /// Number of distinct meshes.
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Sum of all per-mesh counts.
    pub fn total_instances(&self) -> u32 {
        self.mesh_count.values().sum()
    }

    /// Bumped on every registration; batches rebuild when it moves.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
