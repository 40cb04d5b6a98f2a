//! Scene graph and hierarchical scene organization.
//!
//! Nodes live in a [`SlotMap`] arena owned by [`SceneGraph`]. A node exclusively
//! owns its children (by key) and its [`Object`]s (by value); meshes and
//! animations are shared `Arc` handles owned by the asset registry, so aliasing
//! between LOD slots or between objects is a plain handle comparison.
//!
//! Mutations never recompute transforms directly. They enqueue the node on the
//! graph's update queue, which [`SceneGraph::update_nodes`] drains once per frame.
//! Removal is deferred the same way through [`SceneGraph::flush_nodes`], which
//! has to run after the frame's draw submission.

use std::sync::Arc;

use cgmath::{InnerSpace, Matrix4, Vector3};
use slotmap::{SlotMap, new_key_type};

use crate::{
    data_structures::{
        aggregate::InstanceAggregator,
        bounding::{Aabb, BoundingSphere},
        instance::Instance,
        model::{DrawCategory, Material, MaterialId, Mesh},
        multi_instance::{GatheredInstance, MultiInstance},
    },
    resources::animation::Animation,
};

new_key_type! {
    pub struct NodeKey;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Static,
    Animation,
    Water,
    Terrain,
    Sky,
}

/// A placed instance of up to three mesh LODs or of an animation.
#[derive(Clone, Debug)]
pub struct Object {
    pub mesh: Option<Arc<Mesh>>,
    pub mesh_mid: Option<Arc<Mesh>>,
    pub mesh_low: Option<Arc<Mesh>>,
    pub animation: Option<Arc<Animation>>,
    pub material: Option<MaterialId>,
    pub category: DrawCategory,
    /// Placement relative to the owning node.
    pub transform: Instance,
    /// Animation pose applied on top of `transform`.
    pub pose: Instance,
    bounding: Option<Aabb>,
    parent: Option<NodeKey>,
}

impl Object {
    pub fn new(mesh: Option<Arc<Mesh>>) -> Self {
        Self {
            mesh,
            mesh_mid: None,
            mesh_low: None,
            animation: None,
            material: None,
            category: DrawCategory::Normal,
            transform: Instance::new(),
            pose: Instance::new(),
            bounding: None,
            parent: None,
        }
    }

    pub fn with_lods(
        mesh: Option<Arc<Mesh>>,
        mesh_mid: Option<Arc<Mesh>>,
        mesh_low: Option<Arc<Mesh>>,
    ) -> Self {
        Self {
            mesh_mid,
            mesh_low,
            ..Self::new(mesh)
        }
    }

    pub fn animated(animation: Arc<Animation>) -> Self {
        Self {
            animation: Some(animation),
            ..Self::new(None)
        }
    }

    /// Binds a resolved material; its flags decide the draw category.
    pub fn bind_material(&mut self, id: Option<MaterialId>, material: Option<&Material>) {
        self.material = id;
        self.category = material.map(Material::category).unwrap_or_default();
    }

    pub fn set_position(&mut self, x: f32, y: f32, z: f32) {
        self.transform.position = Vector3::new(x, y, z);
    }

    pub fn set_size(&mut self, sx: f32, sy: f32, sz: f32) {
        self.transform.scale = Vector3::new(sx, sy, sz);
    }

    pub fn set_rotation(&mut self, ax: f32, ay: f32, az: f32) {
        self.transform = self.transform.with_angles(ax, ay, az);
    }

    /// Distinct LOD meshes of this object; a slot aliasing a higher LOD is skipped.
    pub fn meshes(&self) -> Vec<&Arc<Mesh>> {
        let mut distinct: Vec<&Arc<Mesh>> = Vec::with_capacity(3);
        for mesh in [&self.mesh, &self.mesh_mid, &self.mesh_low].into_iter().flatten() {
            if !distinct.iter().any(|m| m.id() == mesh.id()) {
                distinct.push(mesh);
            }
        }
        distinct
    }

    /// Mesh to draw at `distance`, falling back to the next finer LOD when a slot is empty.
    pub fn lod_mesh(&self, distance: f32, lod_distances: [f32; 2]) -> Option<&Arc<Mesh>> {
        if distance < lod_distances[0] {
            self.mesh.as_ref()
        } else if distance < lod_distances[1] {
            self.mesh_mid.as_ref().or(self.mesh.as_ref())
        } else {
            self.mesh_low
                .as_ref()
                .or(self.mesh_mid.as_ref())
                .or(self.mesh.as_ref())
        }
    }

    pub fn local_matrix(&self) -> Matrix4<f32> {
        (&self.transform * &self.pose).to_matrix()
    }

    /// Recomputes the node-local bounding box from the mesh (or animation) bounds.
    pub fn calculate_bounding(&mut self) {
        let source = self
            .mesh
            .as_ref()
            .map(|m| m.bounds())
            .or_else(|| self.animation.as_ref().map(|a| a.bounds));
        self.bounding = source.map(|b| b.transformed(&self.local_matrix()));
    }

    pub fn bounding(&self) -> Option<&Aabb> {
        self.bounding.as_ref()
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }
}

#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    /// Placement relative to the parent node.
    pub local: Instance,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
    objects: Vec<Object>,
    world: Instance,
    bounding: Option<Aabb>,
    needs_update: bool,
    pending_removal: bool,
    anim_pending: bool,
    full_static: bool,
    dynamic_batch: bool,
    drawcall: Option<MultiInstance>,
}

impl Node {
    fn new(kind: NodeKind, position: Vector3<f32>) -> Self {
        let local = Instance::from(position);
        Self {
            kind,
            local,
            parent: None,
            children: Vec::new(),
            objects: Vec::new(),
            world: local,
            bounding: None,
            needs_update: false,
            pending_removal: false,
            anim_pending: false,
            full_static: false,
            dynamic_batch: true,
            drawcall: None,
        }
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    pub fn world(&self) -> &Instance {
        &self.world
    }

    /// World-space bounding box of this node's objects and children.
    pub fn bounding(&self) -> Option<&Aabb> {
        self.bounding.as_ref()
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    pub fn pending_removal(&self) -> bool {
        self.pending_removal
    }

    pub fn anim_pending(&self) -> bool {
        self.anim_pending
    }

    pub fn is_full_static(&self) -> bool {
        self.full_static
    }

    pub fn is_dynamic_batch(&self) -> bool {
        self.dynamic_batch
    }

    /// Drawn from its own prepared drawcall instead of the scene-wide dynamic batch.
    pub fn is_static_batch(&self) -> bool {
        self.full_static || !self.dynamic_batch
    }

    pub fn drawcall(&self) -> Option<&MultiInstance> {
        self.drawcall.as_ref()
    }

    pub fn object_world(&self, object: &Object) -> Matrix4<f32> {
        self.world.to_matrix() * object.local_matrix()
    }

    /// World-space bounding sphere of `object`.
    pub fn object_sphere(&self, object: &Object) -> BoundingSphere {
        match object.bounding() {
            Some(local) => local.transformed(&self.world.to_matrix()).to_sphere(),
            None => BoundingSphere {
                center: self.world.position + object.transform.position,
                radius: 0.0,
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeKey, Node>,
    to_update: Vec<NodeKey>,
    to_remove: Vec<NodeKey>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&mut self, kind: NodeKind, position: Vector3<f32>) -> NodeKey {
        self.nodes.insert(Node::new(kind, position))
    }

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeKey, &Node)> {
        self.nodes.iter()
    }

    pub fn update_queue(&self) -> &[NodeKey] {
        &self.to_update
    }

    pub fn removal_queue(&self) -> &[NodeKey] {
        &self.to_remove
    }

    /// Enqueues `key` for the next [`Self::update_nodes`]; a node is queued at most once.
    pub fn push_update(&mut self, key: NodeKey) {
        if let Some(node) = self.nodes.get_mut(key) {
            if !node.needs_update {
                node.needs_update = true;
                self.to_update.push(key);
            }
        }
    }

    /// Moves `child` (with its subtree) below `parent`.
    pub fn attach_child(&mut self, parent: NodeKey, child: NodeKey) {
        if parent == child || !self.contains(parent) || !self.contains(child) {
            return;
        }
        if self.ancestors(parent).contains(&child) {
            log::warn!("Refusing to attach a node below its own descendant");
            return;
        }
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(child);
        }
        self.push_update(child);
    }

    pub fn detach(&mut self, key: NodeKey) {
        let Some(parent) = self.nodes.get_mut(key).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.retain(|c| *c != key);
        }
        self.push_update(parent);
    }

    /// Attaches `object` to `key` and returns its index inside the node.
    pub fn add_object(&mut self, key: NodeKey, mut object: Object) -> Option<usize> {
        let node = self.nodes.get_mut(key)?;
        object.parent = Some(key);
        object.calculate_bounding();
        node.objects.push(object);
        let index = node.objects.len() - 1;
        self.push_update(key);
        Some(index)
    }

    /// Mutates an object in place and recomputes its bounding box.
    pub fn update_object(
        &mut self,
        key: NodeKey,
        index: usize,
        mutation: impl FnOnce(&mut Object),
    ) {
        let Some(object) = self.nodes.get_mut(key).and_then(|n| n.objects.get_mut(index)) else {
            return;
        };
        mutation(object);
        object.calculate_bounding();
        self.push_update(key);
    }

    pub fn translate_node(&mut self, key: NodeKey, x: f32, y: f32, z: f32) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.local.position = Vector3::new(x, y, z);
            self.push_update(key);
        }
    }

    pub fn rotate_node(&mut self, key: NodeKey, ax: f32, ay: f32, az: f32) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.local = node.local.with_angles(ax, ay, az);
            self.push_update(key);
        }
    }

    /// Places `key` at a world position and refreshes its subtree right away.
    pub fn translate_node_at_world(&mut self, key: NodeKey, x: f32, y: f32, z: f32) {
        let target = Vector3::new(x, y, z);
        let parent_world = self
            .nodes
            .get(key)
            .and_then(|n| n.parent)
            .and_then(|p| self.nodes.get(p))
            .map(|p| p.world);
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        node.local.position = match parent_world {
            Some(parent) => {
                let relative = parent.rotation.conjugate() * (target - parent.position);
                Vector3::new(
                    relative.x / parent.scale.x,
                    relative.y / parent.scale.y,
                    relative.z / parent.scale.z,
                )
            }
            None => target,
        };
        self.refresh_subtree(key);
    }

    pub fn set_full_static(&mut self, key: NodeKey, full_static: bool) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.full_static = full_static;
        }
    }

    pub fn set_dynamic_batch(&mut self, key: NodeKey, dynamic: bool) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.dynamic_batch = dynamic;
        }
    }

    pub(crate) fn set_anim_pending(&mut self, key: NodeKey, pending: bool) -> bool {
        match self.nodes.get_mut(key) {
            Some(node) if node.anim_pending != pending => {
                node.anim_pending = pending;
                true
            }
            _ => false,
        }
    }

    /// Detaches `key` and enqueues it for destruction at the next [`Self::flush_nodes`].
    pub fn remove_node(&mut self, key: NodeKey) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        if node.pending_removal {
            return;
        }
        node.pending_removal = true;
        self.detach(key);
        self.to_remove.push(key);
    }

    /**
     * Drains the update queue. Each queued node recomputes its world transform
     * (and those of its descendants) and its bounding box, then the bounding boxes
     * of its ancestors. Nodes queued while the pass runs wait for the next call.
     */
    pub fn update_nodes(&mut self) -> usize {
        let queue = std::mem::take(&mut self.to_update);
        let mut updated = 0;
        for key in queue {
            match self.nodes.get_mut(key) {
                Some(node) if node.needs_update => node.needs_update = false,
                _ => continue,
            }
            self.refresh_subtree(key);
            self.update_ancestors_bounding(key);
            updated += 1;
        }
        updated
    }

    /// Destroys exactly the nodes queued for removal at call time, with their subtrees.
    pub fn flush_nodes(&mut self) -> usize {
        let queue = std::mem::take(&mut self.to_remove);
        let mut destroyed = 0;
        for key in queue {
            if self.destroy(key) {
                destroyed += 1;
            }
        }
        if destroyed > 0 {
            log::debug!("Flushed {} nodes", destroyed);
        }
        destroyed
    }

    /// Removes `key` and its subtree from the arena immediately.
    pub fn destroy(&mut self, key: NodeKey) -> bool {
        if !self.contains(key) {
            return false;
        }
        self.detach(key);
        for k in self.subtree(key) {
            self.nodes.remove(k);
        }
        true
    }

    /// `key` followed by all its descendants, parents before children.
    pub fn subtree(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut order = Vec::new();
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            if let Some(node) = self.nodes.get(k) {
                order.push(k);
                stack.extend(node.children.iter().rev());
            }
        }
        order
    }

    pub fn ancestors(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(key).and_then(|n| n.parent);
        while let Some(k) = current {
            chain.push(k);
            current = self.nodes.get(k).and_then(|n| n.parent);
        }
        chain
    }

    /// Recomputes world transforms of the subtree top-down, then bounding boxes bottom-up.
    pub fn refresh_subtree(&mut self, key: NodeKey) {
        let order = self.subtree(key);
        for &k in &order {
            let parent_world = self
                .nodes
                .get(k)
                .and_then(|n| n.parent)
                .and_then(|p| self.nodes.get(p))
                .map(|p| p.world);
            if let Some(node) = self.nodes.get_mut(k) {
                node.world = match parent_world {
                    Some(parent) => &parent * &node.local,
                    None => node.local,
                };
            }
        }
        for &k in order.iter().rev() {
            self.update_bounding(k);
        }
    }

    /// Bounding box of `key` from its objects and its children's current boxes.
    pub fn update_bounding(&mut self, key: NodeKey) {
        let Some(node) = self.nodes.get(key) else {
            return;
        };
        let world = node.world.to_matrix();
        let mut bounding = node
            .objects
            .iter()
            .filter_map(|o| o.bounding())
            .map(|b| b.transformed(&world))
            .reduce(|a, b| a.merge(&b));
        for child in &node.children {
            if let Some(child_box) = self.nodes.get(*child).and_then(|c| c.bounding) {
                bounding = Some(match bounding {
                    Some(b) => b.merge(&child_box),
                    None => child_box,
                });
            }
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.bounding = bounding;
        }
    }

    pub fn update_ancestors_bounding(&mut self, key: NodeKey) {
        for ancestor in self.ancestors(key) {
            self.update_bounding(ancestor);
        }
    }

    /// Builds the node's own batch from the objects of its subtree.
    pub fn prepare_drawcall(&mut self, key: NodeKey) {
        let order = self.subtree(key);
        let objects: Vec<&Object> = order
            .iter()
            .filter_map(|k| self.nodes.get(*k))
            .flat_map(|n| n.objects.iter())
            .collect();
        let aggregator = InstanceAggregator::from_objects(objects);
        let mut batch = MultiInstance::new(&aggregator);
        batch.gather(self.gather_subtree(key, None, [f32::MAX; 2]));
        if let Some(node) = self.nodes.get_mut(key) {
            node.drawcall = Some(batch);
        }
    }

    /// Instances of every drawable object below `key`, choosing the LOD by
    /// distance to `eye` when given.
    pub fn gather_subtree(
        &self,
        key: NodeKey,
        eye: Option<Vector3<f32>>,
        lod_distances: [f32; 2],
    ) -> Vec<GatheredInstance> {
        let mut out = Vec::new();
        for k in self.subtree(key) {
            let Some(node) = self.nodes.get(k) else {
                continue;
            };
            for object in &node.objects {
                let model = node.object_world(object);
                let distance = eye
                    .map(|e| (model.w.truncate() - e).magnitude())
                    .unwrap_or(0.0);
                let Some(mesh) = object.lod_mesh(distance, lod_distances) else {
                    continue;
                };
                out.push(GatheredInstance {
                    mesh: mesh.id(),
                    model,
                    sphere: node.object_sphere(object),
                });
            }
        }
        out
    }
}
