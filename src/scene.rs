//! The scene: node roots, cameras, singletons and the per-mesh aggregation.
//!
//! All per-frame maintenance runs on the thread that owns the [`Scene`]:
//! [`Scene::update_nodes`] before gathering, [`Scene::update_anim_nodes`] after
//! animation, [`Scene::flush_nodes`] after the frame's draws were submitted.

use std::sync::Arc;

use cgmath::{InnerSpace, Vector3};

use crate::{
    camera::{self, Camera},
    data_structures::{
        aggregate::InstanceAggregator,
        bounding::Aabb,
        model::{Mesh, MeshId},
        multi_instance::GatheredInstance,
        scene_graph::{NodeKey, NodeKind, Object, SceneGraph},
        terrain::{BlockWindow, HeightField, TERRAIN_RESOLUTION},
    },
    resources::AssetRegistry,
};

/// Vertical slack below which an animation node counts as standing on the ground.
const GROUND_EPSILON: f32 = 1e-4;

/// Camera the frame is rendered from.
#[derive(Clone, Debug)]
pub enum RenderCamera {
    /// Render from the active camera.
    Active,
    Owned(Camera),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Player {
    pub node: NodeKey,
    pub position: Vector3<f32>,
}

#[derive(Debug)]
pub struct Scene {
    graph: SceneGraph,
    aggregator: InstanceAggregator,
    static_root: NodeKey,
    billboard_root: NodeKey,
    animation_root: NodeKey,
    act_camera: Camera,
    render_camera: RenderCamera,
    reflect_camera: Option<Camera>,
    water: Option<NodeKey>,
    terrain: Option<NodeKey>,
    sky: Option<NodeKey>,
    height_field: Option<HeightField>,
    visual_window: Option<BlockWindow>,
    animation_nodes: Vec<NodeKey>,
    anim_to_update: Vec<NodeKey>,
    player: Option<Player>,
    bounding_nodes: Vec<NodeKey>,
    lod_distances: [f32; 2],
}

impl Scene {
    pub fn new(camera: Camera) -> Self {
        let mut graph = SceneGraph::new();
        let origin = Vector3::new(0.0, 0.0, 0.0);
        let static_root = graph.insert_node(NodeKind::Static, origin);
        let billboard_root = graph.insert_node(NodeKind::Static, origin);
        let animation_root = graph.insert_node(NodeKind::Static, origin);
        Self {
            graph,
            aggregator: InstanceAggregator::new(),
            static_root,
            billboard_root,
            animation_root,
            act_camera: camera,
            render_camera: RenderCamera::Active,
            reflect_camera: None,
            water: None,
            terrain: None,
            sky: None,
            height_field: None,
            visual_window: None,
            animation_nodes: Vec::new(),
            anim_to_update: Vec::new(),
            player: None,
            bounding_nodes: Vec::new(),
            lod_distances: [60.0, 180.0],
        }
    }

    pub fn with_lod_distances(mut self, lod_distances: [f32; 2]) -> Self {
        self.lod_distances = lod_distances;
        self
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    pub fn aggregator(&self) -> &InstanceAggregator {
        &self.aggregator
    }

    pub fn static_root(&self) -> NodeKey {
        self.static_root
    }

    pub fn billboard_root(&self) -> NodeKey {
        self.billboard_root
    }

    pub fn animation_root(&self) -> NodeKey {
        self.animation_root
    }

    pub fn roots(&self) -> [NodeKey; 3] {
        [self.static_root, self.billboard_root, self.animation_root]
    }

    pub fn act_camera(&self) -> &Camera {
        &self.act_camera
    }

    pub fn act_camera_mut(&mut self) -> &mut Camera {
        &mut self.act_camera
    }

    pub fn render_camera(&self) -> &Camera {
        match &self.render_camera {
            RenderCamera::Active => &self.act_camera,
            RenderCamera::Owned(camera) => camera,
        }
    }

    /// Renders from `camera`, or from the active camera again with `None`.
    pub fn set_render_camera(&mut self, camera: Option<Camera>) {
        self.render_camera = camera.map_or(RenderCamera::Active, RenderCamera::Owned);
    }

    pub fn reflect_camera(&self) -> Option<&Camera> {
        self.reflect_camera.as_ref()
    }

    pub fn water(&self) -> Option<NodeKey> {
        self.water
    }

    pub fn terrain(&self) -> Option<NodeKey> {
        self.terrain
    }

    pub fn sky(&self) -> Option<NodeKey> {
        self.sky
    }

    pub fn height_field(&self) -> Option<&HeightField> {
        self.height_field.as_ref()
    }

    pub fn visual_window(&self) -> Option<BlockWindow> {
        self.visual_window
    }

    pub fn player(&self) -> Option<&Player> {
        self.player.as_ref()
    }

    pub fn animation_nodes(&self) -> &[NodeKey] {
        &self.animation_nodes
    }

    pub fn bounding_nodes(&self) -> &[NodeKey] {
        &self.bounding_nodes
    }

    /// Inserts a node below `parent`.
    pub fn add_node(&mut self, parent: NodeKey, kind: NodeKind, position: Vector3<f32>) -> NodeKey {
        let key = self.graph.insert_node(kind, position);
        self.graph.attach_child(parent, key);
        if kind == NodeKind::Animation {
            self.track_animation_node(key);
        }
        key
    }

    /**
     * Attaches `object` to `node` and registers it for batching.
     *
     * Mesh objects bump the instance count of each distinct LOD mesh. Objects
     * without a mesh but with an animation are registered as animations and
     * their node is tracked for per-frame animation updates.
     */
    pub fn add_object(&mut self, node: NodeKey, object: Object) -> Option<usize> {
        if !self.graph.contains(node) {
            log::warn!("Dropping object for a node that no longer exists");
            return None;
        }
        if self.aggregator.register(&object) {
            self.track_animation_node(node);
        }
        self.graph.add_object(node, object)
    }

    fn track_animation_node(&mut self, node: NodeKey) {
        if !self.animation_nodes.contains(&node) {
            self.animation_nodes.push(node);
        }
    }

    /// Instance count of `mesh`, 0 for meshes never added.
    pub fn query_mesh_count(&self, mesh: MeshId) -> u32 {
        self.aggregator.count(mesh)
    }

    pub fn update_nodes(&mut self) -> usize {
        self.graph.update_nodes()
    }

    /// Destroys the nodes queued for removal. Call after the frame was submitted.
    pub fn flush_nodes(&mut self) -> usize {
        let destroyed = self.graph.flush_nodes();
        if destroyed > 0 {
            self.forget_dead_nodes();
        }
        destroyed
    }

    fn forget_dead_nodes(&mut self) {
        let graph = &self.graph;
        self.animation_nodes.retain(|k| graph.contains(*k));
        self.anim_to_update.retain(|k| graph.contains(*k));
        self.bounding_nodes.retain(|k| graph.contains(*k));
        for singleton in [&mut self.water, &mut self.terrain, &mut self.sky] {
            if singleton.is_some_and(|k| !graph.contains(k)) {
                *singleton = None;
            }
        }
        if self.terrain.is_none() {
            self.height_field = None;
            self.visual_window = None;
        }
        if self.player.is_some_and(|p| !graph.contains(p.node)) {
            self.player = None;
        }
    }

    /// Queues an animation node for the next [`Self::update_anim_nodes`].
    pub fn push_anim_update(&mut self, node: NodeKey) {
        if self.graph.set_anim_pending(node, true) {
            self.anim_to_update.push(node);
        }
    }

    /**
     * Processes every pending animation node: world transform and bounding box
     * from its current local placement, then ground contact, player sync and
     * the bounding boxes of its ancestors.
     */
    pub fn update_anim_nodes(&mut self) -> usize {
        let queue = std::mem::take(&mut self.anim_to_update);
        let mut updated = 0;
        for key in queue {
            if !self.graph.contains(key) {
                continue;
            }
            self.graph.refresh_subtree(key);
            self.stand_on_ground(key);
            if let Some(player) = self.player.as_mut().filter(|p| p.node == key) {
                if let Some(node) = self.graph.get(key) {
                    player.position = node.world().position;
                }
            }
            self.graph.update_ancestors_bounding(key);
            self.graph.set_anim_pending(key, false);
            updated += 1;
        }
        updated
    }

    /// Shifts `key` vertically so its bounding box rests on the terrain. No-op without terrain.
    pub fn stand_on_ground(&mut self, key: NodeKey) {
        let Some(node) = self.graph.get(key) else {
            return;
        };
        let (Some(bounding), Some(field)) = (node.bounding(), self.height_field.as_ref()) else {
            return;
        };
        let center = bounding.center();
        let Some(ground) = field.height_at(center.x, center.z) else {
            return;
        };
        let delta = ground - bounding.min.y;
        if delta.abs() <= GROUND_EPSILON {
            return;
        }
        let p = node.world().position;
        self.graph.translate_node_at_world(key, p.x, p.y + delta, p.z);
    }

    /// Full transform and bounding refresh of every animation node.
    pub fn init_anim_nodes(&mut self) {
        for key in self.animation_nodes.clone() {
            self.graph.refresh_subtree(key);
            self.graph.update_ancestors_bounding(key);
        }
    }

    /// Poses every animation object at `time` seconds and queues its node.
    pub fn animate(&mut self, time: f32) {
        for key in self.animation_nodes.clone() {
            let Some(node) = self.graph.get(key) else {
                continue;
            };
            let poses: Vec<(usize, _)> = node
                .objects()
                .iter()
                .enumerate()
                .filter_map(|(i, o)| o.animation.as_ref().map(|a| (i, a.sample(time))))
                .collect();
            for (index, pose) in poses {
                self.graph.update_object(key, index, |o| o.pose = pose);
            }
            self.push_anim_update(key);
        }
    }

    pub fn add_player(&mut self, node: NodeKey) {
        let Some(position) = self.graph.get(node).map(|n| n.world().position) else {
            return;
        };
        self.track_animation_node(node);
        self.player = Some(Player { node, position });
    }

    pub fn create_reflect_camera(&mut self) {
        self.reflect_camera = Some(self.act_camera.clone());
    }

    /// Mirrors the active camera across the water plane.
    /// Returns `false` without water or reflect camera.
    pub fn update_reflect_camera(&mut self) -> bool {
        let Some(height) = self
            .water
            .and_then(|k| self.graph.get(k))
            .map(|n| n.world().position.y)
        else {
            return false;
        };
        let Some(reflect) = self.reflect_camera.as_mut() else {
            return false;
        };
        camera::update_reflection(&self.act_camera, reflect, height);
        true
    }

    pub fn create_water(&mut self, assets: &AssetRegistry, position: Vector3<f32>) -> NodeKey {
        let old = self.water.take();
        let key = self.create_singleton(assets, old, NodeKind::Water, position, "water", "water");
        self.water = Some(key);
        key
    }

    pub fn create_sky(&mut self, assets: &AssetRegistry, position: Vector3<f32>) -> NodeKey {
        let old = self.sky.take();
        let key = self.create_singleton(assets, old, NodeKind::Sky, position, "sphere", "sky");
        self.sky = Some(key);
        key
    }

    /// Creates the terrain node and samples its collision height field.
    pub fn create_terrain(&mut self, assets: &AssetRegistry, position: Vector3<f32>) -> NodeKey {
        let old = self.terrain.take();
        let key = self.create_singleton(
            assets,
            old,
            NodeKind::Terrain,
            position,
            "terrain",
            "terrain_mat",
        );
        self.terrain = Some(key);
        self.prepare_collision_data();
        key
    }

    fn create_singleton(
        &mut self,
        assets: &AssetRegistry,
        old: Option<NodeKey>,
        kind: NodeKind,
        position: Vector3<f32>,
        mesh: &str,
        material: &str,
    ) -> NodeKey {
        if let Some(old) = old {
            self.graph.remove_node(old);
        }
        let key = self.add_node(self.static_root, kind, position);
        self.graph.set_full_static(key, true);
        let mut object = Object::new(assets.mesh(mesh));
        let material_id = assets.material(material);
        object.bind_material(material_id, material_id.and_then(|id| assets.material_by_id(id)));
        self.add_object(key, object);
        self.graph.refresh_subtree(key);
        self.graph.update_ancestors_bounding(key);
        self.graph.prepare_drawcall(key);
        key
    }

    /// Samples the terrain mesh into the height field ground queries use.
    pub fn prepare_collision_data(&mut self) {
        self.height_field = self.terrain.and_then(|key| {
            let node = self.graph.get(key)?;
            let object = node.objects().first()?;
            let mesh = object.mesh.as_ref()?;
            HeightField::from_mesh(mesh, &node.object_world(object), TERRAIN_RESOLUTION)
        });
    }

    /// Ground height at `(x, z)`, `None` without terrain or outside it.
    pub fn ground_height(&self, x: f32, z: f32) -> Option<f32> {
        self.height_field.as_ref()?.height_at(x, z)
    }

    /**
     * Records the block window the host's terrain renderer should stream in.
     * The batched terrain mesh itself is always drawn whole; the window is
     * only state for a block-based terrain pass, read back via
     * [`Scene::visual_window`]. Ignored without terrain.
     */
    pub fn update_visual_terrain(&mut self, bx: i32, bz: i32, size_x: i32, size_z: i32) {
        if self.terrain.is_none() {
            return;
        }
        self.visual_window = Some(BlockWindow {
            bx,
            bz,
            size_x,
            size_z,
        });
    }

    /**
     * Debug view of the bounding hierarchy: one box proxy per node reachable
     * from the roots, plus one per object bounding box of the leaf nodes. Proxies are standalone
     * nodes outside the scene tree, each drawn from its own drawcall.
     */
    pub fn create_node_aabb(&mut self, assets: &AssetRegistry) -> usize {
        let Some(box_mesh) = assets.mesh("box") else {
            return 0;
        };
        let material_id = assets.material("black");
        let material = material_id.and_then(|id| assets.material_by_id(id));

        let mut volumes: Vec<Aabb> = Vec::new();
        let mut stack: Vec<NodeKey> = self.roots().to_vec();
        while let Some(key) = stack.pop() {
            let Some(node) = self.graph.get(key) else {
                continue;
            };
            volumes.extend(node.bounding().copied());
            if node.children().is_empty() {
                let world = node.world().to_matrix();
                volumes.extend(
                    node.objects()
                        .iter()
                        .filter_map(|o| o.bounding())
                        .map(|b| b.transformed(&world)),
                );
            }
            stack.extend(node.children().iter().copied());
        }

        for volume in &volumes {
            let key = self.graph.insert_node(NodeKind::Static, volume.center());
            self.graph.set_dynamic_batch(key, false);
            let mut object = Object::new(Some(box_mesh.clone()));
            object.bind_material(material_id, material);
            let (scale, offset) = fit_box(&box_mesh, volume);
            object.set_size(scale.x, scale.y, scale.z);
            object.set_position(offset.x, offset.y, offset.z);
            self.add_object(key, object);
            self.graph.refresh_subtree(key);
            self.graph.prepare_drawcall(key);
            self.bounding_nodes.push(key);
        }
        log::debug!("Created {} bounding box proxies", volumes.len());
        volumes.len()
    }

    pub fn clear_all_aabb(&mut self) {
        for key in std::mem::take(&mut self.bounding_nodes) {
            self.graph.remove_node(key);
        }
    }

    /**
     * World instances of every object drawn by the dynamic batch.
     *
     * Subtrees of full-static and non-dynamic-batch nodes are skipped, they
     * draw from their own drawcall. The LOD is chosen by distance to the
     * render camera.
     */
    pub fn gather_instances(&self) -> Vec<GatheredInstance> {
        let eye = self.render_camera().position;
        let eye = Vector3::new(eye.x, eye.y, eye.z);
        let mut out = Vec::new();
        let mut stack: Vec<NodeKey> = self.roots().to_vec();
        while let Some(key) = stack.pop() {
            let Some(node) = self.graph.get(key) else {
                continue;
            };
            if node.is_static_batch() {
                continue;
            }
            for object in node.objects() {
                let model = node.object_world(object);
                let distance = (model.w.truncate() - eye).magnitude();
                let Some(mesh) = object.lod_mesh(distance, self.lod_distances) else {
                    continue;
                };
                out.push(GatheredInstance {
                    mesh: mesh.id(),
                    model,
                    sphere: node.object_sphere(object),
                });
            }
            stack.extend(node.children().iter().copied());
        }
        out
    }
}

/// Scale and offset that stretch `mesh`'s bounds over `volume`, relative to the volume center.
fn fit_box(mesh: &Arc<Mesh>, volume: &Aabb) -> (Vector3<f32>, Vector3<f32>) {
    let bounds = mesh.bounds();
    let size = bounds.size();
    let target = volume.size();
    let ratio = |t: f32, s: f32| if s > f32::EPSILON { t / s } else { 1.0 };
    let scale = Vector3::new(
        ratio(target.x, size.x),
        ratio(target.y, size.y),
        ratio(target.z, size.z),
    );
    let center = bounds.center();
    let offset = -Vector3::new(center.x * scale.x, center.y * scale.y, center.z * scale.z);
    (scale, offset)
}
