mod common;

use approx::assert_relative_eq;
use std::sync::Arc;

use batch_ngin::{
    cgmath::Vector3,
    data_structures::{
        bounding::Aabb,
        instance::Instance,
        model::Mesh,
        scene_graph::{NodeKey, NodeKind, Object},
    },
    resources::animation::Animation,
    scene::Scene,
};
use common::{registry, scene};

fn boxed_node(scene: &mut Scene, kind: NodeKind, position: Vector3<f32>) -> NodeKey {
    let assets = registry();
    let parent = match kind {
        NodeKind::Animation => scene.animation_root(),
        _ => scene.static_root(),
    };
    let node = scene.add_node(parent, kind, position);
    scene.add_object(node, Object::new(assets.mesh("box")));
    node
}

#[test]
fn update_pass_drains_the_queue() {
    let mut scene = scene();
    let a = boxed_node(&mut scene, NodeKind::Static, Vector3::new(1.0, 0.0, 0.0));
    let b = boxed_node(&mut scene, NodeKind::Static, Vector3::new(0.0, 0.0, 5.0));

    assert!(scene.update_nodes() >= 2);
    assert!(scene.graph().update_queue().is_empty());
    for key in [a, b] {
        assert!(!scene.graph().get(key).unwrap().needs_update());
    }
    // nothing changed since, so the second pass has nothing to do
    assert_eq!(scene.update_nodes(), 0);
}

#[test]
fn nodes_are_queued_once() {
    let mut scene = scene();
    let node = boxed_node(&mut scene, NodeKind::Static, Vector3::new(0.0, 0.0, 0.0));
    scene.update_nodes();

    scene.graph_mut().translate_node(node, 1.0, 0.0, 0.0);
    scene.graph_mut().translate_node(node, 2.0, 0.0, 0.0);
    scene.graph_mut().rotate_node(node, 0.0, 90.0, 0.0);
    assert_eq!(scene.graph().update_queue(), &[node]);
    assert_eq!(scene.update_nodes(), 1);
    assert_relative_eq!(scene.graph().get(node).unwrap().world().position.x, 2.0);
}

#[test]
fn world_transforms_and_bounds_follow_parents() {
    let mut scene = scene();
    let parent = boxed_node(&mut scene, NodeKind::Static, Vector3::new(10.0, 0.0, 0.0));
    let child = scene.add_node(parent, NodeKind::Static, Vector3::new(0.0, 3.0, 0.0));
    scene.add_object(child, Object::new(registry().mesh("box")));
    scene.update_nodes();

    let graph = scene.graph();
    let child_node = graph.get(child).unwrap();
    assert_relative_eq!(child_node.world().position, Vector3::new(10.0, 3.0, 0.0));

    let parent_box = graph.get(parent).unwrap().bounding().copied().unwrap();
    let child_box = child_node.bounding().copied().unwrap();
    assert!(parent_box.contains(&child_box));
    let root_box = graph.get(scene.static_root()).unwrap().bounding().copied().unwrap();
    assert!(root_box.contains(&parent_box));
}

#[test]
fn attach_refuses_cycles() {
    let mut scene = scene();
    let parent = scene.add_node(scene.static_root(), NodeKind::Static, Vector3::new(0.0, 0.0, 0.0));
    let child = scene.add_node(parent, NodeKind::Static, Vector3::new(0.0, 0.0, 0.0));

    scene.graph_mut().attach_child(child, parent);
    assert_eq!(scene.graph().get(parent).unwrap().parent(), Some(scene.static_root()));
    assert_eq!(scene.graph().get(child).unwrap().parent(), Some(parent));
}

#[test]
fn flush_destroys_exactly_the_queued_nodes() {
    let mut scene = scene();
    let keep = boxed_node(&mut scene, NodeKind::Static, Vector3::new(0.0, 0.0, 0.0));
    let gone = boxed_node(&mut scene, NodeKind::Static, Vector3::new(1.0, 0.0, 0.0));
    let gone_child = scene.add_node(gone, NodeKind::Static, Vector3::new(0.0, 1.0, 0.0));
    scene.update_nodes();

    scene.graph_mut().remove_node(gone);
    scene.graph_mut().remove_node(gone);
    assert_eq!(scene.graph().removal_queue(), &[gone]);
    // removed nodes stay alive until the flush
    assert!(scene.graph().contains(gone));
    assert!(scene.graph().get(gone).unwrap().pending_removal());
    assert!(!scene.graph().get(scene.static_root()).unwrap().children().contains(&gone));

    assert_eq!(scene.flush_nodes(), 1);
    assert!(!scene.graph().contains(gone));
    assert!(!scene.graph().contains(gone_child));
    assert!(scene.graph().contains(keep));

    // a second flush frees nothing twice
    assert_eq!(scene.flush_nodes(), 0);
}

#[test]
fn removals_after_a_flush_wait_for_the_next_one() {
    let mut scene = scene();
    let first = boxed_node(&mut scene, NodeKind::Static, Vector3::new(0.0, 0.0, 0.0));
    let second = boxed_node(&mut scene, NodeKind::Static, Vector3::new(1.0, 0.0, 0.0));

    scene.graph_mut().remove_node(first);
    assert_eq!(scene.flush_nodes(), 1);
    scene.graph_mut().remove_node(second);
    assert!(scene.graph().contains(second));
    assert_eq!(scene.flush_nodes(), 1);
    assert!(!scene.graph().contains(second));
}

#[test]
fn flushed_animation_nodes_are_forgotten() {
    let mut scene = scene();
    let node = boxed_node(&mut scene, NodeKind::Animation, Vector3::new(0.0, 0.0, 0.0));
    assert_eq!(scene.animation_nodes(), &[node]);
    scene.push_anim_update(node);

    scene.graph_mut().remove_node(node);
    scene.flush_nodes();
    assert!(scene.animation_nodes().is_empty());
    assert_eq!(scene.update_anim_nodes(), 0);
}

#[test]
fn animation_update_refreshes_ancestor_bounds() {
    let mut scene = scene();
    let node = boxed_node(&mut scene, NodeKind::Animation, Vector3::new(0.0, 0.0, 0.0));
    scene.update_nodes();

    scene.graph_mut().translate_node(node, 40.0, 0.0, 0.0);
    scene.push_anim_update(node);
    scene.push_anim_update(node);
    assert_eq!(scene.update_anim_nodes(), 1);

    let graph = scene.graph();
    let node_box = graph.get(node).unwrap().bounding().copied().unwrap();
    assert_relative_eq!(node_box.center().x, 40.0);
    assert!(!graph.get(node).unwrap().anim_pending());
    for ancestor in graph.ancestors(node) {
        let ancestor_box = graph.get(ancestor).unwrap().bounding().copied().unwrap();
        assert!(ancestor_box.contains(&node_box));
    }
}

#[test]
fn animation_nodes_stand_on_the_terrain() {
    let assets = registry();
    let mut scene = scene();
    scene.create_terrain(&assets, Vector3::new(0.0, 2.0, 0.0));
    assert_relative_eq!(scene.ground_height(50.0, 50.0).unwrap(), 2.0);

    let node = boxed_node(&mut scene, NodeKind::Animation, Vector3::new(50.0, 10.0, 50.0));
    scene.push_anim_update(node);
    scene.update_anim_nodes();

    let bounding = scene.graph().get(node).unwrap().bounding().copied().unwrap();
    assert_relative_eq!(bounding.min.y, 2.0, epsilon = 1e-4);
    assert_relative_eq!(scene.graph().get(node).unwrap().world().position.y, 2.5, epsilon = 1e-4);
}

#[test]
fn animation_nodes_follow_sloped_terrain() {
    // ramp rising along x: y = x / 2
    let mut assets = registry();
    assets.add_mesh(Mesh::new(
        "terrain",
        vec![
            [0.0, 0.0, 0.0],
            [100.0, 50.0, 0.0],
            [0.0, 0.0, 100.0],
            [100.0, 50.0, 100.0],
        ],
        vec![0, 2, 1, 1, 2, 3],
    ));
    let mut scene = scene();
    scene.create_terrain(&assets, Vector3::new(0.0, 0.0, 0.0));
    assert_relative_eq!(scene.ground_height(20.0, 50.0).unwrap(), 10.0, epsilon = 1e-3);
    assert_relative_eq!(scene.ground_height(80.0, 50.0).unwrap(), 40.0, epsilon = 1e-3);

    let low = boxed_node(&mut scene, NodeKind::Animation, Vector3::new(20.0, 0.0, 50.0));
    let high = boxed_node(&mut scene, NodeKind::Animation, Vector3::new(80.0, 0.0, 50.0));
    scene.push_anim_update(low);
    scene.push_anim_update(high);
    assert_eq!(scene.update_anim_nodes(), 2);

    for (key, ground) in [(low, 10.0), (high, 40.0)] {
        let bounding = scene.graph().get(key).unwrap().bounding().copied().unwrap();
        assert_relative_eq!(bounding.min.y, ground, epsilon = 1e-3);
    }
}

#[test]
fn animate_poses_objects_and_refreshes_bounds() {
    let rise = |y: f32| Instance {
        position: Vector3::new(0.0, y, 0.0),
        ..Instance::new()
    };
    let bounds = Aabb::new(Vector3::new(-0.5, 0.0, -0.5), Vector3::new(0.5, 1.0, 0.5));
    let clip = Arc::new(Animation::new(
        "rise",
        vec![rise(0.0), rise(10.0)],
        vec![0.0, 1.0],
        bounds,
    ));

    let mut scene = scene();
    let start = Vector3::new(3.0, 0.0, 0.0);
    let node = scene.add_node(scene.animation_root(), NodeKind::Animation, start);
    scene.add_object(node, Object::animated(clip));
    scene.init_anim_nodes();

    scene.animate(0.5);
    assert_eq!(scene.update_anim_nodes(), 1);

    let graph = scene.graph();
    let pose = graph.get(node).unwrap().objects()[0].pose;
    assert_relative_eq!(pose.position.y, 5.0, epsilon = 1e-5);
    let node_box = graph.get(node).unwrap().bounding().copied().unwrap();
    assert_relative_eq!(node_box.center(), Vector3::new(3.0, 5.5, 0.0), epsilon = 1e-4);
    for ancestor in graph.ancestors(node) {
        let ancestor_box = graph.get(ancestor).unwrap().bounding().copied().unwrap();
        assert!(ancestor_box.contains(&node_box));
    }
}

#[test]
fn standing_without_terrain_is_a_no_op() {
    let mut scene = scene();
    let node = boxed_node(&mut scene, NodeKind::Animation, Vector3::new(5.0, 10.0, 5.0));
    scene.push_anim_update(node);
    scene.update_anim_nodes();
    scene.stand_on_ground(node);
    assert_relative_eq!(scene.graph().get(node).unwrap().world().position.y, 10.0);
    assert!(scene.ground_height(5.0, 5.0).is_none());
}

#[test]
fn player_follows_its_node() {
    let mut scene = scene();
    let node = boxed_node(&mut scene, NodeKind::Animation, Vector3::new(0.0, 0.0, 0.0));
    scene.update_nodes();
    scene.add_player(node);

    scene.graph_mut().translate_node(node, 3.0, 0.0, -4.0);
    scene.push_anim_update(node);
    scene.update_anim_nodes();
    assert_relative_eq!(scene.player().unwrap().position, Vector3::new(3.0, 0.0, -4.0));
}

#[test]
fn singletons_replace_their_predecessor() {
    let assets = registry();
    let mut scene = scene();
    let water = scene.create_water(&assets, Vector3::new(0.0, 1.0, 0.0));
    let terrain = scene.create_terrain(&assets, Vector3::new(0.0, 0.0, 0.0));
    let sky = scene.create_sky(&assets, Vector3::new(0.0, 0.0, 0.0));

    for key in [water, terrain, sky] {
        let node = scene.graph().get(key).unwrap();
        assert!(node.is_full_static());
        assert!(node.drawcall().is_some_and(|d| d.instance_count() == 1));
    }

    let new_water = scene.create_water(&assets, Vector3::new(0.0, 3.0, 0.0));
    let new_terrain = scene.create_terrain(&assets, Vector3::new(0.0, 5.0, 0.0));
    assert_eq!(scene.water(), Some(new_water));
    assert_eq!(scene.terrain(), Some(new_terrain));
    assert!(scene.graph().get(water).unwrap().pending_removal());
    assert_relative_eq!(scene.ground_height(10.0, 10.0).unwrap(), 5.0);

    scene.flush_nodes();
    assert!(!scene.graph().contains(water));
    assert!(!scene.graph().contains(terrain));
    assert_eq!(scene.water(), Some(new_water));
    assert_eq!(scene.sky(), Some(sky));
    assert!(scene.height_field().is_some());
}

#[test]
fn static_batches_are_left_out_of_the_gather() {
    let assets = registry();
    let mut scene = scene();
    scene.create_water(&assets, Vector3::new(0.0, 0.0, 0.0));
    let node = boxed_node(&mut scene, NodeKind::Static, Vector3::new(0.0, 0.0, 0.0));
    scene.update_nodes();

    let gathered = scene.gather_instances();
    assert_eq!(gathered.len(), 1);
    let mesh = scene.graph().get(node).unwrap().objects()[0].mesh.clone().unwrap();
    assert_eq!(gathered[0].mesh, mesh.id());
}

#[test]
fn node_aabb_proxies_come_and_go() {
    let assets = registry();
    let mut scene = scene();
    boxed_node(&mut scene, NodeKind::Static, Vector3::new(4.0, 0.0, 0.0));
    scene.update_nodes();
    let nodes_before = scene.graph().len();

    // static root, the node and the node's object
    let created = scene.create_node_aabb(&assets);
    assert_eq!(created, 3);
    assert_eq!(scene.bounding_nodes().len(), created);
    assert_eq!(scene.graph().len(), nodes_before + created);
    for &key in scene.bounding_nodes() {
        let node = scene.graph().get(key).unwrap();
        assert!(node.is_static_batch());
        assert!(node.parent().is_none());
        assert!(node.drawcall().is_some());
    }
    // proxies draw from their own drawcall, not from the dynamic batch
    assert_eq!(scene.gather_instances().len(), 1);

    scene.clear_all_aabb();
    assert!(scene.bounding_nodes().is_empty());
    assert_eq!(scene.flush_nodes(), created);
    assert_eq!(scene.graph().len(), nodes_before);
}

#[test]
fn node_aabb_boxes_objects_of_leaves_only() {
    let assets = registry();
    let mut scene = scene();
    let parent = boxed_node(&mut scene, NodeKind::Static, Vector3::new(0.0, 0.0, 0.0));
    let child = scene.add_node(parent, NodeKind::Static, Vector3::new(2.0, 0.0, 0.0));
    scene.add_object(child, Object::new(assets.mesh("box")));
    scene.update_nodes();

    // static root, parent, child and the child's object
    assert_eq!(scene.create_node_aabb(&assets), 4);
}

#[test]
fn visual_terrain_window_needs_terrain() {
    let assets = registry();
    let mut scene = scene();
    scene.update_visual_terrain(1, 2, 3, 4);
    assert!(scene.visual_window().is_none());

    scene.create_terrain(&assets, Vector3::new(0.0, 0.0, 0.0));
    scene.update_visual_terrain(1, 2, 3, 4);
    let window = scene.visual_window().unwrap();
    assert_eq!((window.bx, window.bz, window.size_x, window.size_z), (1, 2, 3, 4));
}
