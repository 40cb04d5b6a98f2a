mod common;

use std::sync::Arc;

use batch_ngin::{
    cgmath::{Matrix4, Vector3},
    data_structures::{
        aggregate::InstanceAggregator,
        bounding::BoundingSphere,
        model::{DrawCategory, Material, Mesh},
        multi_instance::{GatheredInstance, MultiInstance},
        scene_graph::Object,
    },
};
use common::box_mesh;

fn object(mesh: &Arc<Mesh>, material: Option<&Material>) -> Object {
    let mut object = Object::new(Some(mesh.clone()));
    object.bind_material(None, material);
    object
}

fn instance(mesh: &Arc<Mesh>, x: f32) -> GatheredInstance {
    GatheredInstance {
        mesh: mesh.id(),
        model: Matrix4::from_translation(Vector3::new(x, 0.0, 0.0)),
        sphere: BoundingSphere {
            center: Vector3::new(x, 0.0, 0.0),
            radius: 1.0,
        },
    }
}

#[test]
fn instance_ranges_partition_the_batch() {
    let meshes: Vec<Arc<Mesh>> = (0..4).map(|i| Arc::new(box_mesh(&format!("mesh{i}")))).collect();
    let mut leaves = Material::new("leaves");
    leaves.billboard = true;
    let counts = [3usize, 1, 4, 2];

    let mut objects = Vec::new();
    for (mesh, &count) in meshes.iter().zip(&counts) {
        let material = (mesh.name == "mesh2").then_some(&leaves);
        objects.extend((0..count).map(|_| object(mesh, material)));
    }
    let aggregator = InstanceAggregator::from_objects(&objects);
    let mut batch = MultiInstance::new(&aggregator);
    assert_eq!(batch.max_instances(), 10);
    assert_eq!(batch.command_counts(), [3, 0, 1]);

    let mut ranges: Vec<(u32, u32)> = batch
        .entries()
        .iter()
        .map(|e| (e.base, e.base + e.capacity))
        .collect();
    ranges.sort();
    assert_eq!(ranges.first().map(|r| r.0), Some(0));
    for pair in ranges.windows(2) {
        assert_eq!(pair[0].1, pair[1].0);
    }
    assert_eq!(ranges.last().map(|r| r.1), Some(10));

    let instances: Vec<GatheredInstance> = meshes
        .iter()
        .zip(&counts)
        .flat_map(|(mesh, &count)| (0..count).map(move |i| instance(mesh, i as f32)))
        .collect();
    assert_eq!(batch.gather(instances), 0);

    let total: u32 = DrawCategory::ALL
        .iter()
        .flat_map(|&c| batch.commands(c).iter())
        .map(|c| c.instance_count)
        .sum();
    assert_eq!(total, 10);
    assert_eq!(batch.instance_count(), 10);

    let billboard = batch.entry(meshes[2].id()).copied().unwrap();
    assert_eq!(billboard.category, DrawCategory::Billboard);
    assert_eq!(billboard.command, 0);
    assert_eq!(batch.commands(DrawCategory::Billboard)[0].instance_count, 4);
    assert_eq!(batch.commands(DrawCategory::Billboard)[0].first_instance, billboard.base);
}

#[test]
fn over_capacity_instances_are_dropped() {
    let mesh = Arc::new(box_mesh("crate"));
    let objects: Vec<Object> = (0..2).map(|_| object(&mesh, None)).collect();
    let mut batch = MultiInstance::new(&InstanceAggregator::from_objects(&objects));

    let dropped = batch.gather((0..5).map(|i| instance(&mesh, i as f32)));
    assert_eq!(dropped, 3);
    assert_eq!(batch.instance_count(), 2);
    assert_eq!(batch.commands(DrawCategory::Normal)[0].instance_count, 2);

    // each gather starts from empty commands
    assert_eq!(batch.gather(std::iter::once(instance(&mesh, 0.0))), 0);
    assert_eq!(batch.commands(DrawCategory::Normal)[0].instance_count, 1);
}

#[test]
fn empty_aggregation_gives_an_empty_batch() {
    let mut batch = MultiInstance::new(&InstanceAggregator::new());
    assert!(batch.entries().is_empty());
    assert!(batch.geometry().is_empty());
    assert_eq!(batch.dispatch_size(), 0);
    let stray = Arc::new(box_mesh("stray"));
    assert_eq!(batch.gather(std::iter::once(instance(&stray, 0.0))), 0);
    assert_eq!(batch.instance_count(), 0);
}
