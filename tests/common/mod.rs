#![allow(dead_code)]

use batch_ngin::{
    camera::{Camera, Projection},
    cgmath::{Deg, Vector3},
    data_structures::model::{Material, Mesh},
    resources::AssetRegistry,
    scene::Scene,
};

/// Axis aligned cube spanning `-0.5..0.5`.
pub fn box_mesh(name: &str) -> Mesh {
    let mut positions = Vec::with_capacity(8);
    for i in 0..8u8 {
        let bit = |b: u8| if i & (1 << b) == 0 { -0.5 } else { 0.5 };
        positions.push([bit(0), bit(1), bit(2)]);
    }
    let indices = vec![
        0, 2, 1, 1, 2, 3, 4, 5, 6, 5, 7, 6, 0, 1, 4, 1, 5, 4, 2, 6, 3, 3, 6, 7, 0, 4, 2, 2, 4, 6,
        1, 3, 5, 3, 7, 5,
    ];
    Mesh::new(name, positions, indices)
}

/// Flat square on the xz plane, `size` wide, with its corner at the origin.
pub fn plane_mesh(name: &str, size: f32) -> Mesh {
    Mesh::new(
        name,
        vec![
            [0.0, 0.0, 0.0],
            [size, 0.0, 0.0],
            [0.0, 0.0, size],
            [size, 0.0, size],
        ],
        vec![0, 2, 1, 1, 2, 3],
    )
}

pub fn camera() -> Camera {
    Camera::new(
        (0.0, 10.0, 20.0),
        Vector3::new(0.0, -0.4, -1.0),
        Projection::new(800, 600, Deg(45.0), 0.1, 500.0),
    )
}

pub fn scene() -> Scene {
    Scene::new(camera())
}

/// Registry with every mesh and material the scene factories look up.
pub fn registry() -> AssetRegistry {
    let mut assets = AssetRegistry::new();
    assets.add_mesh(box_mesh("box"));
    assets.add_mesh(box_mesh("sphere"));
    assets.add_mesh(plane_mesh("water", 100.0));
    assets.add_mesh(plane_mesh("terrain", 100.0));
    for name in ["black", "water", "terrain_mat", "sky"] {
        assets.add_material(Material::new(name));
    }
    let mut leaves = Material::new("leaves");
    leaves.billboard = true;
    assets.add_material(leaves);
    let mut cloth = Material::new("cloth");
    cloth.single_sided = true;
    assets.add_material(cloth);
    assets
}
