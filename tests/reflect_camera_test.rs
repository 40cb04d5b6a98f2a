mod common;

use approx::assert_relative_eq;
use batch_ngin::{
    camera::reflection_matrix,
    cgmath::{Point3, Vector3},
    data_structures::bounding::BoundingSphere,
};
use common::{registry, scene};

#[test]
fn no_reflection_without_water() {
    let mut scene = scene();
    scene.create_reflect_camera();
    assert!(!scene.update_reflect_camera());
}

#[test]
fn no_reflection_without_reflect_camera() {
    let assets = registry();
    let mut scene = scene();
    scene.create_water(&assets, Vector3::new(0.0, 1.0, 0.0));
    assert!(!scene.update_reflect_camera());
    assert!(scene.reflect_camera().is_none());
}

#[test]
fn reflect_camera_mirrors_across_the_water() {
    let assets = registry();
    let mut scene = scene();
    scene.create_water(&assets, Vector3::new(0.0, 1.0, 0.0));
    scene.create_reflect_camera();
    assert!(scene.update_reflect_camera());

    let active = scene.act_camera().clone();
    let reflect = scene.reflect_camera().unwrap();
    assert_relative_eq!(reflect.view(), active.view() * reflection_matrix(1.0), epsilon = 1e-5);
    assert_relative_eq!(reflect.look_dir().y, -active.look_dir().y);
    assert_relative_eq!(reflect.look_dir().x, active.look_dir().x);
    assert_relative_eq!(reflect.position, Point3::new(0.0, -8.0, 20.0));
    assert_eq!(reflect.projection, active.projection);
    assert_relative_eq!(
        reflect.view_proj(),
        active.projection.calc_matrix() * reflect.view(),
        epsilon = 1e-5
    );
}

#[test]
fn reflect_frustum_sees_the_mirrored_scene() {
    let assets = registry();
    let mut scene = scene();
    scene.create_water(&assets, Vector3::new(0.0, 1.0, 0.0));
    scene.create_reflect_camera();

    let ground = BoundingSphere {
        center: Vector3::new(0.0, 0.0, 0.0),
        radius: 0.5,
    };
    let mirrored = BoundingSphere {
        center: Vector3::new(0.0, 2.0, 0.0),
        radius: 0.5,
    };
    assert!(scene.act_camera().frustum().intersects(&ground));

    scene.update_reflect_camera();
    assert!(scene.reflect_camera().unwrap().frustum().intersects(&mirrored));
}

#[test]
fn reflection_tracks_camera_moves() {
    let assets = registry();
    let mut scene = scene();
    scene.create_water(&assets, Vector3::new(0.0, 2.0, 0.0));
    scene.create_reflect_camera();

    scene
        .act_camera_mut()
        .set_look(Point3::new(5.0, 12.0, 0.0), Vector3::new(0.0, -1.0, -1.0));
    scene.update_reflect_camera();
    let reflect = scene.reflect_camera().unwrap();
    assert_relative_eq!(reflect.position, Point3::new(5.0, -8.0, 0.0));
    assert!(reflect.look_dir().y > 0.0);
}
