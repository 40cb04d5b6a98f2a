//! Camera state consumed by the batcher.
//!
//! Input handling and camera controllers live with the application. The core
//! only needs view/projection matrices, the look direction for reflections, and
//! frustum planes for culling.

use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector3, Vector4, perspective};

use crate::data_structures::bounding::BoundingSphere;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// The six clip planes of a view, normals pointing inwards.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Frustum {
    pub planes: [[f32; 4]; 6],
}

impl Frustum {
    /// Extracts normalized planes (left, right, bottom, top, near, far) from a
    /// view-projection matrix with wgpu's 0..1 depth range.
    pub fn from_view_proj(m: &Matrix4<f32>) -> Self {
        let row = |i: usize| Vector4::new(m.x[i], m.y[i], m.z[i], m.w[i]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let mut planes =
            [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(|p| [p.x, p.y, p.z, p.w]);
        for plane in &mut planes {
            let len = Vector3::new(plane[0], plane[1], plane[2]).magnitude();
            if len > 0.0 {
                plane.iter_mut().for_each(|v| *v /= len);
            }
        }
        Self { planes }
    }

    /// Same test the culling shader runs.
    pub fn intersects(&self, sphere: &BoundingSphere) -> bool {
        let c = sphere.center;
        self.planes
            .iter()
            .all(|p| p[0] * c.x + p[1] * c.y + p[2] * c.z + p[3] >= -sphere.radius)
    }
}

#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Point3<f32>,
    look_dir: Vector3<f32>,
    up: Vector3<f32>,
    view: Matrix4<f32>,
    pub projection: Projection,
    view_proj: Matrix4<f32>,
    frustum: Frustum,
}

impl Camera {
    pub fn new<P: Into<Point3<f32>>>(
        position: P,
        look_dir: Vector3<f32>,
        projection: Projection,
    ) -> Self {
        let mut camera = Self {
            position: position.into(),
            look_dir: look_dir.normalize(),
            up: Vector3::unit_y(),
            view: Matrix4::from_scale(1.0),
            projection,
            view_proj: Matrix4::from_scale(1.0),
            frustum: Frustum::default(),
        };
        camera.look_at();
        camera
    }

    /// Moves the camera and recomputes its view from position and look direction.
    pub fn set_look(&mut self, position: Point3<f32>, look_dir: Vector3<f32>) {
        self.position = position;
        self.look_dir = look_dir.normalize();
        self.look_at();
    }

    fn look_at(&mut self) {
        self.view = Matrix4::look_to_rh(self.position, self.look_dir, self.up);
        self.force_refresh();
        self.update_frustum();
    }

    /// Overrides the view matrix; used for derived cameras whose view is not a look-at.
    pub fn set_view(&mut self, view: Matrix4<f32>, look_dir: Vector3<f32>) {
        self.view = view;
        self.look_dir = look_dir;
    }

    pub fn view(&self) -> Matrix4<f32> {
        self.view
    }

    pub fn look_dir(&self) -> Vector3<f32> {
        self.look_dir
    }

    pub fn view_proj(&self) -> Matrix4<f32> {
        self.view_proj
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Recomputes the cached view-projection matrix.
    pub fn force_refresh(&mut self) {
        self.view_proj = self.projection.calc_matrix() * self.view;
    }

    pub fn update_frustum(&mut self) {
        self.frustum = Frustum::from_view_proj(&self.view_proj);
    }
}

/// Mirror across the horizontal plane `y = height`.
pub fn reflection_matrix(height: f32) -> Matrix4<f32> {
    Matrix4::from_translation(Vector3::new(0.0, height, 0.0))
        * Matrix4::from_nonuniform_scale(1.0, -1.0, 1.0)
        * Matrix4::from_translation(Vector3::new(0.0, -height, 0.0))
}

/**
 * Derives the planar reflection of `active` into `reflect`.
 *
 * The reflected view is the active view composed with the mirror across
 * `y = height`, the look direction has its vertical component negated, and the
 * projection is copied. Matrices and frustum are refreshed unconditionally.
 */
pub fn update_reflection(active: &Camera, reflect: &mut Camera, height: f32) {
    let mut look_dir = active.look_dir();
    look_dir.y = -look_dir.y;
    reflect.position = Point3::new(
        active.position.x,
        2.0 * height - active.position.y,
        active.position.z,
    );
    reflect.projection = active.projection;
    reflect.set_view(active.view() * reflection_matrix(height), look_dir);
    reflect.force_refresh();
    reflect.update_frustum();
}
