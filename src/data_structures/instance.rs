//! Instance transformation data for GPU batching.
//!
//! An [`Instance`] is the CPU-side placement of a node or object. Batches turn
//! world-space instances into [`InstanceRecord`]s, the per-instance input of the
//! culling compute pass, which writes the surviving world matrices as
//! [`TransformRaw`] into the vertex-visible transform-out buffer.

use std::ops::Mul;

use cgmath::{ElementWise, Matrix4, One, Quaternion, Rotation3, Vector3};

use crate::data_structures::bounding::BoundingSphere;

/// Position, rotation (as quaternion) and scale of a placed element.
///
/// Composition follows the scene hierarchy: `parent * local` yields the child's
/// world placement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instance {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Instance {
    /// Identity placement.
    pub fn new() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Euler angles in degrees, applied in x, y, z order.
    pub fn with_angles(mut self, ax: f32, ay: f32, az: f32) -> Self {
        self.rotation = Quaternion::from_angle_z(cgmath::Deg(az))
            * Quaternion::from_angle_y(cgmath::Deg(ay))
            * Quaternion::from_angle_x(cgmath::Deg(ax));
        self
    }

    pub fn with_scale(mut self, sx: f32, sy: f32, sz: f32) -> Self {
        self.scale = Vector3::new(sx, sy, sz);
        self
    }

    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    pub fn to_raw(&self) -> TransformRaw {
        TransformRaw {
            model: self.to_matrix().into(),
        }
    }
}

impl Mul<Instance> for Instance {
    type Output = Self;

    fn mul(self, rhs: Instance) -> Self::Output {
        &self * &rhs
    }
}

impl Mul<&Instance> for &Instance {
    type Output = Instance;

    /// `self` is the parent: its scale applies to the child's offset before its rotation.
    fn mul(self, child: &Instance) -> Instance {
        let offset = self.scale.mul_element_wise(child.position);
        Instance {
            position: self.position + self.rotation * offset,
            rotation: self.rotation * child.rotation,
            scale: self.scale.mul_element_wise(child.scale),
        }
    }
}

impl From<Vector3<f32>> for Instance {
    fn from(position: Vector3<f32>) -> Self {
        Self {
            position,
            ..Self::new()
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

/**
 * A world matrix as the culling pass writes it into the transform-out buffer.
 * The draw pipelines read it as an instance-step vertex attribute (four vec4 columns).
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TransformRaw {
    pub model: [[f32; 4]; 4],
}

/**
 * Per-instance input of the culling pass.
 *
 * `command` indexes the indirect command inside the buffer selected by `category`
 * (0 normal, 1 single-sided, 2 billboard). The layout must stay in sync with
 * `InstanceRecord` in `cull.wgsl` (96 bytes).
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRecord {
    pub model: [[f32; 4]; 4],
    pub sphere: [f32; 4],
    pub command: u32,
    pub category: u32,
    pub _padding: [u32; 2],
}

impl InstanceRecord {
    pub fn new(model: Matrix4<f32>, sphere: BoundingSphere, command: u32, category: u32) -> Self {
        Self {
            model: model.into(),
            sphere: [sphere.center.x, sphere.center.y, sphere.center.z, sphere.radius],
            command,
            category,
            _padding: [0; 2],
        }
    }
}
