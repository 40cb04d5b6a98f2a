//! Bounding volumes for nodes and objects.
//!
//! Nodes keep a world-space [`Aabb`] enclosing their objects and children. The
//! culling pass only needs a sphere per instance, see [`Aabb::to_sphere`].

use cgmath::{InnerSpace, Matrix4, Vector3, Vector4};

/// Slack used for containment checks after float round-trips.
const CONTAINS_EPSILON: f32 = 1e-4;

/// Axis aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Vector3<f32>,
    pub radius: f32,
}

impl Aabb {
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    /// Box with the given center and full extents.
    pub fn from_center_size(center: Vector3<f32>, size: Vector3<f32>) -> Self {
        let half = size * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Smallest box around `points`, `None` for an empty iterator.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vector3<f32>>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut aabb = Self::new(first, first);
        for p in points {
            aabb.extend(p);
        }
        Some(aabb)
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn extend(&mut self, p: Vector3<f32>) {
        self.min = Vector3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Vector3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    pub fn merge(&self, other: &Aabb) -> Aabb {
        let mut merged = *self;
        merged.extend(other.min);
        merged.extend(other.max);
        merged
    }

    /// Whether `other` lies completely inside `self`.
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x + CONTAINS_EPSILON
            && self.min.y <= other.min.y + CONTAINS_EPSILON
            && self.min.z <= other.min.z + CONTAINS_EPSILON
            && self.max.x + CONTAINS_EPSILON >= other.max.x
            && self.max.y + CONTAINS_EPSILON >= other.max.y
            && self.max.z + CONTAINS_EPSILON >= other.max.z
    }

    pub fn corners(&self) -> [Vector3<f32>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vector3::new(a.x, a.y, a.z),
            Vector3::new(b.x, a.y, a.z),
            Vector3::new(a.x, b.y, a.z),
            Vector3::new(b.x, b.y, a.z),
            Vector3::new(a.x, a.y, b.z),
            Vector3::new(b.x, a.y, b.z),
            Vector3::new(a.x, b.y, b.z),
            Vector3::new(b.x, b.y, b.z),
        ]
    }

    /// Box around the eight transformed corners.
    pub fn transformed(&self, m: &Matrix4<f32>) -> Aabb {
        let corners = self
            .corners()
            .map(|c| (m * Vector4::new(c.x, c.y, c.z, 1.0)).truncate());
        let mut aabb = Aabb::new(corners[0], corners[0]);
        corners[1..].iter().for_each(|c| aabb.extend(*c));
        aabb
    }

    pub fn translate(&mut self, delta: Vector3<f32>) {
        self.min += delta;
        self.max += delta;
    }

    /// Re-center the box on `center`, keeping its size.
    pub fn update(&mut self, center: Vector3<f32>) {
        let delta = center - self.center();
        self.translate(delta);
    }

    pub fn to_sphere(&self) -> BoundingSphere {
        BoundingSphere {
            center: self.center(),
            radius: (self.size() * 0.5).magnitude(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Matrix4, Vector3};

    fn unit() -> Aabb {
        Aabb::new(Vector3::new(-1.0, -1.0, -1.0), Vector3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn merge_encloses_both() {
        let a = unit();
        let mut b = unit();
        b.translate(Vector3::new(5.0, 0.0, 0.0));
        let merged = a.merge(&b);
        assert!(merged.contains(&a));
        assert!(merged.contains(&b));
        assert_eq!(merged.size(), Vector3::new(7.0, 2.0, 2.0));
    }

    #[test]
    fn rotated_box_grows() {
        let rotated = unit().transformed(&Matrix4::from_angle_y(Deg(45.0)));
        assert!(rotated.contains(&unit()));
        assert!(rotated.size().x > 2.8);
    }

    #[test]
    fn update_recenters_without_resizing() {
        let mut aabb = unit();
        aabb.update(Vector3::new(0.0, 10.0, 0.0));
        assert_eq!(aabb.center(), Vector3::new(0.0, 10.0, 0.0));
        assert_eq!(aabb.size(), Vector3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn empty_point_set_has_no_box() {
        assert!(Aabb::from_points(Vec::new()).is_none());
    }
}
