//! Terrain collision data.
//!
//! The world-space triangles of the terrain mesh are binned into a regular
//! grid once at creation. A ground query looks up the triangles of one cell
//! and interpolates the height of the one below the point. Animation nodes are
//! stood on that surface after every update, there is no physical terrain
//! collision.

use cgmath::{Matrix4, Vector3, Vector4};

use crate::data_structures::model::Mesh;

/// Grid cells per side when binning a terrain mesh.
pub const TERRAIN_RESOLUTION: usize = 64;

/// Slack of the point-in-triangle test, so shared edges never fall through.
const EDGE_EPSILON: f32 = 1e-5;

#[derive(Clone, Debug)]
pub struct HeightField {
    origin: [f32; 2],
    cell: [f32; 2],
    cols: usize,
    rows: usize,
    points: Vec<Vector3<f32>>,
    triangles: Vec<[usize; 3]>,
    bins: Vec<Vec<u32>>,
}

impl HeightField {
    /// Bins the world-space triangles of `mesh` into a `resolution` x `resolution` grid.
    /// `None` for meshes without triangles.
    pub fn from_mesh(mesh: &Mesh, world: &Matrix4<f32>, resolution: usize) -> Option<Self> {
        let resolution = resolution.max(1);
        let points: Vec<Vector3<f32>> = mesh
            .positions
            .iter()
            .map(|p| (world * Vector4::new(p[0], p[1], p[2], 1.0)).truncate())
            .collect();
        let triangles: Vec<[usize; 3]> = mesh
            .indices
            .chunks_exact(3)
            .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
            .filter(|t| t.iter().all(|&i| i < points.len()))
            .collect();
        if triangles.is_empty() {
            return None;
        }

        let first = points[triangles[0][0]];
        let (mut min, mut max) = (first, first);
        for p in triangles.iter().flatten().map(|&i| points[i]) {
            min = Vector3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Vector3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
        let mut field = Self {
            origin: [min.x, min.z],
            cell: [
                ((max.x - min.x) / resolution as f32).max(f32::EPSILON),
                ((max.z - min.z) / resolution as f32).max(f32::EPSILON),
            ],
            cols: resolution,
            rows: resolution,
            points,
            triangles,
            bins: vec![Vec::new(); resolution * resolution],
        };

        for (index, triangle) in field.triangles.iter().enumerate() {
            let corners = triangle.map(|i| field.points[i]);
            let lo_x = corners.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
            let hi_x = corners.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
            let lo_z = corners.iter().map(|p| p.z).fold(f32::INFINITY, f32::min);
            let hi_z = corners.iter().map(|p| p.z).fold(f32::NEG_INFINITY, f32::max);
            let (cx0, cz0) = field.cell_of(lo_x, lo_z);
            let (cx1, cz1) = field.cell_of(hi_x, hi_z);
            for cz in cz0..=cz1 {
                for cx in cx0..=cx1 {
                    field.bins[cz * field.cols + cx].push(index as u32);
                }
            }
        }
        Some(field)
    }

    /// Cell containing `(x, z)`, clamped to the grid.
    fn cell_of(&self, x: f32, z: f32) -> (usize, usize) {
        let fx = ((x - self.origin[0]) / self.cell[0]).max(0.0) as usize;
        let fz = ((z - self.origin[1]) / self.cell[1]).max(0.0) as usize;
        (fx.min(self.cols - 1), fz.min(self.rows - 1))
    }

    /**
     * Ground height below `(x, z)`: the surface of the highest terrain triangle
     * covering the point. `None` outside the terrain or over a hole.
     */
    pub fn height_at(&self, x: f32, z: f32) -> Option<f32> {
        let fx = (x - self.origin[0]) / self.cell[0];
        let fz = (z - self.origin[1]) / self.cell[1];
        if fx < 0.0 || fz < 0.0 || fx > self.cols as f32 || fz > self.rows as f32 {
            return None;
        }
        let (cx, cz) = self.cell_of(x, z);
        self.bins[cz * self.cols + cx]
            .iter()
            .filter_map(|&t| self.surface_height(self.triangles[t as usize], x, z))
            .reduce(f32::max)
    }

    /// Height of the triangle's plane at `(x, z)` if the point lies inside it seen from above.
    fn surface_height(&self, triangle: [usize; 3], x: f32, z: f32) -> Option<f32> {
        let [a, b, c] = triangle.map(|i| self.points[i]);
        let det = (b.z - c.z) * (a.x - c.x) + (c.x - b.x) * (a.z - c.z);
        if det.abs() <= f32::EPSILON {
            return None;
        }
        let wa = ((b.z - c.z) * (x - c.x) + (c.x - b.x) * (z - c.z)) / det;
        let wb = ((c.z - a.z) * (x - c.x) + (a.x - c.x) * (z - c.z)) / det;
        let wc = 1.0 - wa - wb;
        if wa < -EDGE_EPSILON || wb < -EDGE_EPSILON || wc < -EDGE_EPSILON {
            return None;
        }
        Some(wa * a.y + wb * b.y + wc * c.y)
    }

    pub fn extent(&self) -> [f32; 2] {
        [self.cell[0] * self.cols as f32, self.cell[1] * self.rows as f32]
    }
}

/// Window of terrain blocks that is currently visible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockWindow {
    pub bx: i32,
    pub bz: i32,
    pub size_x: i32,
    pub size_z: i32,
}
