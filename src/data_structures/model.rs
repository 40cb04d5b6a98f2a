//! Mesh and material definitions consumed by the batcher.
//!
//! Meshes are shared geometry owned by the [`crate::resources::AssetRegistry`];
//! scene objects only hold `Arc<Mesh>` handles. Identity is the [`MeshId`]
//! handed out at construction, so two meshes with equal content are still
//! batched separately.

use std::sync::atomic::{AtomicU32, Ordering};

use cgmath::Vector3;

use crate::data_structures::bounding::Aabb;

static NEXT_MESH_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

/// Rendering treatment of a batched mesh. The discriminant is the category
/// index the compute shaders use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DrawCategory {
    #[default]
    Normal = 0,
    SingleSided = 1,
    Billboard = 2,
}

impl DrawCategory {
    pub const ALL: [DrawCategory; 3] = [
        DrawCategory::Normal,
        DrawCategory::SingleSided,
        DrawCategory::Billboard,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Material bindings as the registry resolves them. Texture ids are bindless
/// slots, `-1` when the texture could not be found.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub texids: [i32; 4],
    pub single_sided: bool,
    pub billboard: bool,
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            texids: [-1; 4],
            single_sided: false,
            billboard: false,
        }
    }

    pub fn category(&self) -> DrawCategory {
        if self.billboard {
            DrawCategory::Billboard
        } else if self.single_sided {
            DrawCategory::SingleSided
        } else {
            DrawCategory::Normal
        }
    }
}

/// CPU-side geometry, one stream per vertex attribute.
#[derive(Debug)]
pub struct Mesh {
    id: MeshId,
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 4]>,
    pub texids: Vec<[f32; 2]>,
    pub colors: Vec<[u8; 4]>,
    pub tangents: Vec<[f32; 3]>,
    pub indices: Vec<u16>,
    bounds: Aabb,
}

impl Mesh {
    /// Missing attribute streams are filled with defaults (up normals, white colour, no texture).
    pub fn new(name: &str, positions: Vec<[f32; 3]>, indices: Vec<u16>) -> Self {
        let count = positions.len();
        let bounds = Aabb::from_points(positions.iter().map(|&p| Vector3::from(p)))
            .unwrap_or(Aabb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.0)));
        Self {
            id: MeshId(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.to_string(),
            normals: vec![[0.0, 1.0, 0.0]; count],
            texcoords: vec![[0.0; 4]; count],
            texids: vec![[-1.0, -1.0]; count],
            colors: vec![[255; 4]; count],
            tangents: vec![[1.0, 0.0, 0.0]; count],
            positions,
            indices,
            bounds,
        }
    }

    pub fn with_normals(mut self, normals: Vec<[f32; 3]>) -> Self {
        if normals.len() == self.vertex_count() {
            self.normals = normals;
        } else {
            log::warn!(
                "Ignoring normals of mesh {}: expected {} got {}",
                self.name,
                self.vertex_count(),
                normals.len()
            );
        }
        self
    }

    pub fn with_texcoords(mut self, texcoords: Vec<[f32; 4]>) -> Self {
        if texcoords.len() == self.vertex_count() {
            self.texcoords = texcoords;
        } else {
            log::warn!(
                "Ignoring texcoords of mesh {}: expected {} got {}",
                self.name,
                self.vertex_count(),
                texcoords.len()
            );
        }
        self
    }

    pub fn with_colors(mut self, colors: Vec<[u8; 4]>) -> Self {
        if colors.len() == self.vertex_count() {
            self.colors = colors;
        } else {
            log::warn!(
                "Ignoring colors of mesh {}: expected {} got {}",
                self.name,
                self.vertex_count(),
                colors.len()
            );
        }
        self
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Bounds in mesh space.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }
}
