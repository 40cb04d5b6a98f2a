//! CPU-side layout of a multi-draw batch.
//!
//! A [`MultiInstance`] turns an [`InstanceAggregator`] into one indirect draw
//! command per distinct mesh, grouped into the three [`DrawCategory`] command
//! lists. Each command owns a contiguous instance range: its base instance is
//! the prefix sum of the capacities of all commands before it, so ranges never
//! overlap. Geometry of all meshes is merged into shared attribute streams.
//!
//! Every frame [`MultiInstance::gather`] fills the per-instance records and the
//! host-side commands. GPU upload lives in [`crate::multi_draw`].

use std::collections::HashMap;

use cgmath::Matrix4;

use crate::data_structures::{
    aggregate::InstanceAggregator,
    bounding::BoundingSphere,
    instance::InstanceRecord,
    model::{DrawCategory, MeshId},
};

/**
 * Layout of `wgpu`'s indexed indirect draw arguments.
 *
 * `instance_count` is the only field written per frame; the others are fixed
 * when the batch is built.
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct IndirectCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

/// One command slot of the batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchEntry {
    pub mesh: MeshId,
    pub category: DrawCategory,
    /// Index inside the category's command list.
    pub command: u32,
    pub base: u32,
    pub capacity: u32,
    pub index_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
}

impl BatchEntry {
    /// Command with no instances, the state every frame starts from.
    pub fn template(&self) -> IndirectCommand {
        IndirectCommand {
            index_count: self.index_count,
            instance_count: 0,
            first_index: self.first_index,
            base_vertex: self.base_vertex,
            first_instance: self.base,
        }
    }
}

/// Merged vertex streams of all meshes in a batch.
#[derive(Clone, Debug, Default)]
pub struct MergedGeometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 4]>,
    pub texids: Vec<[f32; 2]>,
    pub colors: Vec<[u8; 4]>,
    pub tangents: Vec<[f32; 3]>,
    pub indices: Vec<u16>,
}

impl MergedGeometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// A world-space instance of one mesh, ready to be placed into a batch.
#[derive(Clone, Copy, Debug)]
pub struct GatheredInstance {
    pub mesh: MeshId,
    pub model: Matrix4<f32>,
    pub sphere: BoundingSphere,
}

#[derive(Clone, Debug)]
pub struct MultiInstance {
    entries: Vec<BatchEntry>,
    lookup: HashMap<MeshId, usize>,
    geometry: MergedGeometry,
    command_counts: [u32; 3],
    max_instances: u32,
    records: Vec<InstanceRecord>,
    commands: [Vec<IndirectCommand>; 3],
    dropped: u32,
}

impl MultiInstance {
    pub fn new(aggregator: &InstanceAggregator) -> Self {
        let mut entries = Vec::with_capacity(aggregator.len());
        let mut lookup = HashMap::with_capacity(aggregator.len());
        let mut geometry = MergedGeometry::default();
        let mut command_counts = [0u32; 3];
        let mut base = 0u32;

        for mesh_object in aggregator.mesh_objects() {
            let mesh = &mesh_object.mesh;
            let category = mesh_object.category();
            let capacity = aggregator.count(mesh.id());
            let entry = BatchEntry {
                mesh: mesh.id(),
                category,
                command: command_counts[category.index()],
                base,
                capacity,
                index_count: mesh.index_count() as u32,
                first_index: geometry.indices.len() as u32,
                base_vertex: geometry.vertex_count() as i32,
            };
            command_counts[category.index()] += 1;
            base += capacity;

            geometry.positions.extend_from_slice(&mesh.positions);
            geometry.normals.extend_from_slice(&mesh.normals);
            geometry.texcoords.extend_from_slice(&mesh.texcoords);
            geometry.texids.extend_from_slice(&mesh.texids);
            geometry.colors.extend_from_slice(&mesh.colors);
            geometry.tangents.extend_from_slice(&mesh.tangents);
            geometry.indices.extend_from_slice(&mesh.indices);

            lookup.insert(mesh.id(), entries.len());
            entries.push(entry);
        }

        log::debug!(
            "Batch laid out: {} meshes, {} instances, commands {:?}",
            entries.len(),
            base,
            command_counts
        );

        let mut batch = Self {
            entries,
            lookup,
            geometry,
            command_counts,
            max_instances: base,
            records: Vec::with_capacity(base as usize),
            commands: Default::default(),
            dropped: 0,
        };
        batch.reset_commands();
        batch
    }

    fn reset_commands(&mut self) {
        for category in DrawCategory::ALL {
            self.commands[category.index()] =
                vec![IndirectCommand::default(); self.command_counts[category.index()] as usize];
        }
        for entry in &self.entries {
            self.commands[entry.category.index()][entry.command as usize] = entry.template();
        }
    }

    /**
     * Replaces this frame's instances.
     *
     * Instances of meshes that are not part of the batch are skipped. Once a
     * mesh's capacity is used up further instances are dropped; the number of
     * dropped instances is returned.
     */
    pub fn gather<I>(&mut self, instances: I) -> u32
    where
        I: IntoIterator<Item = GatheredInstance>,
    {
        self.records.clear();
        self.reset_commands();
        let mut dropped = 0;

        for instance in instances {
            let Some(&slot) = self.lookup.get(&instance.mesh) else {
                continue;
            };
            let entry = self.entries[slot];
            let command = &mut self.commands[entry.category.index()][entry.command as usize];
            if command.instance_count >= entry.capacity {
                dropped += 1;
                continue;
            }
            command.instance_count += 1;
            self.records.push(InstanceRecord::new(
                instance.model,
                instance.sphere,
                entry.command,
                entry.category as u32,
            ));
        }

        if dropped > 0 && dropped != self.dropped {
            log::warn!("{} instances exceed their mesh capacity and were dropped", dropped);
        }
        self.dropped = dropped;
        dropped
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn entry(&self, mesh: MeshId) -> Option<&BatchEntry> {
        self.lookup.get(&mesh).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, mesh: MeshId) -> bool {
        self.lookup.contains_key(&mesh)
    }

    pub fn geometry(&self) -> &MergedGeometry {
        &self.geometry
    }

    /// Frees the CPU copy of the merged geometry once it lives on the GPU.
    pub fn release_geometry(&mut self) {
        self.geometry = MergedGeometry::default();
    }

    pub fn command_count(&self, category: DrawCategory) -> u32 {
        self.command_counts[category.index()]
    }

    pub fn command_counts(&self) -> [u32; 3] {
        self.command_counts
    }

    /// Host-side commands of `category` as of the last [`Self::gather`].
    pub fn commands(&self, category: DrawCategory) -> &[IndirectCommand] {
        &self.commands[category.index()]
    }

    /// Commands of `category` with zero instances, the per-frame starting point of the cull pass.
    pub fn templates(&self, category: DrawCategory) -> Vec<IndirectCommand> {
        let mut templates = vec![IndirectCommand::default(); self.command_count(category) as usize];
        for entry in self.entries.iter().filter(|e| e.category == category) {
            templates[entry.command as usize] = entry.template();
        }
        templates
    }

    pub fn records(&self) -> &[InstanceRecord] {
        &self.records
    }

    pub fn instance_count(&self) -> u32 {
        self.records.len() as u32
    }

    /// Total capacity, the size of the transform-out buffer.
    pub fn max_instances(&self) -> u32 {
        self.max_instances
    }

    /// Workgroups of the command refresh pass: one invocation per command of
    /// the largest category.
    pub fn dispatch_size(&self) -> u32 {
        let [normal, single, billboard] = self.command_counts;
        normal.max(single).max(billboard)
    }
}
