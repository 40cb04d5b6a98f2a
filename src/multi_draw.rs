//! GPU side of a multi-draw batch.
//!
//! A [`MultiDrawBatch`] owns the merged geometry, the per-instance records and
//! the indirect command buffers of one [`MultiInstance`] layout. Per frame it
//!
//! 1. waits out its warm-up ([`BatchState`]),
//! 2. refreshes the template commands (compute flush or host write, fixed at
//!    construction, see [`RefreshStrategy`]),
//! 3. copies templates into the live command buffers and runs the cull pass,
//!    which fills instance counts and the transform-out buffer,
//! 4. issues one `multi_draw_indexed_indirect` per non-empty category.
//!
//! Steps 2 and 3 are encoded into a compute pass that ends before the render
//! pass begins; the pass boundary makes the storage writes visible to the
//! indirect and vertex reads of step 4.

use crate::{
    buffers::{
        BufferHint, BufferKind, BufferSlot, COLOR_SLOT, NORMAL_SLOT, POSITION_SLOT, RenderBuffer,
        TANGENT_SLOT, TEXCOORD_SLOT, TEXID_SLOT, TRANSFORM_SLOT,
    },
    camera::Frustum,
    config::{RenderConfig, WORKGROUP_SIZE},
    data_structures::{
        instance::{InstanceRecord, TransformRaw},
        model::DrawCategory,
        multi_instance::{GatheredInstance, IndirectCommand, MultiInstance},
    },
    pipelines::{
        CommandSeed, ComputePipelines, CountsUniform, CullUniform, PASS_FLAG_GROUP,
        PASS_FLAG_STRIDE, PassFlag,
    },
};

const CULL_UNIFORM: u32 = 0;
const RECORDS: u32 = 1;
const TRANSFORMS: u32 = 2;
const LIVE_COMMANDS: [u32; 3] = [3, 4, 5];
const TEMPLATE_COMMANDS: [u32; 3] = [10, 11, 12];
const SEEDS: [u32; 3] = [20, 21, 22];
const COUNTS_UNIFORM: u32 = 23;
const PASS_FLAGS: u32 = 30;

/// How a batch rebuilds its template commands after an update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RefreshStrategy {
    /// Upload per-command seeds and let `flush.wgsl` write the commands.
    Compute,
    /// Write the host-computed commands straight into the GPU buffers.
    #[default]
    HostWrite,
}

/// Warm-up of a freshly built batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    Warming { frame: u32, delay: u32 },
    Active,
}

impl BatchState {
    pub fn new(delay: u32) -> Self {
        if delay == 0 {
            BatchState::Active
        } else {
            BatchState::Warming { frame: 0, delay }
        }
    }

    /// State of a batch rebuilt in place of `previous`. A replacement for a
    /// batch that already drew stays active, so a layout change never blanks
    /// the frame.
    pub fn carried_over(previous: Option<BatchState>, delay: u32) -> Self {
        match previous {
            Some(BatchState::Active) => BatchState::Active,
            _ => BatchState::new(delay),
        }
    }

    /// Advances one frame. Returns `true` when the batch may compute and draw
    /// this frame; the first `delay` frames return `false`.
    pub fn tick(&mut self) -> bool {
        match self {
            BatchState::Active => true,
            BatchState::Warming { frame, delay } => {
                *frame += 1;
                if *frame >= *delay {
                    *self = BatchState::Active;
                }
                false
            }
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, BatchState::Active)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    Shadow,
    Color,
}

/// Face culling and blending a category's draw pipeline is expected to use in a pass.
pub fn category_state(
    category: DrawCategory,
    kind: PassKind,
) -> (Option<wgpu::Face>, Option<wgpu::BlendState>) {
    match (category, kind) {
        (DrawCategory::Normal, _) => (Some(wgpu::Face::Back), None),
        (DrawCategory::SingleSided, PassKind::Color) => (Some(wgpu::Face::Back), None),
        (DrawCategory::SingleSided, PassKind::Shadow) => (None, None),
        (DrawCategory::Billboard, PassKind::Color) => {
            (None, Some(wgpu::BlendState::ALPHA_BLENDING))
        }
        (DrawCategory::Billboard, PassKind::Shadow) => (None, None),
    }
}

/// `billboardPass` value a category is drawn with.
pub fn pass_flag(category: DrawCategory) -> f32 {
    match category {
        DrawCategory::Billboard => 1.0,
        _ => 0.0,
    }
}

/// Draw pipelines of one pass, indexed by [`DrawCategory`].
#[derive(Debug)]
pub struct CategoryPipelines {
    pub normal: wgpu::RenderPipeline,
    pub single_sided: wgpu::RenderPipeline,
    pub billboard: wgpu::RenderPipeline,
}

impl CategoryPipelines {
    pub fn get(&self, category: DrawCategory) -> &wgpu::RenderPipeline {
        match category {
            DrawCategory::Normal => &self.normal,
            DrawCategory::SingleSided => &self.single_sided,
            DrawCategory::Billboard => &self.billboard,
        }
    }
}

/// Color pipelines and, optionally, shadow pipelines.
#[derive(Debug)]
pub struct PassPipelines {
    pub color: CategoryPipelines,
    pub shadow: Option<CategoryPipelines>,
}

impl PassPipelines {
    pub fn select(&self, kind: PassKind) -> Option<&CategoryPipelines> {
        match kind {
            PassKind::Color => Some(&self.color),
            PassKind::Shadow => self.shadow.as_ref(),
        }
    }
}

#[derive(Debug)]
pub struct MultiDrawBatch {
    layout: MultiInstance,
    state: BatchState,
    refresh: RefreshStrategy,
    frustum_cull: bool,
    buffers: RenderBuffer,
    cull_bind_group: wgpu::BindGroup,
    flush_bind_group: Option<wgpu::BindGroup>,
    flag_bind_group: wgpu::BindGroup,
    needs_flush: bool,
    computed: bool,
}

impl MultiDrawBatch {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        mut layout: MultiInstance,
        config: &RenderConfig,
        pipelines: &ComputePipelines,
    ) -> Self {
        if !device.features().contains(wgpu::Features::INDIRECT_FIRST_INSTANCE) {
            log::warn!("INDIRECT_FIRST_INSTANCE is not enabled, batched instances will overlap");
        }
        let mut buffers = RenderBuffer::new(label);

        let geometry = layout.geometry();
        let hint = BufferHint::Static;
        buffers.set_attrib_data(device, queue, POSITION_SLOT, &geometry.positions, hint);
        buffers.set_attrib_data(device, queue, NORMAL_SLOT, &geometry.normals, hint);
        buffers.set_attrib_data(device, queue, TEXCOORD_SLOT, &geometry.texcoords, hint);
        buffers.set_attrib_data(device, queue, TEXID_SLOT, &geometry.texids, hint);
        buffers.set_attrib_data(device, queue, COLOR_SLOT, &geometry.colors, hint);
        buffers.set_attrib_data(device, queue, TANGENT_SLOT, &geometry.tangents, hint);
        buffers.set_buffer_data(
            device,
            queue,
            BufferSlot::Index,
            BufferKind::Index,
            geometry.indices.len() as u64,
            Some(&geometry.indices),
            BufferHint::Static,
        );
        layout.release_geometry();

        let max_instances = layout.max_instances() as u64;
        buffers.set_buffer_data::<InstanceRecord>(
            device,
            queue,
            BufferSlot::Binding(RECORDS),
            BufferKind::Storage,
            max_instances,
            None,
            BufferHint::Stream,
        );
        buffers.set_buffer_data::<TransformRaw>(
            device,
            queue,
            BufferSlot::Binding(TRANSFORMS),
            BufferKind::Storage,
            max_instances,
            None,
            BufferHint::Dynamic,
        );
        for category in DrawCategory::ALL {
            let templates = layout.templates(category);
            let count = templates.len() as u64;
            buffers.set_buffer_data(
                device,
                queue,
                BufferSlot::Binding(TEMPLATE_COMMANDS[category.index()]),
                BufferKind::Indirect,
                count,
                Some(&templates),
                BufferHint::Dynamic,
            );
            buffers.set_buffer_data::<IndirectCommand>(
                device,
                queue,
                BufferSlot::Binding(LIVE_COMMANDS[category.index()]),
                BufferKind::Indirect,
                count,
                None,
                BufferHint::Stream,
            );
        }
        buffers.set_buffer_data::<CullUniform>(
            device,
            queue,
            BufferSlot::Binding(CULL_UNIFORM),
            BufferKind::Uniform,
            1,
            None,
            BufferHint::Stream,
        );

        let mut flags = vec![0u8; 2 * PASS_FLAG_STRIDE as usize];
        for (i, value) in [0.0, 1.0].into_iter().enumerate() {
            let flag = PassFlag {
                billboard_pass: value,
                _padding: [0.0; 3],
            };
            let at = i * PASS_FLAG_STRIDE as usize;
            let end = at + std::mem::size_of::<PassFlag>();
            flags[at..end].copy_from_slice(bytemuck::bytes_of(&flag));
        }
        buffers.set_buffer_data(
            device,
            queue,
            BufferSlot::Binding(PASS_FLAGS),
            BufferKind::Uniform,
            flags.len() as u64,
            Some(&flags),
            BufferHint::Static,
        );

        if config.refresh == RefreshStrategy::Compute {
            for category in DrawCategory::ALL {
                buffers.set_buffer_data::<CommandSeed>(
                    device,
                    queue,
                    BufferSlot::Binding(SEEDS[category.index()]),
                    BufferKind::Storage,
                    layout.command_count(category) as u64,
                    None,
                    BufferHint::Dynamic,
                );
            }
            buffers.set_buffer_data::<CountsUniform>(
                device,
                queue,
                BufferSlot::Binding(COUNTS_UNIFORM),
                BufferKind::Uniform,
                1,
                None,
                BufferHint::Dynamic,
            );
        }

        let cull_bind_group = Self::cull_bind_group(device, &buffers, pipelines, label);
        let flush_bind_group = (config.refresh == RefreshStrategy::Compute)
            .then(|| Self::flush_bind_group(device, &buffers, pipelines, label))
            .flatten();
        let flag_bind_group = Self::flag_bind_group(device, &buffers, pipelines, label);

        log::info!(
            "{}: {} meshes, capacity {}, commands {:?}, {:?} refresh",
            label,
            layout.entries().len(),
            max_instances,
            layout.command_counts(),
            config.refresh
        );

        let mut batch = Self {
            layout,
            state: BatchState::new(config.delay_frames),
            refresh: config.refresh,
            frustum_cull: config.frustum_cull,
            buffers,
            cull_bind_group,
            flush_bind_group,
            flag_bind_group,
            needs_flush: false,
            computed: false,
        };
        batch.upload(queue);
        batch
    }

    fn cull_bind_group(
        device: &wgpu::Device,
        buffers: &RenderBuffer,
        pipelines: &ComputePipelines,
        label: &str,
    ) -> wgpu::BindGroup {
        let slots = [
            CULL_UNIFORM,
            RECORDS,
            TRANSFORMS,
            LIVE_COMMANDS[0],
            LIVE_COMMANDS[1],
            LIVE_COMMANDS[2],
        ];
        let entries: Vec<wgpu::BindGroupEntry> = slots
            .iter()
            .enumerate()
            .filter_map(|(binding, slot)| {
                buffers
                    .buffer(BufferSlot::Binding(*slot))
                    .map(|buffer| wgpu::BindGroupEntry {
                        binding: binding as u32,
                        resource: buffer.as_entire_binding(),
                    })
            })
            .collect();
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} cull_bind_group", label)),
            layout: &pipelines.cull.get_bind_group_layout(0),
            entries: &entries,
        })
    }

    fn flush_bind_group(
        device: &wgpu::Device,
        buffers: &RenderBuffer,
        pipelines: &ComputePipelines,
        label: &str,
    ) -> Option<wgpu::BindGroup> {
        let slots = [
            COUNTS_UNIFORM,
            SEEDS[0],
            SEEDS[1],
            SEEDS[2],
            TEMPLATE_COMMANDS[0],
            TEMPLATE_COMMANDS[1],
            TEMPLATE_COMMANDS[2],
        ];
        let mut entries = Vec::with_capacity(slots.len());
        for (binding, slot) in slots.iter().enumerate() {
            let buffer = buffers.buffer(BufferSlot::Binding(*slot))?;
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            });
        }
        Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} flush_bind_group", label)),
            layout: &pipelines.flush.get_bind_group_layout(0),
            entries: &entries,
        }))
    }

    fn flag_bind_group(
        device: &wgpu::Device,
        buffers: &RenderBuffer,
        pipelines: &ComputePipelines,
        label: &str,
    ) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .buffer(BufferSlot::Binding(PASS_FLAGS))
            .map(|buffer| wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<PassFlag>() as u64),
                }),
            })
            .into_iter()
            .collect();
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} pass_flag_bind_group", label)),
            layout: &pipelines.pass_flag_layout,
            entries: &entries,
        })
    }

    /// Replaces the batch's instances and refreshes its commands.
    pub fn update<I>(&mut self, queue: &wgpu::Queue, instances: I) -> u32
    where
        I: IntoIterator<Item = GatheredInstance>,
    {
        let dropped = self.layout.gather(instances);
        self.upload(queue);
        dropped
    }

    fn upload(&mut self, queue: &wgpu::Queue) {
        self.buffers
            .update_buffer_data(queue, BufferSlot::Binding(RECORDS), self.layout.records());
        match self.refresh {
            RefreshStrategy::HostWrite => {
                for category in DrawCategory::ALL {
                    // the cull pass counts instances itself
                    let commands: Vec<IndirectCommand> = self
                        .layout
                        .commands(category)
                        .iter()
                        .map(|c| IndirectCommand {
                            instance_count: 0,
                            ..*c
                        })
                        .collect();
                    self.buffers.update_buffer_map(
                        queue,
                        BufferSlot::Binding(TEMPLATE_COMMANDS[category.index()]),
                        0,
                        &commands,
                    );
                }
            }
            RefreshStrategy::Compute => {
                for category in DrawCategory::ALL {
                    let seeds: Vec<CommandSeed> = self
                        .layout
                        .commands(category)
                        .iter()
                        .map(|c| CommandSeed {
                            index_count: c.index_count,
                            first_index: c.first_index,
                            base_vertex: c.base_vertex,
                            first_instance: c.first_instance,
                        })
                        .collect();
                    self.buffers.update_buffer_data(
                        queue,
                        BufferSlot::Binding(SEEDS[category.index()]),
                        &seeds,
                    );
                }
                let counts = CountsUniform {
                    counts: self.layout.command_counts(),
                    _padding: 0,
                };
                self.buffers.update_buffer_data(
                    queue,
                    BufferSlot::Binding(COUNTS_UNIFORM),
                    &[counts],
                );
                self.needs_flush = true;
            }
        }
    }

    /**
     * Encodes this frame's compute pre-pass: the command refresh (compute
     * strategy only), the template to live copy, and the cull pass.
     *
     * Returns `false` while the batch is still warming up; nothing is encoded
     * and [`Self::draw`] keeps skipping the batch.
     */
    pub fn encode_compute(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &ComputePipelines,
        frustum: &Frustum,
    ) -> bool {
        if !self.state.tick() {
            return false;
        }
        let object_count = self.layout.instance_count();
        let cull = CullUniform::new(frustum, object_count, self.frustum_cull);
        self.buffers
            .update_buffer_data(queue, BufferSlot::Binding(CULL_UNIFORM), &[cull]);

        if self.needs_flush {
            if let Some(bind_group) = &self.flush_bind_group {
                let workgroups = self.layout.dispatch_size().div_ceil(WORKGROUP_SIZE);
                if workgroups > 0 {
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("Flush Pass"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&pipelines.flush);
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.dispatch_workgroups(workgroups, 1, 1);
                }
            }
            self.needs_flush = false;
        }

        for category in DrawCategory::ALL {
            let count = self.layout.command_count(category) as u64;
            let (Some(template), Some(live)) = (
                self.buffers.buffer(BufferSlot::Binding(TEMPLATE_COMMANDS[category.index()])),
                self.buffers.buffer(BufferSlot::Binding(LIVE_COMMANDS[category.index()])),
            ) else {
                continue;
            };
            if count > 0 {
                let size = count * std::mem::size_of::<IndirectCommand>() as u64;
                encoder.copy_buffer_to_buffer(template, 0, live, 0, size);
            }
        }

        if object_count > 0 {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Cull Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipelines.cull);
            pass.set_bind_group(0, &self.cull_bind_group, &[]);
            pass.dispatch_workgroups(object_count.div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        self.computed = true;
        true
    }

    /// Issues one indirect multi-draw per non-empty category. Returns the number of draw calls.
    pub fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        pipelines: &PassPipelines,
        kind: PassKind,
    ) -> u32 {
        if !self.computed {
            return 0;
        }
        let Some(category_pipelines) = pipelines.select(kind) else {
            return 0;
        };
        let Some(index) = self.buffers.buffer(BufferSlot::Index) else {
            return 0;
        };
        for slot in [
            POSITION_SLOT,
            NORMAL_SLOT,
            TEXCOORD_SLOT,
            TEXID_SLOT,
            COLOR_SLOT,
            TANGENT_SLOT,
        ] {
            if let Some(buffer) = self.buffers.buffer(BufferSlot::Vertex(slot)) {
                pass.set_vertex_buffer(slot, buffer.slice(..));
            }
        }
        if let Some(transforms) = self.buffers.buffer(BufferSlot::Binding(TRANSFORMS)) {
            pass.set_vertex_buffer(TRANSFORM_SLOT, transforms.slice(..));
        }
        pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint16);

        let mut draws = 0;
        for category in DrawCategory::ALL {
            let count = self.layout.command_count(category);
            if count == 0 {
                continue;
            }
            let Some(live) = self
                .buffers
                .buffer(BufferSlot::Binding(LIVE_COMMANDS[category.index()]))
            else {
                continue;
            };
            let offset = if pass_flag(category) > 0.0 {
                PASS_FLAG_STRIDE as wgpu::DynamicOffset
            } else {
                0
            };
            pass.set_pipeline(category_pipelines.get(category));
            pass.set_bind_group(PASS_FLAG_GROUP, &self.flag_bind_group, &[offset]);
            pass.multi_draw_indexed_indirect(live, 0, count);
            draws += 1;
        }
        draws
    }

    pub fn layout(&self) -> &MultiInstance {
        &self.layout
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Replaces the warm-up state, used when a rebuilt batch takes over from an older one.
    pub fn with_state(mut self, state: BatchState) -> Self {
        self.state = state;
        self
    }

    pub fn refresh(&self) -> RefreshStrategy {
        self.refresh
    }

    /// Command buffer the draws read, filled by the last cull pass.
    pub fn live_commands(&self, category: DrawCategory) -> Option<&wgpu::Buffer> {
        self.buffers
            .buffer(BufferSlot::Binding(LIVE_COMMANDS[category.index()]))
    }

    pub fn template_commands(&self, category: DrawCategory) -> Option<&wgpu::Buffer> {
        self.buffers
            .buffer(BufferSlot::Binding(TEMPLATE_COMMANDS[category.index()]))
    }

    pub fn transforms(&self) -> Option<&wgpu::Buffer> {
        self.buffers.buffer(BufferSlot::Binding(TRANSFORMS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warming_skips_exactly_delay_frames() {
        let mut state = BatchState::new(3);
        assert!(!state.tick());
        assert!(!state.tick());
        assert!(!state.tick());
        assert!(state.is_active());
        assert!(state.tick());
    }

    #[test]
    fn zero_delay_starts_active() {
        let mut state = BatchState::new(0);
        assert!(state.is_active());
        assert!(state.tick());
    }

    #[test]
    fn rebuilt_batch_keeps_active_state() {
        assert_eq!(BatchState::carried_over(Some(BatchState::Active), 3), BatchState::Active);
        assert_eq!(
            BatchState::carried_over(Some(BatchState::Warming { frame: 1, delay: 3 }), 3),
            BatchState::new(3)
        );
        assert_eq!(BatchState::carried_over(None, 2), BatchState::new(2));
    }

    #[test]
    fn billboards_never_cull_faces() {
        for kind in [PassKind::Color, PassKind::Shadow] {
            assert_eq!(category_state(DrawCategory::Billboard, kind).0, None);
        }
        assert_eq!(
            category_state(DrawCategory::SingleSided, PassKind::Color).0,
            Some(wgpu::Face::Back)
        );
        assert_eq!(category_state(DrawCategory::SingleSided, PassKind::Shadow).0, None);
        assert_eq!(pass_flag(DrawCategory::Billboard), 1.0);
        assert_eq!(pass_flag(DrawCategory::SingleSided), 0.0);
    }
}
