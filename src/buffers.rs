//! GPU buffer layer.
//!
//! Vertex attributes live at fixed slots, one buffer per attribute, so batches
//! can upload merged geometry stream by stream and draw pipelines can be built
//! against [`vertex_layouts`] without knowing about a particular batch.
//!
//! | slot | content                      | format      |
//! |------|------------------------------|-------------|
//! | 0    | position                     | Float32x3   |
//! | 1    | normal                       | Float32x3   |
//! | 2    | texcoord                     | Float32x4   |
//! | 3    | per-vertex texture id        | Float32x2   |
//! | 4    | color                        | Unorm8x4    |
//! | 5    | tangent                      | Float32x3   |
//! | 6    | transform out (per instance) | 4x Float32x4 at locations 6..=9 |

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::data_structures::instance::TransformRaw;

pub const POSITION_SLOT: u32 = 0;
pub const NORMAL_SLOT: u32 = 1;
pub const TEXCOORD_SLOT: u32 = 2;
pub const TEXID_SLOT: u32 = 3;
pub const COLOR_SLOT: u32 = 4;
pub const TANGENT_SLOT: u32 = 5;
pub const TRANSFORM_SLOT: u32 = 6;
pub const VERTEX_SLOTS: usize = 7;

/// How often a buffer's content is expected to change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BufferHint {
    /// Written once.
    #[default]
    Static,
    /// Rewritten occasionally.
    Dynamic,
    /// Rewritten every frame.
    Stream,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Storage,
    Indirect,
    Uniform,
}

impl BufferKind {
    pub fn usage(self, hint: BufferHint) -> wgpu::BufferUsages {
        let usage = match self {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
            // the cull pass writes the transform-out buffer, draws read it as vertex input
            BufferKind::Storage => {
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::COPY_SRC
            }
            BufferKind::Indirect => {
                wgpu::BufferUsages::INDIRECT
                    | wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
            }
            BufferKind::Uniform => wgpu::BufferUsages::UNIFORM,
        };
        match hint {
            BufferHint::Static if self == BufferKind::Index => usage,
            _ => usage | wgpu::BufferUsages::COPY_DST,
        }
    }
}

/// Description of one vertex slot, kept separate from wgpu so it can be checked without a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotLayout {
    pub slot: u32,
    pub stride: u64,
    pub per_instance: bool,
    pub first_location: u32,
    pub locations: u32,
}

impl SlotLayout {
    /// Per-vertex stream feeding a single shader location.
    const fn vertex(slot: u32, stride: u64, location: u32) -> Self {
        Self {
            slot,
            stride,
            per_instance: false,
            first_location: location,
            locations: 1,
        }
    }
}

pub const SLOT_LAYOUTS: [SlotLayout; VERTEX_SLOTS] = [
    SlotLayout::vertex(POSITION_SLOT, 12, 0),
    SlotLayout::vertex(NORMAL_SLOT, 12, 1),
    SlotLayout::vertex(TEXCOORD_SLOT, 16, 2),
    SlotLayout::vertex(TEXID_SLOT, 8, 3),
    SlotLayout::vertex(COLOR_SLOT, 4, 4),
    SlotLayout::vertex(TANGENT_SLOT, 12, 5),
    SlotLayout {
        slot: TRANSFORM_SLOT,
        stride: std::mem::size_of::<TransformRaw>() as u64,
        per_instance: true,
        first_location: 6,
        locations: 4,
    },
];

const POSITION_ATTRIBS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const NORMAL_ATTRIBS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x3];
const TEXCOORD_ATTRIBS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Float32x4];
const TEXID_ATTRIBS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![3 => Float32x2];
const COLOR_ATTRIBS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![4 => Unorm8x4];
const TANGENT_ATTRIBS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![5 => Float32x3];
const TRANSFORM_ATTRIBS: [wgpu::VertexAttribute; 4] =
    wgpu::vertex_attr_array![6 => Float32x4, 7 => Float32x4, 8 => Float32x4, 9 => Float32x4];

/// Vertex buffer layouts for slots 0..=6, in slot order.
pub fn vertex_layouts() -> [wgpu::VertexBufferLayout<'static>; VERTEX_SLOTS] {
    let attributes: [&'static [wgpu::VertexAttribute]; VERTEX_SLOTS] = [
        &POSITION_ATTRIBS,
        &NORMAL_ATTRIBS,
        &TEXCOORD_ATTRIBS,
        &TEXID_ATTRIBS,
        &COLOR_ATTRIBS,
        &TANGENT_ATTRIBS,
        &TRANSFORM_ATTRIBS,
    ];
    std::array::from_fn(|i| wgpu::VertexBufferLayout {
        array_stride: SLOT_LAYOUTS[i].stride as wgpu::BufferAddress,
        step_mode: if SLOT_LAYOUTS[i].per_instance {
            wgpu::VertexStepMode::Instance
        } else {
            wgpu::VertexStepMode::Vertex
        },
        attributes: attributes[i],
    })
}

/// Identifies a buffer inside a [`RenderBuffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    Vertex(u32),
    Index,
    /// Storage or indirect buffers by binding.
    Binding(u32),
}

#[derive(Debug)]
pub struct GpuBuffer {
    pub buffer: wgpu::Buffer,
    pub kind: BufferKind,
    pub hint: BufferHint,
    pub stride: u64,
    pub capacity: u64,
    pub len: u64,
}

impl GpuBuffer {
    pub fn size(&self) -> u64 {
        self.stride * self.capacity
    }
}

/**
 * A set of typed GPU buffers keyed by slot.
 *
 * Declaring a slot again with the same kind, stride and a capacity that still
 * fits keeps the existing buffer; only the content is rewritten. Buffers are
 * never created with zero size, an empty declaration still reserves one element
 * so bind groups stay valid.
 */
#[derive(Debug)]
pub struct RenderBuffer {
    label: String,
    buffers: HashMap<BufferSlot, GpuBuffer>,
}

impl RenderBuffer {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            buffers: HashMap::new(),
        }
    }

    /// Declares vertex attribute `slot` and uploads `data`.
    pub fn set_attrib_data<T: bytemuck::Pod>(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        slot: u32,
        data: &[T],
        hint: BufferHint,
    ) {
        self.set_buffer_data(
            device,
            queue,
            BufferSlot::Vertex(slot),
            BufferKind::Vertex,
            data.len() as u64,
            Some(data),
            hint,
        );
    }

    /// Declares a buffer of `count` elements of `T`, optionally uploading `data`.
    #[allow(clippy::too_many_arguments)]
    pub fn set_buffer_data<T: bytemuck::Pod>(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        slot: BufferSlot,
        kind: BufferKind,
        count: u64,
        data: Option<&[T]>,
        hint: BufferHint,
    ) {
        let stride = std::mem::size_of::<T>() as u64;
        let capacity = count.max(1);
        let reusable = self.buffers.get(&slot).is_some_and(|b| {
            b.kind == kind && b.stride == stride && b.hint == hint && b.capacity >= capacity
        });
        if reusable {
            if let Some(data) = data {
                self.update_buffer_data(queue, slot, data);
            }
            return;
        }

        let label = format!("{} {:?}", self.label, slot);
        let usage = kind.usage(hint);
        let buffer = match data {
            Some(data) if data.len() as u64 == capacity => {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&label),
                    contents: bytemuck::cast_slice(data),
                    usage,
                })
            }
            _ => device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&label),
                size: pad_to_copy_alignment(stride * capacity),
                usage,
                mapped_at_creation: false,
            }),
        };
        let len = data.map(|d| d.len() as u64).unwrap_or(0).min(capacity);
        self.buffers.insert(
            slot,
            GpuBuffer {
                buffer,
                kind,
                hint,
                stride,
                capacity,
                len,
            },
        );
        if let Some(data) = data {
            if data.len() as u64 != capacity && !data.is_empty() {
                self.update_buffer_data(queue, slot, data);
            }
        }
    }

    /// Overwrites the start of `slot` with `data`; elements past the capacity are dropped.
    pub fn update_buffer_data<T: bytemuck::Pod>(
        &mut self,
        queue: &wgpu::Queue,
        slot: BufferSlot,
        data: &[T],
    ) {
        let Some(target) = self.buffers.get_mut(&slot) else {
            log::warn!("{}: update of undeclared buffer {:?}", self.label, slot);
            return;
        };
        if target.hint == BufferHint::Static && target.kind == BufferKind::Index {
            log::warn!("{}: static index buffer cannot be updated", self.label);
            return;
        }
        let count = (data.len() as u64).min(target.capacity);
        if count < data.len() as u64 {
            log::warn!(
                "{}: {} elements do not fit {:?} (capacity {})",
                self.label,
                data.len(),
                slot,
                target.capacity
            );
        }
        target.len = count;
        if count == 0 {
            return;
        }
        let bytes: &[u8] = bytemuck::cast_slice(&data[..count as usize]);
        // write_buffer needs sizes in multiples of four
        if bytes.len() % wgpu::COPY_BUFFER_ALIGNMENT as usize == 0 {
            queue.write_buffer(&target.buffer, 0, bytes);
        } else {
            let mut padded = bytes.to_vec();
            padded.resize(pad_to_copy_alignment(bytes.len() as u64) as usize, 0);
            queue.write_buffer(&target.buffer, 0, &padded);
        }
    }

    /**
     * Host write of `data` into `slot` at element `offset`, the path batches use
     * when they refresh commands without a compute dispatch. The data lands in
     * the queue's staging memory and becomes visible to the next submission;
     * callers must not reuse a slot for a different frame's data before that.
     */
    pub fn update_buffer_map<T: bytemuck::Pod>(
        &mut self,
        queue: &wgpu::Queue,
        slot: BufferSlot,
        offset: u64,
        data: &[T],
    ) {
        let Some(target) = self.buffers.get(&slot) else {
            log::warn!("{}: mapped write to undeclared buffer {:?}", self.label, slot);
            return;
        };
        if offset + data.len() as u64 > target.capacity {
            log::warn!("{}: mapped write past the end of {:?}", self.label, slot);
            return;
        }
        if data.is_empty() {
            return;
        }
        queue.write_buffer(
            &target.buffer,
            offset * target.stride,
            bytemuck::cast_slice(data),
        );
    }

    pub fn get(&self, slot: BufferSlot) -> Option<&GpuBuffer> {
        self.buffers.get(&slot)
    }

    pub fn buffer(&self, slot: BufferSlot) -> Option<&wgpu::Buffer> {
        self.buffers.get(&slot).map(|b| &b.buffer)
    }

    pub fn contains(&self, slot: BufferSlot) -> bool {
        self.buffers.contains_key(&slot)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

fn pad_to_copy_alignment(size: u64) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    size.div_ceil(align) * align
}
