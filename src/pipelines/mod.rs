//! Compute pipelines of the batcher and the uniforms they read.
//!
//! Draw pipelines are built by the application against
//! [`crate::buffers::vertex_layouts`] and [`pass_flag_layout`]; the batcher only
//! binds them. The two compute pipelines use auto layouts, their bind group
//! layouts are queried from the pipeline.

use crate::camera::Frustum;

/// Bind group index at which batches bind the `billboardPass` flag during draws.
pub const PASS_FLAG_GROUP: u32 = 0;
/// Dynamic offset between the two flag values.
pub const PASS_FLAG_STRIDE: u64 = 256;

/// Uniform of `cull.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CullUniform {
    pub planes: [[f32; 4]; 6],
    pub object_count: u32,
    pub frustum_cull: u32,
    pub _padding: [u32; 2],
}

impl CullUniform {
    pub fn new(frustum: &Frustum, object_count: u32, frustum_cull: bool) -> Self {
        Self {
            planes: frustum.planes,
            object_count,
            frustum_cull: frustum_cull as u32,
            _padding: [0; 2],
        }
    }
}

/// Uniform of `flush.wgsl`: number of commands per category.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CountsUniform {
    pub counts: [u32; 3],
    pub _padding: u32,
}

/// Static part of an indirect command, input of `flush.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CommandSeed {
    pub index_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

/// The `billboardPass` flag as draw shaders read it.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassFlag {
    pub billboard_pass: f32,
    pub _padding: [f32; 3],
}

/// Pipelines shared by every batch of a renderer.
#[derive(Debug)]
pub struct ComputePipelines {
    pub cull: wgpu::ComputePipeline,
    pub flush: wgpu::ComputePipeline,
    pub pass_flag_layout: wgpu::BindGroupLayout,
}

impl ComputePipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            cull: mk_cull_pipeline(device),
            flush: mk_flush_pipeline(device),
            pass_flag_layout: pass_flag_layout(device),
        }
    }
}

pub fn mk_cull_pipeline(device: &wgpu::Device) -> wgpu::ComputePipeline {
    mk_compute_pipeline(
        device,
        "Cull Pipeline",
        wgpu::ShaderModuleDescriptor {
            label: Some("Cull Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("cull.wgsl").into()),
        },
    )
}

pub fn mk_flush_pipeline(device: &wgpu::Device) -> wgpu::ComputePipeline {
    mk_compute_pipeline(
        device,
        "Flush Pipeline",
        wgpu::ShaderModuleDescriptor {
            label: Some("Flush Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("flush.wgsl").into()),
        },
    )
}

pub fn mk_compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader: wgpu::ShaderModuleDescriptor,
) -> wgpu::ComputePipeline {
    let shader = device.create_shader_module(shader);
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: None,
        module: &shader,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Layout of the `billboardPass` flag; draw pipelines place it at [`PASS_FLAG_GROUP`].
pub fn pass_flag_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("pass_flag_bind_group_layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<PassFlag>() as u64),
            },
            count: None,
        }],
    })
}
