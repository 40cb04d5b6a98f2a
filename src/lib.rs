//! batch-ngin
//!
//! The GPU-driven batching core of a scene engine. Many mesh instances are
//! grouped into a few indirect multi-draws: a compute pass culls instances,
//! writes their world matrices and fills the indirect draw commands, then one
//! `multi_draw_indexed_indirect` per render category consumes them. A scene
//! graph with deferred update and removal queues keeps transforms and bounding
//! volumes current and feeds the per-mesh instance aggregation.
//!
//! High-level modules
//! - `buffers`: typed GPU buffers at fixed vertex slots and their layouts
//! - `camera`: view/projection, frustum planes and planar reflection
//! - `config`: renderer configuration
//! - `context`: device and queue the batches are created on
//! - `data_structures`: scene graph, aggregation, batch layout and shared types
//! - `flow`: frame flow, logging setup and the simulation thread protocol
//! - `multi_draw`: GPU batches with their compute pre-pass and indirect draws
//! - `pipelines`: the cull and flush compute pipelines and their uniforms
//! - `render`: frame orchestration over a scene's batches
//! - `resources`: asset registry and animations
//! - `scene`: node roots, cameras, singletons and debug helpers
//!

pub mod buffers;
pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod flow;
pub mod multi_draw;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod scene;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use wgpu;
