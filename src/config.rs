//! Renderer configuration.

use crate::multi_draw::RefreshStrategy;

/// Invocations per workgroup of both compute shaders (`cull.wgsl`, `flush.wgsl`).
pub const WORKGROUP_SIZE: u32 = 64;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderConfig {
    /// Frames a freshly built batch waits before its first compute and draw.
    pub delay_frames: u32,
    /// How a batch refreshes its indirect commands, fixed when the batch is built.
    pub refresh: RefreshStrategy,
    /// Run scene preparation on a simulation thread one frame ahead of drawing.
    pub dual_thread: bool,
    /// Distances at which objects switch to the mid and low LOD meshes.
    pub lod_distances: [f32; 2],
    /// Let the cull pass reject instances outside the camera frustum.
    pub frustum_cull: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            delay_frames: 3,
            refresh: RefreshStrategy::HostWrite,
            dual_thread: false,
            lod_distances: [60.0, 180.0],
            frustum_cull: true,
        }
    }
}

impl RenderConfig {
    pub fn with_delay_frames(mut self, frames: u32) -> Self {
        self.delay_frames = frames;
        self
    }

    pub fn with_refresh(mut self, refresh: RefreshStrategy) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_dual_thread(mut self, dual_thread: bool) -> Self {
        self.dual_thread = dual_thread;
        self
    }

    pub fn with_lod_distances(mut self, near: f32, mid: f32) -> Self {
        self.lod_distances = [near, mid.max(near)];
        self
    }

    pub fn with_frustum_cull(mut self, frustum_cull: bool) -> Self {
        self.frustum_cull = frustum_cull;
        self
    }
}
