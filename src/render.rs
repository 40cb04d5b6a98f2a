//! Frame orchestration.
//!
//! [`SceneRenderer`] owns the batches of a [`Scene`]: one dynamic batch for
//! everything the scene gathers each frame, plus one static batch per node that
//! draws from its own prepared drawcall (full-static singletons, debug boxes).
//!
//! A frame runs in this order:
//!
//! 1. node updates, animation node updates, reflect camera
//! 2. dynamic batch rebuild when the aggregation table changed (an active
//!    batch hands its state to the replacement), then gather
//! 3. compute pre-pass of every batch
//! 4. render pass drawing every batch
//! 5. submit, then flush removed nodes and drop their batches
//!
//! Callers with their own passes (shadows, reflections) can run the steps
//! separately with [`SceneRenderer::prepare`], [`SceneRenderer::encode_compute`],
//! [`SceneRenderer::draw`] and [`SceneRenderer::finish_frame`].

use std::collections::HashMap;

use crate::{
    config::RenderConfig,
    context::Context,
    data_structures::{multi_instance::MultiInstance, scene_graph::NodeKey},
    multi_draw::{BatchState, MultiDrawBatch, PassKind, PassPipelines},
    pipelines::ComputePipelines,
    scene::Scene,
};

/// Attachments of the color pass.
pub struct FrameTargets<'a> {
    pub color: &'a wgpu::TextureView,
    pub depth: Option<&'a wgpu::TextureView>,
    /// Clear color, `None` keeps the previous content.
    pub clear: Option<wgpu::Color>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub updated_nodes: usize,
    pub updated_anim_nodes: usize,
    pub reflected: bool,
    pub instances: u32,
    pub dropped: u32,
    pub active_batches: usize,
    pub draw_calls: u32,
    pub flushed_nodes: usize,
}

#[derive(Debug)]
pub struct SceneRenderer {
    config: RenderConfig,
    pipelines: ComputePipelines,
    dynamic: Option<MultiDrawBatch>,
    dynamic_revision: Option<u64>,
    static_batches: HashMap<NodeKey, MultiDrawBatch>,
    frame: u64,
}

impl SceneRenderer {
    pub fn new(ctx: &Context, config: RenderConfig) -> Self {
        log::info!("Renderer config: {:?}", config);
        Self {
            config,
            pipelines: ComputePipelines::new(&ctx.device),
            dynamic: None,
            dynamic_revision: None,
            static_batches: HashMap::new(),
            frame: 0,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn pipelines(&self) -> &ComputePipelines {
        &self.pipelines
    }

    pub fn dynamic_batch(&self) -> Option<&MultiDrawBatch> {
        self.dynamic.as_ref()
    }

    pub fn static_batch(&self, node: NodeKey) -> Option<&MultiDrawBatch> {
        self.static_batches.get(&node)
    }

    pub fn static_batch_count(&self) -> usize {
        self.static_batches.len()
    }

    /// CPU side of a frame: scene maintenance, batch (re)builds and the gather.
    pub fn prepare(&mut self, ctx: &Context, scene: &mut Scene) -> FrameStats {
        let mut stats = FrameStats {
            updated_nodes: scene.update_nodes(),
            updated_anim_nodes: scene.update_anim_nodes(),
            reflected: scene.update_reflect_camera(),
            ..Default::default()
        };

        let revision = scene.aggregator().revision();
        if self.dynamic_revision != Some(revision) {
            let layout = MultiInstance::new(scene.aggregator());
            let previous = self.dynamic.as_ref().map(MultiDrawBatch::state);
            let batch = MultiDrawBatch::new(
                &ctx.device,
                &ctx.queue,
                "Dynamic Batch",
                layout,
                &self.config,
                &self.pipelines,
            );
            let state = BatchState::carried_over(previous, self.config.delay_frames);
            self.dynamic = Some(batch.with_state(state));
            self.dynamic_revision = Some(revision);
        }
        if let Some(batch) = self.dynamic.as_mut() {
            stats.dropped = batch.update(&ctx.queue, scene.gather_instances());
            stats.instances = batch.layout().instance_count();
        }

        for (key, node) in scene.graph().iter() {
            if !node.is_static_batch()
                || node.pending_removal()
                || self.static_batches.contains_key(&key)
            {
                continue;
            }
            let Some(drawcall) = node.drawcall() else {
                continue;
            };
            let batch = MultiDrawBatch::new(
                &ctx.device,
                &ctx.queue,
                &format!("Static Batch {:?}", node.kind),
                drawcall.clone(),
                &self.config,
                &self.pipelines,
            );
            self.static_batches.insert(key, batch);
        }
        stats
    }

    /// Encodes the compute pre-pass of every batch. Returns how many batches are active.
    pub fn encode_compute(
        &mut self,
        ctx: &Context,
        encoder: &mut wgpu::CommandEncoder,
        scene: &Scene,
    ) -> usize {
        let frustum = *scene.render_camera().frustum();
        let mut active = 0;
        for batch in self.dynamic.iter_mut().chain(self.static_batches.values_mut()) {
            if batch.encode_compute(&ctx.queue, encoder, &self.pipelines, &frustum) {
                active += 1;
            }
        }
        active
    }

    /// Draws every batch into `pass`. Batches of detached nodes are skipped.
    pub fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        scene: &Scene,
        pipelines: &PassPipelines,
        kind: PassKind,
    ) -> u32 {
        let mut draws = 0;
        if let Some(batch) = &self.dynamic {
            draws += batch.draw(pass, pipelines, kind);
        }
        for (key, batch) in &self.static_batches {
            if scene.graph().get(*key).is_some_and(|n| !n.pending_removal()) {
                draws += batch.draw(pass, pipelines, kind);
            }
        }
        draws
    }

    /// Flushes removed nodes and drops their batches. Call after the frame was submitted.
    pub fn finish_frame(&mut self, scene: &mut Scene) -> usize {
        let flushed = scene.flush_nodes();
        if flushed > 0 {
            let graph = scene.graph();
            self.static_batches.retain(|key, _| graph.contains(*key));
        }
        self.frame += 1;
        flushed
    }

    pub fn render_frame(
        &mut self,
        ctx: &Context,
        scene: &mut Scene,
        targets: &FrameTargets<'_>,
        pipelines: &PassPipelines,
    ) -> FrameStats {
        let mut stats = self.prepare(ctx, scene);

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        stats.active_batches = self.encode_compute(ctx, &mut encoder, scene);
        {
            let load = match targets.clear {
                Some(color) => wgpu::LoadOp::Clear(color),
                None => wgpu::LoadOp::Load,
            };
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Batch Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: targets.color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: targets.depth.map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                ..Default::default()
            });
            stats.draw_calls = self.draw(&mut pass, scene, pipelines, PassKind::Color);
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));

        stats.flushed_nodes = self.finish_frame(scene);
        if stats.dropped > 0 {
            log::warn!("Frame {}: {} instances over capacity", self.frame, stats.dropped);
        }
        stats
    }
}
