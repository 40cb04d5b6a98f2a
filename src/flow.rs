//! Frame flow and the optional simulation thread.
//!
//! In single-thread mode a [`FrameDriver`] runs the [`SceneFlow`] hooks inline
//! right before every draw. In dual-thread mode a [`SimulationThread`] runs them
//! one frame ahead and the draw path only consumes what was prepared.
//!
//! # Synchronization
//!
//! One mutex guards the "data ready" flag together with the frame state
//! ([`FrameSync`]). The simulation thread polls that lock, prepares the next
//! frame while the flag is clear, and sets it. The draw path locks, draws from
//! the prepared state and clears the flag. All GPU submission stays on the
//! thread that owns the [`crate::context::Context`]; the simulation thread only
//! mutates scene state while holding the lock.
//!
//! Shutdown sets the exit flag and spins until the simulation thread reports it
//! has ended, before any GPU resource is released.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use instant::{Duration, Instant};
use parking_lot::Mutex;

use crate::{config::RenderConfig, scene::Scene};

/// Installs `env_logger` unless a logger is already set.
pub fn init_logging() {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    };
}

#[derive(Debug)]
struct Shared<T> {
    ready: bool,
    data: T,
}

/// The shared frame state and its "data ready" flag, behind one lock.
#[derive(Debug)]
pub struct FrameSync<T> {
    inner: Arc<Mutex<Shared<T>>>,
}

impl<T> Clone for FrameSync<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> FrameSync<T> {
    pub fn new(data: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Shared { ready: false, data })),
        }
    }

    /// Simulation side: prepares the next frame unless the last one was not consumed yet.
    pub fn try_prepare(&self, prepare: impl FnOnce(&mut T)) -> bool {
        let mut shared = self.inner.lock();
        if shared.ready {
            return false;
        }
        prepare(&mut shared.data);
        shared.ready = true;
        true
    }

    /// Draw side: runs `draw` on the state and marks it consumed. `draw` is told
    /// whether the state was freshly prepared.
    pub fn consume<R>(&self, draw: impl FnOnce(&mut T, bool) -> R) -> R {
        let mut shared = self.inner.lock();
        let fresh = shared.ready;
        let result = draw(&mut shared.data, fresh);
        shared.ready = false;
        result
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().ready
    }

    /// Runs `f` on the state without touching the flag.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.lock().data)
    }
}

#[derive(Debug)]
pub struct SimulationThread {
    exit: Arc<AtomicBool>,
    ended: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SimulationThread {
    /// Spawns a thread that calls `step` whenever `sync` has been consumed.
    pub fn spawn<T, F>(sync: FrameSync<T>, mut step: F) -> anyhow::Result<Self>
    where
        T: Send + 'static,
        F: FnMut(&mut T) + Send + 'static,
    {
        let exit = Arc::new(AtomicBool::new(false));
        let ended = Arc::new(AtomicBool::new(false));
        let (thread_exit, thread_ended) = (exit.clone(), ended.clone());
        let handle = thread::Builder::new()
            .name("simulation".to_string())
            .spawn(move || {
                log::debug!("Simulation thread started");
                while !thread_exit.load(Ordering::Acquire) {
                    if !sync.try_prepare(|data| step(data)) {
                        thread::yield_now();
                    }
                }
                thread_ended.store(true, Ordering::Release);
                log::debug!("Simulation thread ended");
            })?;
        Ok(Self {
            exit,
            ended,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && !self.ended.load(Ordering::Acquire)
    }

    /// Stops the thread, spinning until it reported its end, then joins it.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.exit.store(true, Ordering::Release);
        while !self.ended.load(Ordering::Acquire) {
            // a panicked thread never reports its end
            if handle.is_finished() {
                break;
            }
            std::hint::spin_loop();
            thread::yield_now();
        }
        if handle.join().is_err() {
            log::error!("Simulation thread panicked");
        }
    }
}

impl Drop for SimulationThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Per-frame hooks of an application scene.
pub trait SceneFlow: Send + 'static {
    /// Game logic for the elapsed `dt`.
    fn on_act(&mut self, scene: &mut Scene, dt: Duration);

    /// Last scene mutations before the frame is drawn.
    fn on_prepare(&mut self, scene: &mut Scene);

    /// Poses animated objects at `time` seconds since start.
    fn on_animate(&mut self, scene: &mut Scene, time: f32) {
        scene.animate(time);
    }
}

#[derive(Debug)]
pub struct FrameState<F> {
    pub scene: Scene,
    pub flow: F,
    pub time: f32,
    last: Instant,
}

impl<F: SceneFlow> FrameState<F> {
    fn new(scene: Scene, flow: F) -> Self {
        Self {
            scene,
            flow,
            time: 0.0,
            last: Instant::now(),
        }
    }

    fn step(&mut self) {
        let now = Instant::now();
        let dt = now - self.last;
        self.last = now;
        self.time += dt.as_secs_f32();
        self.flow.on_act(&mut self.scene, dt);
        self.flow.on_animate(&mut self.scene, self.time);
        self.flow.on_prepare(&mut self.scene);
    }
}

#[derive(Debug)]
pub struct FrameDriver<F> {
    sync: FrameSync<FrameState<F>>,
    simulation: Option<SimulationThread>,
}

impl<F: SceneFlow> FrameDriver<F> {
    pub fn new(scene: Scene, flow: F, config: &RenderConfig) -> anyhow::Result<Self> {
        let sync = FrameSync::new(FrameState::new(scene, flow));
        let simulation = if config.dual_thread {
            Some(SimulationThread::spawn(sync.clone(), FrameState::step)?)
        } else {
            None
        };
        Ok(Self { sync, simulation })
    }

    pub fn is_dual_thread(&self) -> bool {
        self.simulation.is_some()
    }

    /**
     * Runs one frame. Single-threaded, the flow hooks run first; dual-threaded,
     * `draw` gets whatever the simulation thread prepared last. Returns what
     * `draw` returned.
     */
    pub fn frame<R>(&mut self, draw: impl FnOnce(&mut Scene) -> R) -> R {
        let inline = self.simulation.is_none();
        self.sync.consume(|state, fresh| {
            if inline {
                state.step();
            } else if !fresh {
                log::debug!("Drawing without a freshly prepared frame");
            }
            draw(&mut state.scene)
        })
    }

    /// Access to the state outside of a frame, e.g. for setup.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut FrameState<F>) -> R) -> R {
        self.sync.with(f)
    }

    pub fn shutdown(&mut self) {
        if let Some(mut simulation) = self.simulation.take() {
            simulation.shutdown();
        }
    }
}

impl<F> Drop for FrameDriver<F> {
    fn drop(&mut self) {
        if let Some(mut simulation) = self.simulation.take() {
            simulation.shutdown();
        }
    }
}
