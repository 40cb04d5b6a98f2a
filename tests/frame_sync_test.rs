mod common;

use std::{thread, time::Duration};

use batch_ngin::{
    config::RenderConfig,
    flow::{FrameDriver, FrameSync, SceneFlow, SimulationThread},
    scene::Scene,
};
use common::scene;

#[test]
fn prepare_waits_for_the_draw_side() {
    let sync = FrameSync::new(0u32);
    assert!(sync.try_prepare(|n| *n += 1));
    assert!(sync.is_ready());
    // the prepared frame was not drawn yet
    assert!(!sync.try_prepare(|n| *n += 1));

    let drawn = sync.consume(|n, fresh| {
        assert!(fresh);
        *n
    });
    assert_eq!(drawn, 1);
    assert!(!sync.is_ready());
    sync.consume(|_, fresh| assert!(!fresh));
}

#[test]
fn simulation_thread_prepares_one_frame_per_draw() {
    let sync = FrameSync::new(Vec::<u32>::new());
    let mut step = 0;
    let mut simulation = SimulationThread::spawn(sync.clone(), move |frames: &mut Vec<u32>| {
        step += 1;
        frames.push(step);
    })
    .unwrap();
    assert!(simulation.is_running());

    let mut drawn = Vec::new();
    while drawn.len() < 5 {
        if sync.is_ready() {
            sync.consume(|frames, fresh| {
                assert!(fresh);
                drawn.push(frames.len());
            });
        } else {
            thread::sleep(Duration::from_millis(1));
        }
    }
    // every draw saw exactly one more prepared frame
    assert_eq!(drawn, vec![1, 2, 3, 4, 5]);

    simulation.shutdown();
    assert!(!simulation.is_running());
    assert!(sync.with(|frames| frames.len()) <= 6);
    // shutting down twice is harmless
    simulation.shutdown();
}

#[test]
fn dropping_the_simulation_thread_stops_it() {
    let sync = FrameSync::new(0u64);
    let simulation = SimulationThread::spawn(sync.clone(), |n: &mut u64| *n += 1).unwrap();
    drop(simulation);
    let settled = sync.with(|n| *n);
    sync.consume(|_, _| ());
    thread::sleep(Duration::from_millis(20));
    assert_eq!(sync.with(|n| *n), settled);
}

#[derive(Default)]
struct Counting {
    acted: u32,
    prepared: u32,
}

impl SceneFlow for Counting {
    fn on_act(&mut self, _: &mut Scene, _: Duration) {
        self.acted += 1;
    }

    fn on_prepare(&mut self, _: &mut Scene) {
        self.prepared += 1;
    }
}

#[test]
fn single_thread_driver_runs_the_hooks_inline() {
    let mut driver =
        FrameDriver::new(scene(), Counting::default(), &RenderConfig::default()).unwrap();
    assert!(!driver.is_dual_thread());

    for _ in 0..3 {
        driver.frame(|scene| scene.update_nodes());
    }
    driver.with_state(|state| {
        assert_eq!(state.flow.acted, 3);
        assert_eq!(state.flow.prepared, 3);
        assert!(state.time >= 0.0);
    });
}

#[test]
fn dual_thread_driver_prepares_ahead() {
    let config = RenderConfig::default().with_dual_thread(true);
    let mut driver = FrameDriver::new(scene(), Counting::default(), &config).unwrap();
    assert!(driver.is_dual_thread());

    while driver.with_state(|state| state.flow.prepared) == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    driver.frame(|_| ());
    driver.shutdown();
    let prepared = driver.with_state(|state| state.flow.prepared);
    assert!(prepared >= 1);
    assert!(!driver.is_dual_thread());
    // no hooks run after shutdown
    thread::sleep(Duration::from_millis(10));
    assert_eq!(driver.with_state(|state| state.flow.prepared), prepared);
}
