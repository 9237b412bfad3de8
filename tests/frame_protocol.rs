//! 在软件后端上验证栅栏同步和每帧屏障协议

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use mksv::core::InstanceGuard;
use mksv::gfx::backend::{GpuDevice, PresentSurface, QueueKind, ResourceState, BACK_BUFFER_COUNT};
use mksv::gfx::headless::{
    ExecutionMode, HeadlessDevice, HeadlessOptions, HeadlessScenePass, RecordedCommand,
};
use mksv::renderer::{CommandQueue, FenceValue, FrameLoop};
use mksv::HeadlessEngine;

static INSTANCE_LOCK: Mutex<()> = Mutex::new(());

fn instance_lock() -> MutexGuard<'static, ()> {
    INSTANCE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn manual_device() -> HeadlessDevice {
    HeadlessDevice::new(HeadlessOptions {
        execution: ExecutionMode::Manual,
        ..Default::default()
    })
}

/// 后台线程持续推进 GPU 时间线，模拟一块慢速 GPU
struct GpuThread {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl GpuThread {
    fn spawn(device: &HeadlessDevice) -> Self {
        let timeline = device.timeline();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                if !timeline.step() {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for GpuThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

#[test]
fn signal_values_are_strictly_increasing() {
    let device = manual_device();
    let mut queue = CommandQueue::create(&device, QueueKind::Direct).unwrap();

    let values: Vec<FenceValue> = (0..5).map(|_| queue.signal().unwrap()).collect();
    assert_eq!(values, (1..=5).map(FenceValue::new).collect::<Vec<_>>());
    assert!(values.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(queue.current_value(), FenceValue::new(5));

    // GPU 尚未执行任何 signal
    assert_eq!(queue.completed_value(), FenceValue::new(0));
    assert!(!queue.is_fence_complete(FenceValue::new(1)));

    device.timeline().drain();
    assert!(values.iter().all(|&v| queue.is_fence_complete(v)));
}

#[test]
fn wait_blocks_until_gpu_reaches_value() {
    let device = manual_device();
    let mut queue = CommandQueue::create(&device, QueueKind::Direct).unwrap();
    let timeline = device.timeline();

    let first = queue.signal().unwrap();
    let second = queue.signal().unwrap();

    let gpu = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        assert!(timeline.step());
        thread::sleep(Duration::from_millis(20));
        assert!(timeline.step());
    });

    queue.wait_for_fence_value(second).unwrap();
    assert!(queue.is_fence_complete(first));
    assert!(queue.is_fence_complete(second));
    gpu.join().unwrap();
}

#[test]
fn wait_on_reached_value_does_not_touch_event() {
    let device = HeadlessDevice::default();
    let mut queue = CommandQueue::create(&device, QueueKind::Copy).unwrap();

    let value = queue.signal().unwrap();
    let before = device.created_objects().event_registrations;
    queue.wait_for_fence_value(value).unwrap();
    queue.wait_for_fence_value(FenceValue::new(0)).unwrap();

    assert_eq!(device.created_objects().event_registrations, before);
}

#[test]
fn timed_wait_reports_timeout_then_success() {
    let device = manual_device();
    let mut queue = CommandQueue::create(&device, QueueKind::Compute).unwrap();

    let value = queue.signal().unwrap();
    let reached = queue
        .wait_for_fence_value_timeout(value, Duration::from_millis(10))
        .unwrap();
    assert!(!reached);

    device.timeline().drain();
    let reached = queue
        .wait_for_fence_value_timeout(value, Duration::from_millis(10))
        .unwrap();
    assert!(reached);
}

#[test]
fn flush_waits_for_all_prior_work() {
    let device = manual_device();
    let mut queue = CommandQueue::create(&device, QueueKind::Direct).unwrap();
    let _gpu = GpuThread::spawn(&device);

    for _ in 0..3 {
        queue.signal().unwrap();
    }
    let flushed = queue.flush().unwrap();

    assert_eq!(flushed, FenceValue::new(4));
    assert!(queue.completed_value() >= flushed);
    assert_eq!(device.timeline().pending(), 0);
}

#[test]
fn frames_keep_back_buffers_in_present_state() {
    let device = manual_device();
    let mut queue = CommandQueue::create(&device, QueueKind::Direct).unwrap();
    let mut list = device.create_command_list(QueueKind::Direct).unwrap();
    let surface = device.create_surface();
    let mut pass = HeadlessScenePass::new();
    let mut frames = FrameLoop::new(true);
    let _gpu = GpuThread::spawn(&device);

    let frame_count = 2 * BACK_BUFFER_COUNT as u64 + 1;
    for expected in 0..frame_count {
        let report = frames
            .run_frame(&mut queue, &mut list, &surface, &mut pass)
            .unwrap();

        assert_eq!(report.frame_number, expected);
        assert_eq!(report.back_buffer_index, expected as usize % BACK_BUFFER_COUNT);
        assert_eq!(report.fence_value, FenceValue::new(expected + 1));
        // 帧末 flush 之后 GPU 不再持有任何未完成的工作
        assert!(queue.is_fence_complete(report.fence_value));

        let target = surface.back_buffer(report.back_buffer_index).unwrap();
        let barriers: Vec<(ResourceState, ResourceState)> = list
            .commands()
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::Transition { resource, before, after } => {
                    assert_eq!(resource, target);
                    Some((*before, *after))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            barriers,
            vec![
                (ResourceState::Present, ResourceState::RenderTarget),
                (ResourceState::RenderTarget, ResourceState::Present),
            ]
        );
    }

    let timeline = device.timeline();
    assert!(timeline.violations().is_empty(), "{:?}", timeline.violations());
    assert_eq!(timeline.presents() as u64, frame_count);
    assert_eq!(timeline.draw_calls() as u64, frame_count);
    for index in 0..surface.buffer_count() {
        assert_eq!(surface.back_buffer(index).unwrap().state(), ResourceState::Present);
    }
}

#[test]
fn engine_renders_and_flushes_on_drop() {
    let _lock = instance_lock();
    let guard = InstanceGuard::acquire().unwrap();
    let mut engine = HeadlessEngine::headless(guard, HeadlessOptions::default(), false).unwrap();

    for _ in 0..4 {
        engine.update().unwrap();
    }
    assert_eq!(engine.frame_number(), 4);
    assert_eq!(engine.queue().current_value(), FenceValue::new(4));

    let timeline = engine.device().timeline();
    drop(engine);

    assert_eq!(timeline.pending(), 0);
    assert_eq!(timeline.presents(), 4);
    assert!(timeline.violations().is_empty());
    assert!(!InstanceGuard::is_held());
}

#[test]
#[cfg_attr(debug_assertions, should_panic(expected = "Only 1 engine instance"))]
fn second_engine_instance_is_rejected() {
    let _lock = instance_lock();
    let _first = HeadlessEngine::headless(
        InstanceGuard::acquire().unwrap(),
        HeadlessOptions::default(),
        false,
    )
    .unwrap();

    assert!(InstanceGuard::acquire().is_err());
}

#[test]
fn queue_creation_failure_is_reported() {
    let device = HeadlessDevice::new(HeadlessOptions {
        fail_queue_creation: true,
        ..Default::default()
    });

    assert!(CommandQueue::create(&device, QueueKind::Direct).is_err());
    assert_eq!(device.created_objects().queues, 0);
    assert_eq!(device.created_objects().fences, 0);
}
