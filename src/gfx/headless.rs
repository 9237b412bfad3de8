//! 进程内软件后端
//!
//! 在没有 GPU 的环境（CI、非 Windows 平台）下模拟一条 GPU 时间线：
//! 队列提交、栅栏 signal 和呈现都会排入一个 FIFO，按提交顺序执行。
//!
//! - `ExecutionMode::Immediate`：提交后立即执行，行为接近一块很快的 GPU
//! - `ExecutionMode::Manual`：由测试通过 `HeadlessTimeline` 逐步推进，
//!   可以在任意线程上调用，用于验证 CPU 侧的阻塞等待
//!
//! 执行命令列表时会校验每个转换屏障的 before 状态，违规会记录下来供测试检查。
//!
//! 锁顺序：GPU 状态 → 栅栏 → 事件。

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::core::error::{GraphicsError, Result, StatusCode};
use crate::gfx::backend::{
    CompletionEvent, GpuCommandList, GpuDevice, GpuFence, GpuQueue, PresentSurface, QueueKind,
    ResourceState, WaitStatus, BACK_BUFFER_COUNT,
};
use crate::renderer::frame::{FrameContext, FramePass};
use crate::renderer::scene::SceneClock;
use crate::renderer::vertex::TRIANGLE;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 提交的执行方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Immediate,
    Manual,
}

/// 设备选项（含故障注入开关）
#[derive(Debug, Clone, Default)]
pub struct HeadlessOptions {
    pub execution: ExecutionMode,
    pub fail_event_creation: bool,
    pub fail_queue_creation: bool,
    pub fail_fence_creation: bool,
    /// 所有事件等待都报告失败
    pub fail_waits: bool,
}

/// 已成功创建的对象计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreatedObjects {
    pub events: usize,
    pub queues: usize,
    pub fences: usize,
    pub command_lists: usize,
    /// `set_event_on_completion` 调用次数
    pub event_registrations: usize,
}

/// GPU 执行时检测到的错误用法
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// 资源状态与屏障/操作要求不符
    ResourceState {
        resource: String,
        expected: ResourceState,
        actual: ResourceState,
    },
    /// 提交了未关闭的命令列表
    OpenCommandList,
}

/// 命令列表中记录的命令
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Transition {
        resource: HeadlessResource,
        before: ResourceState,
        after: ResourceState,
    },
    Clear {
        target: HeadlessResource,
        color: [f32; 4],
    },
    Draw {
        vertex_count: u32,
    },
}

enum PendingOp {
    Execute {
        commands: Vec<RecordedCommand>,
        closed: bool,
    },
    Signal {
        fence: HeadlessFence,
        value: u64,
    },
    Present {
        buffer: HeadlessResource,
    },
}

#[derive(Default)]
struct GpuState {
    pending: VecDeque<PendingOp>,
    submissions: usize,
    presents: usize,
    draw_calls: usize,
    last_clear_color: Option<[f32; 4]>,
    violations: Vec<Violation>,
}

impl GpuState {
    fn apply(&mut self, op: PendingOp) {
        match op {
            PendingOp::Execute { commands, closed } => {
                if !closed {
                    warn!("Command list executed while still open");
                    self.violations.push(Violation::OpenCommandList);
                }
                for command in commands {
                    self.apply_command(command);
                }
                self.submissions += 1;
            }
            PendingOp::Signal { fence, value } => fence.complete(value),
            PendingOp::Present { buffer } => {
                self.expect_state(&buffer, ResourceState::Present);
                self.presents += 1;
            }
        }
    }

    fn apply_command(&mut self, command: RecordedCommand) {
        match command {
            RecordedCommand::Transition { resource, before, after } => {
                self.expect_state(&resource, before);
                resource.set_state(after);
            }
            RecordedCommand::Clear { target, color } => {
                self.expect_state(&target, ResourceState::RenderTarget);
                self.last_clear_color = Some(color);
            }
            RecordedCommand::Draw { .. } => self.draw_calls += 1,
        }
    }

    fn expect_state(&mut self, resource: &HeadlessResource, expected: ResourceState) {
        let actual = resource.state();
        if actual != expected {
            warn!(resource = %resource, ?expected, ?actual, "Resource state violation");
            self.violations.push(Violation::ResourceState {
                resource: resource.name().to_string(),
                expected,
                actual,
            });
        }
    }
}

struct Shared {
    options: HeadlessOptions,
    gpu: Mutex<GpuState>,
    created: Mutex<CreatedObjects>,
    next_resource_id: AtomicU64,
}

impl Shared {
    fn submit(&self, op: PendingOp) {
        let mut gpu = lock(&self.gpu);
        gpu.pending.push_back(op);
        if self.options.execution == ExecutionMode::Immediate {
            while let Some(op) = gpu.pending.pop_front() {
                gpu.apply(op);
            }
        }
    }

    fn count(&self, update: impl FnOnce(&mut CreatedObjects)) {
        update(&mut lock(&self.created));
    }
}

/// 软件设备
#[derive(Clone)]
pub struct HeadlessDevice {
    shared: Arc<Shared>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(HeadlessOptions::default())
    }
}

impl HeadlessDevice {
    pub fn new(options: HeadlessOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                options,
                gpu: Mutex::new(GpuState::default()),
                created: Mutex::new(CreatedObjects::default()),
                next_resource_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn options(&self) -> &HeadlessOptions {
        &self.shared.options
    }

    pub fn created_objects(&self) -> CreatedObjects {
        *lock(&self.shared.created)
    }

    /// 可跨线程推进 GPU 时间线的句柄
    pub fn timeline(&self) -> HeadlessTimeline {
        HeadlessTimeline {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn create_resource(&self, name: impl Into<String>, initial_state: ResourceState) -> HeadlessResource {
        let id = self.shared.next_resource_id.fetch_add(1, Ordering::Relaxed);
        HeadlessResource {
            id,
            name: Arc::from(name.into()),
            state: Arc::new(Mutex::new(initial_state)),
        }
    }

    /// 创建带 `BACK_BUFFER_COUNT` 个后台缓冲区的交换链
    pub fn create_surface(&self) -> HeadlessSurface {
        let buffers = (0..BACK_BUFFER_COUNT)
            .map(|i| self.create_resource(format!("back_buffer_{}", i), ResourceState::Present))
            .collect();

        HeadlessSurface {
            shared: Arc::clone(&self.shared),
            buffers,
            current: AtomicUsize::new(0),
        }
    }
}

impl GpuDevice for HeadlessDevice {
    type Queue = HeadlessQueue;
    type Fence = HeadlessFence;
    type Event = HeadlessEvent;
    type CommandList = HeadlessCommandList;
    type Resource = HeadlessResource;

    fn create_completion_event(&self) -> Result<HeadlessEvent> {
        if self.shared.options.fail_event_creation {
            return Err(GraphicsError::EventCreationFailed(StatusCode::E_FAIL).into());
        }
        self.shared.count(|c| c.events += 1);

        Ok(HeadlessEvent {
            inner: Arc::new(EventInner {
                signaled: Mutex::new(false),
                condvar: Condvar::new(),
                fail_waits: self.shared.options.fail_waits,
            }),
        })
    }

    fn create_command_queue(&self, kind: QueueKind) -> Result<HeadlessQueue> {
        if self.shared.options.fail_queue_creation {
            return Err(GraphicsError::device_call("CreateCommandQueue", StatusCode::E_FAIL).into());
        }
        self.shared.count(|c| c.queues += 1);

        Ok(HeadlessQueue {
            shared: Arc::clone(&self.shared),
            kind,
        })
    }

    fn create_fence(&self, initial_value: u64) -> Result<HeadlessFence> {
        if self.shared.options.fail_fence_creation {
            return Err(GraphicsError::device_call("CreateFence", StatusCode::E_FAIL).into());
        }
        self.shared.count(|c| c.fences += 1);

        Ok(HeadlessFence {
            inner: Arc::new(Mutex::new(FenceInner {
                completed: initial_value,
                waiters: Vec::new(),
            })),
            shared: Arc::clone(&self.shared),
        })
    }

    fn create_command_list(&self, kind: QueueKind) -> Result<HeadlessCommandList> {
        self.shared.count(|c| c.command_lists += 1);
        Ok(HeadlessCommandList {
            kind,
            commands: Vec::new(),
            closed: true,
        })
    }
}

/// GPU 时间线句柄
#[derive(Clone)]
pub struct HeadlessTimeline {
    shared: Arc<Shared>,
}

impl HeadlessTimeline {
    /// 执行最早的一个待处理操作，队列为空时返回 false
    pub fn step(&self) -> bool {
        let mut gpu = lock(&self.shared.gpu);
        match gpu.pending.pop_front() {
            Some(op) => {
                gpu.apply(op);
                true
            }
            None => false,
        }
    }

    /// 执行所有待处理操作，返回执行的数量
    pub fn drain(&self) -> usize {
        let mut executed = 0;
        while self.step() {
            executed += 1;
        }
        trace!(executed, "Headless timeline drained");
        executed
    }

    pub fn pending(&self) -> usize {
        lock(&self.shared.gpu).pending.len()
    }

    /// 已执行的命令列表数量
    pub fn submissions(&self) -> usize {
        lock(&self.shared.gpu).submissions
    }

    pub fn presents(&self) -> usize {
        lock(&self.shared.gpu).presents
    }

    pub fn draw_calls(&self) -> usize {
        lock(&self.shared.gpu).draw_calls
    }

    pub fn last_clear_color(&self) -> Option<[f32; 4]> {
        lock(&self.shared.gpu).last_clear_color
    }

    pub fn violations(&self) -> Vec<Violation> {
        lock(&self.shared.gpu).violations.clone()
    }
}

/// 软件 GPU 资源，按 id 比较
#[derive(Clone)]
pub struct HeadlessResource {
    id: u64,
    name: Arc<str>,
    state: Arc<Mutex<ResourceState>>,
}

impl HeadlessResource {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// GPU 时间线上的当前状态
    pub fn state(&self) -> ResourceState {
        *lock(&self.state)
    }

    fn set_state(&self, state: ResourceState) {
        *lock(&self.state) = state;
    }
}

impl PartialEq for HeadlessResource {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for HeadlessResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessResource")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for HeadlessResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// 自动重置事件
#[derive(Clone)]
pub struct HeadlessEvent {
    inner: Arc<EventInner>,
}

struct EventInner {
    signaled: Mutex<bool>,
    condvar: Condvar,
    fail_waits: bool,
}

impl HeadlessEvent {
    fn set(&self) {
        *lock(&self.inner.signaled) = true;
        self.inner.condvar.notify_all();
    }
}

impl CompletionEvent for HeadlessEvent {
    fn wait(&self, timeout: Option<Duration>) -> Result<WaitStatus> {
        if self.inner.fail_waits {
            return Err(GraphicsError::WaitFailed("headless event wait failed".to_string()).into());
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut signaled = lock(&self.inner.signaled);

        while !*signaled {
            signaled = match deadline {
                None => self
                    .inner
                    .condvar
                    .wait(signaled)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(WaitStatus::TimedOut);
                    }
                    self.inner
                        .condvar
                        .wait_timeout(signaled, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
            };
        }

        *signaled = false;
        Ok(WaitStatus::Signaled)
    }
}

struct FenceInner {
    completed: u64,
    waiters: Vec<(u64, HeadlessEvent)>,
}

/// 软件栅栏
#[derive(Clone)]
pub struct HeadlessFence {
    inner: Arc<Mutex<FenceInner>>,
    shared: Arc<Shared>,
}

impl HeadlessFence {
    fn complete(&self, value: u64) {
        let mut inner = lock(&self.inner);
        inner.completed = inner.completed.max(value);

        let completed = inner.completed;
        inner.waiters.retain(|(target, event)| {
            if *target <= completed {
                event.set();
                false
            } else {
                true
            }
        });
    }
}

impl GpuFence for HeadlessFence {
    type Event = HeadlessEvent;

    fn completed_value(&self) -> u64 {
        lock(&self.inner).completed
    }

    fn set_event_on_completion(&self, value: u64, event: &HeadlessEvent) -> Result<()> {
        {
            let mut inner = lock(&self.inner);
            if inner.completed >= value {
                event.set();
            } else {
                inner.waiters.push((value, event.clone()));
            }
        }
        self.shared.count(|c| c.event_registrations += 1);
        Ok(())
    }
}

/// 软件命令队列
pub struct HeadlessQueue {
    shared: Arc<Shared>,
    kind: QueueKind,
}

impl HeadlessQueue {
    pub fn kind(&self) -> QueueKind {
        self.kind
    }
}

impl GpuQueue for HeadlessQueue {
    type Fence = HeadlessFence;
    type CommandList = HeadlessCommandList;

    fn execute(&self, command_list: &HeadlessCommandList) {
        self.shared.submit(PendingOp::Execute {
            commands: command_list.commands.clone(),
            closed: command_list.closed,
        });
    }

    fn signal(&self, fence: &HeadlessFence, value: u64) -> Result<()> {
        self.shared.submit(PendingOp::Signal {
            fence: fence.clone(),
            value,
        });
        Ok(())
    }
}

/// 软件命令列表
#[derive(Debug)]
pub struct HeadlessCommandList {
    kind: QueueKind,
    commands: Vec<RecordedCommand>,
    closed: bool,
}

impl HeadlessCommandList {
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn clear(&mut self, target: &HeadlessResource, color: [f32; 4]) {
        self.commands.push(RecordedCommand::Clear {
            target: target.clone(),
            color,
        });
    }

    pub fn draw(&mut self, vertex_count: u32) {
        self.commands.push(RecordedCommand::Draw { vertex_count });
    }
}

impl GpuCommandList for HeadlessCommandList {
    type Resource = HeadlessResource;

    fn reset(&mut self) -> Result<()> {
        self.commands.clear();
        self.closed = false;
        Ok(())
    }

    fn transition(&mut self, resource: &HeadlessResource, before: ResourceState, after: ResourceState) {
        self.commands.push(RecordedCommand::Transition {
            resource: resource.clone(),
            before,
            after,
        });
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(GraphicsError::device_call("Close", StatusCode::E_FAIL).into());
        }
        self.closed = true;
        Ok(())
    }
}

/// 软件交换链
///
/// `present` 在 CPU 侧立即轮转后台缓冲区索引，缓冲区状态的检查在 GPU
/// 时间线上进行。Immediate 模式下状态不对时 `present` 直接返回错误。
pub struct HeadlessSurface {
    shared: Arc<Shared>,
    buffers: Vec<HeadlessResource>,
    current: AtomicUsize,
}

impl PresentSurface for HeadlessSurface {
    type Resource = HeadlessResource;

    fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn current_back_buffer_index(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    fn back_buffer(&self, index: usize) -> Result<&HeadlessResource> {
        self.buffers.get(index).ok_or_else(|| {
            GraphicsError::BackBufferOutOfRange {
                index,
                count: self.buffers.len(),
            }
            .into()
        })
    }

    fn present(&self, vsync: bool) -> Result<()> {
        let index = self.current_back_buffer_index();
        let buffer = self.back_buffer(index)?.clone();

        if self.shared.options.execution == ExecutionMode::Immediate {
            let actual = buffer.state();
            if actual != ResourceState::Present {
                return Err(GraphicsError::InvalidResourceState {
                    resource: buffer.name().to_string(),
                    expected: ResourceState::Present,
                    actual,
                }
                .into());
            }
        }

        trace!(index, vsync, "Present");
        self.shared.submit(PendingOp::Present { buffer });
        self.current.store((index + 1) % self.buffers.len(), Ordering::Release);
        Ok(())
    }
}

/// 软件后端的场景绘制：用随时间变化的颜色清屏，然后画三角形
#[derive(Debug, Default)]
pub struct HeadlessScenePass {
    clock: SceneClock,
}

impl HeadlessScenePass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clock(&self) -> &SceneClock {
        &self.clock
    }
}

impl FramePass<HeadlessCommandList, HeadlessSurface> for HeadlessScenePass {
    fn record(
        &mut self,
        list: &mut HeadlessCommandList,
        surface: &HeadlessSurface,
        frame: &FrameContext,
    ) -> Result<()> {
        let target = surface.back_buffer(frame.back_buffer_index)?;

        self.clock.advance(frame.delta_seconds);
        list.clear(target, self.clock.clear_color());
        list.draw(TRIANGLE.len() as u32);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual() -> HeadlessDevice {
        HeadlessDevice::new(HeadlessOptions {
            execution: ExecutionMode::Manual,
            ..Default::default()
        })
    }

    #[test]
    fn test_manual_mode_defers_work() {
        let device = manual();
        let queue = device.create_command_queue(QueueKind::Direct).unwrap();
        let fence = device.create_fence(0).unwrap();

        queue.signal(&fence, 1).unwrap();
        assert_eq!(fence.completed_value(), 0);
        assert_eq!(device.timeline().pending(), 1);

        assert!(device.timeline().step());
        assert_eq!(fence.completed_value(), 1);
        assert!(!device.timeline().step());
    }

    #[test]
    fn test_fence_never_moves_backwards() {
        let device = HeadlessDevice::default();
        let queue = device.create_command_queue(QueueKind::Direct).unwrap();
        let fence = device.create_fence(0).unwrap();

        queue.signal(&fence, 5).unwrap();
        queue.signal(&fence, 3).unwrap();
        assert_eq!(fence.completed_value(), 5);
    }

    #[test]
    fn test_event_fires_when_already_complete() {
        let device = HeadlessDevice::default();
        let fence = device.create_fence(4).unwrap();
        let event = device.create_completion_event().unwrap();

        fence.set_event_on_completion(3, &event).unwrap();
        assert_eq!(event.wait(Some(Duration::ZERO)).unwrap(), WaitStatus::Signaled);
        // 自动重置
        assert_eq!(
            event.wait(Some(Duration::from_millis(1))).unwrap(),
            WaitStatus::TimedOut
        );
    }

    #[test]
    fn test_transition_mismatch_is_recorded() {
        let device = HeadlessDevice::default();
        let queue = device.create_command_queue(QueueKind::Direct).unwrap();
        let mut list = device.create_command_list(QueueKind::Direct).unwrap();
        let buffer = device.create_resource("buffer", ResourceState::Present);

        list.reset().unwrap();
        list.transition(&buffer, ResourceState::RenderTarget, ResourceState::Present);
        list.close().unwrap();
        queue.execute(&list);

        let violations = device.timeline().violations();
        assert_eq!(
            violations,
            vec![Violation::ResourceState {
                resource: "buffer".to_string(),
                expected: ResourceState::RenderTarget,
                actual: ResourceState::Present,
            }]
        );
    }

    #[test]
    fn test_executing_open_list_is_recorded() {
        let device = HeadlessDevice::default();
        let queue = device.create_command_queue(QueueKind::Direct).unwrap();
        let mut list = device.create_command_list(QueueKind::Direct).unwrap();

        list.reset().unwrap();
        queue.execute(&list);
        assert_eq!(device.timeline().violations(), vec![Violation::OpenCommandList]);
    }

    #[test]
    fn test_double_close_fails() {
        let device = HeadlessDevice::default();
        let mut list = device.create_command_list(QueueKind::Direct).unwrap();

        assert!(list.is_closed());
        assert!(list.close().is_err());
        list.reset().unwrap();
        assert!(list.close().is_ok());
    }

    #[test]
    fn test_surface_rotates_back_buffers() {
        let device = HeadlessDevice::default();
        let surface = device.create_surface();

        assert_eq!(surface.buffer_count(), BACK_BUFFER_COUNT);
        let indices: Vec<usize> = (0..4)
            .map(|_| {
                let index = surface.current_back_buffer_index();
                surface.present(false).unwrap();
                index
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0]);
        assert_eq!(device.timeline().presents(), 4);
    }

    #[test]
    fn test_present_requires_present_state() {
        let device = HeadlessDevice::default();
        let surface = device.create_surface();
        surface.back_buffer(0).unwrap().set_state(ResourceState::RenderTarget);

        assert!(surface.present(false).is_err());
        assert_eq!(surface.current_back_buffer_index(), 0);
        assert_eq!(device.timeline().presents(), 0);
    }

    #[test]
    fn test_back_buffer_out_of_range() {
        let device = HeadlessDevice::default();
        let surface = device.create_surface();
        assert!(surface.back_buffer(BACK_BUFFER_COUNT).is_err());
    }
}
