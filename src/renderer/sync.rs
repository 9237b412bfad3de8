//! GPU 命令队列同步
//!
//! `CommandQueue` 持有 GPU 队列、一个栅栏和一个完成事件，提供
//! signal / wait / flush 三个同步原语，保证 CPU 侧复用资源（缓冲区、命令分配器）
//! 时 GPU 已经不再使用它们。
//!
//! # 同步模型
//!
//! - 只有 `signal` 会修改栅栏值，每次调用先递增再提交
//! - GPU 报告的完成值 ≥ v 时，称 v 已到达
//! - `wait_for_fence_value` 无限期阻塞调用线程，没有超时和取消；
//!   接口边界上另外提供了带超时的版本
//! - `flush` = `wait_for_fence_value(signal())`

use std::time::{Duration, Instant};

use tracing::{debug, error, trace};

use crate::core::error::Result;
use crate::gfx::backend::{
    CompletionEvent, GpuDevice, GpuFence, GpuQueue, QueueKind, WaitStatus,
};

/// Fence 值
///
/// 用于CPU-GPU同步的单调递增值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FenceValue(u64);

impl FenceValue {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// 下一个Fence值
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for FenceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// GPU 命令队列
///
/// 销毁前必须先 `flush`，确保没有未完成的 GPU 工作引用它拥有的资源；
/// 持有者（`Engine`）在 Drop 中完成这一步。
pub struct CommandQueue<D: GpuDevice> {
    queue: D::Queue,
    fence: D::Fence,
    fence_event: D::Event,
    fence_value: FenceValue,
    kind: QueueKind,
}

impl<D: GpuDevice> CommandQueue<D> {
    /// 创建命令队列
    ///
    /// 先创建完成事件：失败时直接返回，不会再创建任何 GPU 对象。
    /// 之后依次创建 GPU 队列和初始值为 0 的栅栏。
    pub fn create(device: &D, kind: QueueKind) -> Result<Self> {
        let fence_event = device.create_completion_event().map_err(|e| {
            error!(error = %e, "Failed to create fence completion event");
            e
        })?;

        let queue = device.create_command_queue(kind).map_err(|e| {
            error!(error = %e, ?kind, "Failed to create command queue");
            e
        })?;

        let fence = device.create_fence(0).map_err(|e| {
            error!(error = %e, "Failed to create fence");
            e
        })?;

        debug!(?kind, "Command queue created");

        Ok(Self {
            queue,
            fence,
            fence_event,
            fence_value: FenceValue::default(),
            kind,
        })
    }

    /// 底层 GPU 队列（交换链创建需要）
    pub fn queue(&self) -> &D::Queue {
        &self.queue
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// 最近一次 signal 的值
    pub fn current_value(&self) -> FenceValue {
        self.fence_value
    }

    /// GPU 报告的已完成值
    pub fn completed_value(&self) -> FenceValue {
        FenceValue::new(self.fence.completed_value())
    }

    /// 提交一个已关闭的命令列表
    pub fn execute(&self, command_list: &D::CommandList) {
        self.queue.execute(command_list);
    }

    /// 递增栅栏值并在 GPU 时间线上 signal
    ///
    /// 计数器在提交前递增，即使提交失败也不会回退，保证返回值严格单调。
    pub fn signal(&mut self) -> Result<FenceValue> {
        self.fence_value = self.fence_value.next();
        let value = self.fence_value;

        self.queue.signal(&self.fence, value.value())?;

        trace!(fence_value = value.value(), "Fence signaled");
        Ok(value)
    }

    /// 非阻塞地检查 `value` 是否已到达
    pub fn is_fence_complete(&self, value: FenceValue) -> bool {
        self.fence.completed_value() >= value.value()
    }

    /// 阻塞直到 `value` 到达（无超时）
    pub fn wait_for_fence_value(&self, value: FenceValue) -> Result<()> {
        self.wait_until(value, None).map(|_| ())
    }

    /// 带超时的等待，超时返回 `Ok(false)`
    pub fn wait_for_fence_value_timeout(&self, value: FenceValue, timeout: Duration) -> Result<bool> {
        let status = self.wait_until(value, Some(Instant::now() + timeout))?;
        Ok(status == WaitStatus::Signaled)
    }

    /// signal 后等待该值到达，返回等待的值
    pub fn flush(&mut self) -> Result<FenceValue> {
        let value = self.signal()?;
        self.wait_for_fence_value(value)?;
        Ok(value)
    }

    fn wait_until(&self, value: FenceValue, deadline: Option<Instant>) -> Result<WaitStatus> {
        // 每次唤醒后重新检查：之前一次超时的注册可能留下过期的事件信号
        loop {
            if self.is_fence_complete(value) {
                return Ok(WaitStatus::Signaled);
            }

            let timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(WaitStatus::TimedOut);
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            self.fence.set_event_on_completion(value.value(), &self.fence_event)?;

            trace!(fence_value = value.value(), "Waiting for fence");
            if self.fence_event.wait(timeout)? == WaitStatus::TimedOut
                && !self.is_fence_complete(value)
            {
                return Ok(WaitStatus::TimedOut);
            }
        }
    }
}
