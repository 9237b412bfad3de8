//! 图形后端的统一抽象接口
//!
//! 命令队列同步和帧循环只依赖本模块定义的几个 trait：
//!
//! - `GpuDevice`：创建完成事件、命令队列、栅栏和命令列表
//! - `GpuQueue`：提交命令列表、在 GPU 时间线上 signal 栅栏
//! - `GpuFence`：读取 GPU 已完成的值、在到达某个值时触发事件
//! - `CompletionEvent`：CPU 侧可阻塞等待的操作系统事件
//! - `GpuCommandList`：重置、记录转换屏障、关闭
//! - `PresentSurface`：交换链（固定数量的后台缓冲区轮转）
//!
//! DirectX 12 后端（`gfx::dx12`）和进程内的 headless 后端（`gfx::headless`）
//! 都实现了这些接口。

use std::time::Duration;

use crate::core::error::Result;

/// 交换链后台缓冲区数量
pub const BACK_BUFFER_COUNT: usize = 3;

/// 命令队列类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// 图形队列（支持图形、计算、复制）
    Direct,
    /// 计算队列
    Compute,
    /// 复制队列
    Copy,
}

/// 渲染器用到的资源状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// 可呈现
    Present,
    /// 可作为渲染目标写入
    RenderTarget,
    /// 复制目标
    CopyDest,
    /// 顶点/常量缓冲区
    VertexAndConstantBuffer,
    /// 上传堆的通用读取状态
    GenericRead,
}

/// 事件等待结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Signaled,
    TimedOut,
}

/// 图形设备
pub trait GpuDevice {
    type Queue: GpuQueue<Fence = Self::Fence, CommandList = Self::CommandList>;
    type Fence: GpuFence<Event = Self::Event>;
    type Event: CompletionEvent;
    type CommandList: GpuCommandList<Resource = Self::Resource>;
    type Resource;

    /// 创建自动重置的完成事件
    fn create_completion_event(&self) -> Result<Self::Event>;

    fn create_command_queue(&self, kind: QueueKind) -> Result<Self::Queue>;

    fn create_fence(&self, initial_value: u64) -> Result<Self::Fence>;

    /// 创建命令分配器和命令列表，返回时处于关闭状态
    fn create_command_list(&self, kind: QueueKind) -> Result<Self::CommandList>;
}

/// GPU 命令队列
pub trait GpuQueue {
    type Fence;
    type CommandList;

    /// 提交一个已关闭的命令列表
    fn execute(&self, command_list: &Self::CommandList);

    /// 在 GPU 时间线上把栅栏设置为 `value`
    fn signal(&self, fence: &Self::Fence, value: u64) -> Result<()>;
}

/// GPU 栅栏
pub trait GpuFence {
    type Event;

    /// GPU 已完成的值
    fn completed_value(&self) -> u64;

    /// 栅栏到达 `value` 时触发 `event`
    fn set_event_on_completion(&self, value: u64, event: &Self::Event) -> Result<()>;
}

/// 操作系统完成事件
pub trait CompletionEvent {
    /// 阻塞等待事件触发，`None` 表示无限等待
    fn wait(&self, timeout: Option<Duration>) -> Result<WaitStatus>;
}

/// 命令列表（连同它的命令分配器）
pub trait GpuCommandList {
    type Resource;

    /// 重置命令分配器和命令列表
    ///
    /// 调用者保证分配器上一次的 GPU 使用已经完成。
    fn reset(&mut self) -> Result<()>;

    /// 记录一个转换屏障
    fn transition(&mut self, resource: &Self::Resource, before: ResourceState, after: ResourceState);

    fn close(&mut self) -> Result<()>;
}

/// 呈现表面（交换链）
pub trait PresentSurface {
    type Resource;

    fn buffer_count(&self) -> usize;

    /// 当前可绘制的后台缓冲区索引
    fn current_back_buffer_index(&self) -> usize;

    fn back_buffer(&self, index: usize) -> Result<&Self::Resource>;

    fn present(&self, vsync: bool) -> Result<()>;
}
