//! 每帧的屏障协议
//!
//! 一帧按固定顺序执行：
//!
//! ```text
//! reset → 取当前后台缓冲区 → Present→RenderTarget → 记录场景
//!       → RenderTarget→Present → close → execute → present → flush
//! ```
//!
//! 任一步失败时跳过剩余步骤并返回错误，下一帧从头开始。
//! 帧末的 flush 保证下一帧重置命令分配器时 GPU 已经用完它。
//! 命令列表提交后若 present 或 flush 失败，下一帧在 reset 之前先补一次 flush。

use std::time::Instant;

use tracing::{debug, trace, warn};

use super::sync::{CommandQueue, FenceValue};
use crate::core::error::{EngineError, Result};
use crate::gfx::backend::{GpuCommandList, GpuDevice, PresentSurface, ResourceState};

/// 传给场景绘制的帧信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    pub frame_number: u64,
    pub back_buffer_index: usize,
    /// 距上一帧的秒数
    pub delta_seconds: f32,
}

/// 一帧完成后的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub frame_number: u64,
    pub back_buffer_index: usize,
    /// 帧末 flush 等待的栅栏值
    pub fence_value: FenceValue,
}

/// 在两个屏障之间记录场景命令
///
/// 调用时后台缓冲区处于 `RenderTarget` 状态，返回时必须保持该状态。
pub trait FramePass<L, S> {
    fn record(&mut self, list: &mut L, surface: &S, frame: &FrameContext) -> Result<()>;
}

/// 帧循环状态
#[derive(Debug)]
pub struct FrameLoop {
    frame_number: u64,
    vsync: bool,
    last_frame: Instant,
    /// 已提交但尚未确认 GPU 执行完毕
    unflushed: bool,
}

impl FrameLoop {
    pub fn new(vsync: bool) -> Self {
        Self {
            frame_number: 0,
            vsync,
            last_frame: Instant::now(),
            unflushed: false,
        }
    }

    /// 已完成的帧数
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// 上一次提交的命令列表是否可能仍在 GPU 上执行
    pub fn has_unflushed_submission(&self) -> bool {
        self.unflushed
    }

    /// 执行一帧
    pub fn run_frame<D, S, P>(
        &mut self,
        queue: &mut CommandQueue<D>,
        list: &mut D::CommandList,
        surface: &S,
        pass: &mut P,
    ) -> Result<FrameReport>
    where
        D: GpuDevice,
        S: PresentSurface<Resource = D::Resource>,
        P: FramePass<D::CommandList, S>,
    {
        if self.unflushed {
            let recovered = queue.flush()?;
            debug!(fence_value = recovered.value(), "Flushed submission left by a failed frame");
            self.unflushed = false;
        }

        list.reset()?;

        let back_buffer_index = surface.current_back_buffer_index();
        let back_buffer = match surface.back_buffer(back_buffer_index) {
            Ok(buffer) => buffer,
            Err(e) => return Err(abandon(list, e)),
        };

        let now = Instant::now();
        let frame = FrameContext {
            frame_number: self.frame_number,
            back_buffer_index,
            delta_seconds: now.duration_since(self.last_frame).as_secs_f32(),
        };
        self.last_frame = now;

        list.transition(back_buffer, ResourceState::Present, ResourceState::RenderTarget);

        if let Err(e) = pass.record(list, surface, &frame) {
            return Err(abandon(list, e));
        }

        list.transition(back_buffer, ResourceState::RenderTarget, ResourceState::Present);
        list.close()?;

        queue.execute(list);
        self.unflushed = true;
        surface.present(self.vsync)?;
        let fence_value = queue.flush()?;
        self.unflushed = false;

        trace!(
            frame = frame.frame_number,
            back_buffer_index,
            fence_value = fence_value.value(),
            "Frame complete"
        );

        self.frame_number += 1;
        Ok(FrameReport {
            frame_number: frame.frame_number,
            back_buffer_index,
            fence_value,
        })
    }
}

/// 关闭未提交的命令列表，使下一帧可以正常重置
fn abandon<L: GpuCommandList>(list: &mut L, error: EngineError) -> EngineError {
    if let Err(close_error) = list.close() {
        warn!(error = %close_error, "Failed to close abandoned command list");
    }
    error
}
