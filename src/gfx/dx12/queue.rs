//! D3D12 队列、栅栏、完成事件和命令列表

use std::time::Duration;

use tracing::warn;
use windows::Win32::Foundation::{CloseHandle, GetLastError, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};

use super::helpers::{call_failed, status, transition_barrier};
use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{
    CompletionEvent, GpuCommandList, GpuFence, GpuQueue, ResourceState, WaitStatus,
};

/// 拥有所有权的自动重置事件句柄，Drop 时关闭
#[derive(Debug)]
pub struct FenceEvent(HANDLE);

impl FenceEvent {
    pub fn create() -> Result<Self> {
        // SAFETY: 无名、默认安全属性的自动重置事件
        let handle = unsafe { CreateEventW(None, false, false, None) }
            .map_err(|e| GraphicsError::EventCreationFailed(status(&e)))?;
        Ok(Self(handle))
    }

    pub fn handle(&self) -> HANDLE {
        self.0
    }
}

impl Drop for FenceEvent {
    fn drop(&mut self) {
        // SAFETY: 句柄由本对象独占
        if let Err(e) = unsafe { CloseHandle(self.0) } {
            warn!(error = %e, "Failed to close fence event handle");
        }
    }
}

impl CompletionEvent for FenceEvent {
    fn wait(&self, timeout: Option<Duration>) -> Result<WaitStatus> {
        let millis = match timeout {
            None => INFINITE,
            Some(timeout) => timeout.as_millis().min((INFINITE - 1) as u128) as u32,
        };

        // SAFETY: 句柄在 self 存活期间有效
        let result = unsafe { WaitForSingleObject(self.0, millis) };
        match result {
            WAIT_OBJECT_0 => Ok(WaitStatus::Signaled),
            WAIT_TIMEOUT => Ok(WaitStatus::TimedOut),
            other => {
                let last_error = unsafe { GetLastError() };
                Err(GraphicsError::WaitFailed(format!(
                    "WaitForSingleObject returned 0x{:08X} (last error {})",
                    other.0, last_error.0
                ))
                .into())
            }
        }
    }
}

pub struct Dx12Fence(ID3D12Fence);

impl Dx12Fence {
    pub(super) fn new(fence: ID3D12Fence) -> Self {
        Self(fence)
    }
}

impl GpuFence for Dx12Fence {
    type Event = FenceEvent;

    fn completed_value(&self) -> u64 {
        unsafe { self.0.GetCompletedValue() }
    }

    fn set_event_on_completion(&self, value: u64, event: &FenceEvent) -> Result<()> {
        unsafe { self.0.SetEventOnCompletion(value, event.handle()) }
            .map_err(call_failed("SetEventOnCompletion"))
    }
}

pub struct Dx12Queue(ID3D12CommandQueue);

impl Dx12Queue {
    pub(super) fn new(queue: ID3D12CommandQueue) -> Self {
        Self(queue)
    }

    /// 原始队列（交换链创建需要）
    pub fn raw(&self) -> &ID3D12CommandQueue {
        &self.0
    }
}

impl GpuQueue for Dx12Queue {
    type Fence = Dx12Fence;
    type CommandList = Dx12CommandList;

    fn execute(&self, command_list: &Dx12CommandList) {
        let lists = [Some(command_list.raw().clone().into())];
        unsafe { self.0.ExecuteCommandLists(&lists) };
    }

    fn signal(&self, fence: &Dx12Fence, value: u64) -> Result<()> {
        unsafe { self.0.Signal(&fence.0, value) }.map_err(call_failed("Signal"))
    }
}

/// 命令分配器 + 图形命令列表
pub struct Dx12CommandList {
    allocator: ID3D12CommandAllocator,
    list: ID3D12GraphicsCommandList,
}

impl Dx12CommandList {
    pub(super) fn new(allocator: ID3D12CommandAllocator, list: ID3D12GraphicsCommandList) -> Self {
        Self { allocator, list }
    }

    pub fn raw(&self) -> &ID3D12GraphicsCommandList {
        &self.list
    }
}

impl GpuCommandList for Dx12CommandList {
    type Resource = ID3D12Resource;

    fn reset(&mut self) -> Result<()> {
        unsafe { self.allocator.Reset() }.map_err(call_failed("ID3D12CommandAllocator::Reset"))?;
        unsafe { self.list.Reset(&self.allocator, None) }
            .map_err(call_failed("ID3D12GraphicsCommandList::Reset"))
    }

    fn transition(&mut self, resource: &ID3D12Resource, before: ResourceState, after: ResourceState) {
        let barrier = transition_barrier(resource, before, after);
        unsafe { self.list.ResourceBarrier(&[barrier]) };
    }

    fn close(&mut self) -> Result<()> {
        unsafe { self.list.Close() }.map_err(call_failed("ID3D12GraphicsCommandList::Close"))
    }
}
