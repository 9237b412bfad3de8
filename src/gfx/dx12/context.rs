//! DirectX 12 设备上下文
//!
//! # 初始化流程
//!
//! 1. 启用调试层和 GPU 验证（可配置，默认仅 Debug 构建）
//! 2. 创建 DXGI 工厂
//! 3. 按高性能偏好枚举第一个适配器
//! 4. 以功能级别 12.1 创建 D3D12 设备，不回退
//! 5. 查询 12.2（DirectX 12 Ultimate）支持情况，仅用于日志
//! 6. 调试模式下让信息队列在 corruption / error / warning 时中断

use std::ffi::c_void;
use std::mem;

use tracing::{debug, info, warn};
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::*;

use super::helpers::{call_failed, command_list_type};
use super::queue::{Dx12CommandList, Dx12Fence, Dx12Queue, FenceEvent};
use crate::core::error::{GraphicsError, Result, StatusCode};
use crate::gfx::backend::{GpuDevice, QueueKind};

/// DirectX 12 设备
pub struct Dx12Context {
    factory: IDXGIFactory6,
    device: ID3D12Device,
    tearing_supported: bool,
}

impl Dx12Context {
    pub fn new(debug_layer: bool) -> Result<Self> {
        if debug_layer {
            enable_debug_layer();
        }

        let factory_flags = if debug_layer {
            DXGI_CREATE_FACTORY_DEBUG
        } else {
            DXGI_CREATE_FACTORY_FLAGS(0)
        };
        let factory: IDXGIFactory6 =
            unsafe { CreateDXGIFactory2(factory_flags) }.map_err(call_failed("CreateDXGIFactory2"))?;

        let adapter: IDXGIAdapter1 =
            unsafe { factory.EnumAdapterByGpuPreference(0, DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE) }
                .map_err(call_failed("EnumAdapterByGpuPreference"))?;

        if let Ok(desc) = unsafe { adapter.GetDesc1() } {
            let len = desc.Description.iter().position(|&c| c == 0).unwrap_or(desc.Description.len());
            info!(
                adapter = %String::from_utf16_lossy(&desc.Description[..len]),
                dedicated_video_memory_mb = desc.DedicatedVideoMemory / (1024 * 1024),
                "Adapter selected"
            );
        }

        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_12_1, &mut device) }
            .map_err(call_failed("D3D12CreateDevice"))?;
        let device = device
            .ok_or_else(|| GraphicsError::device_call("D3D12CreateDevice", StatusCode::E_FAIL))?;
        debug!("D3D12 Device created successfully");

        log_ultimate_support(&device);

        if debug_layer {
            configure_info_queue(&device)?;
        }

        let tearing_supported = check_tearing_support(&factory);
        debug!(tearing_supported, "Tearing support queried");

        Ok(Self {
            factory,
            device,
            tearing_supported,
        })
    }

    pub fn device(&self) -> &ID3D12Device {
        &self.device
    }

    pub fn factory(&self) -> &IDXGIFactory6 {
        &self.factory
    }

    /// `DXGI_FEATURE_PRESENT_ALLOW_TEARING` 是否可用
    pub fn tearing_supported(&self) -> bool {
        self.tearing_supported
    }
}

fn enable_debug_layer() {
    let mut debug: Option<ID3D12Debug> = None;
    match unsafe { D3D12GetDebugInterface(&mut debug) } {
        Ok(()) => {
            if let Some(debug) = debug {
                unsafe { debug.EnableDebugLayer() };
                match debug.cast::<ID3D12Debug1>() {
                    Ok(debug1) => unsafe { debug1.SetEnableGPUBasedValidation(true) },
                    Err(e) => warn!(error = %e, "GPU-based validation unavailable"),
                }
                debug!("DX12 Debug Layer enabled");
            }
        }
        Err(e) => warn!(error = %e, "Failed to enable DX12 Debug Layer"),
    }
}

fn log_ultimate_support(device: &ID3D12Device) {
    let requested = [D3D_FEATURE_LEVEL_12_2];
    let mut levels = D3D12_FEATURE_DATA_FEATURE_LEVELS {
        NumFeatureLevels: requested.len() as u32,
        pFeatureLevelsRequested: requested.as_ptr(),
        MaxSupportedFeatureLevel: D3D_FEATURE_LEVEL_12_1,
    };

    let queried = unsafe {
        device.CheckFeatureSupport(
            D3D12_FEATURE_FEATURE_LEVELS,
            &mut levels as *mut _ as *mut c_void,
            mem::size_of::<D3D12_FEATURE_DATA_FEATURE_LEVELS>() as u32,
        )
    };

    if queried.is_ok() && levels.MaxSupportedFeatureLevel == D3D_FEATURE_LEVEL_12_2 {
        info!("DirectX 12 Ultimate Supported");
    } else {
        info!("DirectX 12 Ultimate Unsupported");
    }
}

fn configure_info_queue(device: &ID3D12Device) -> Result<()> {
    let info_queue: ID3D12InfoQueue = device.cast().map_err(call_failed("QueryInterface(ID3D12InfoQueue)"))?;

    for severity in [
        D3D12_MESSAGE_SEVERITY_CORRUPTION,
        D3D12_MESSAGE_SEVERITY_ERROR,
        D3D12_MESSAGE_SEVERITY_WARNING,
    ] {
        unsafe { info_queue.SetBreakOnSeverity(severity, true) }
            .map_err(call_failed("SetBreakOnSeverity"))?;
    }
    Ok(())
}

fn check_tearing_support(factory: &IDXGIFactory6) -> bool {
    let mut allow_tearing: i32 = 0;
    let result = unsafe {
        factory.CheckFeatureSupport(
            DXGI_FEATURE_PRESENT_ALLOW_TEARING,
            &mut allow_tearing as *mut i32 as *mut c_void,
            mem::size_of::<i32>() as u32,
        )
    };
    result.is_ok() && allow_tearing != 0
}

impl GpuDevice for Dx12Context {
    type Queue = Dx12Queue;
    type Fence = Dx12Fence;
    type Event = FenceEvent;
    type CommandList = Dx12CommandList;
    type Resource = ID3D12Resource;

    fn create_completion_event(&self) -> Result<FenceEvent> {
        FenceEvent::create()
    }

    fn create_command_queue(&self, kind: QueueKind) -> Result<Dx12Queue> {
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: command_list_type(kind),
            Priority: D3D12_COMMAND_QUEUE_PRIORITY_NORMAL.0,
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            NodeMask: 0,
        };
        let queue: ID3D12CommandQueue = unsafe { self.device.CreateCommandQueue(&desc) }
            .map_err(call_failed("CreateCommandQueue"))?;
        Ok(Dx12Queue::new(queue))
    }

    fn create_fence(&self, initial_value: u64) -> Result<Dx12Fence> {
        let fence: ID3D12Fence = unsafe { self.device.CreateFence(initial_value, D3D12_FENCE_FLAG_NONE) }
            .map_err(call_failed("CreateFence"))?;
        Ok(Dx12Fence::new(fence))
    }

    fn create_command_list(&self, kind: QueueKind) -> Result<Dx12CommandList> {
        let list_type = command_list_type(kind);

        let allocator: ID3D12CommandAllocator = unsafe { self.device.CreateCommandAllocator(list_type) }
            .map_err(call_failed("CreateCommandAllocator"))?;
        let list: ID3D12GraphicsCommandList =
            unsafe { self.device.CreateCommandList(0, list_type, &allocator, None) }
                .map_err(call_failed("CreateCommandList"))?;

        // 命令列表创建后处于录制状态，关闭后交给帧循环重置
        unsafe { list.Close() }.map_err(call_failed("ID3D12GraphicsCommandList::Close"))?;

        Ok(Dx12CommandList::new(allocator, list))
    }
}
