//! DXGI 交换链和渲染目标视图

use std::ffi::c_void;

use tracing::info;
use windows::core::Interface;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use winit::window::Window;

use super::context::Dx12Context;
use super::helpers::call_failed;
use super::queue::Dx12Queue;
use crate::core::error::{EngineError, GraphicsError, Result};
use crate::gfx::backend::{PresentSurface, BACK_BUFFER_COUNT};

/// 交换链格式
pub const BACK_BUFFER_FORMAT: DXGI_FORMAT = DXGI_FORMAT_R8G8B8A8_UNORM;

/// 三缓冲的 flip-discard 交换链
pub struct Dx12SwapChain {
    swap_chain: IDXGISwapChain4,
    buffers: Vec<ID3D12Resource>,
    rtv_heap: ID3D12DescriptorHeap,
    rtv_descriptor_size: usize,
    tearing_supported: bool,
    width: u32,
    height: u32,
}

impl Dx12SwapChain {
    pub fn new(context: &Dx12Context, queue: &Dx12Queue, window: &Window) -> Result<Self> {
        let size = window.inner_size();
        let (width, height) = (size.width, size.height);
        let hwnd = window_hwnd(window)?;
        let tearing_supported = context.tearing_supported();

        let desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: width,
            Height: height,
            Format: BACK_BUFFER_FORMAT,
            Stereo: false.into(),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: BACK_BUFFER_COUNT as u32,
            Scaling: DXGI_SCALING_STRETCH,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            AlphaMode: DXGI_ALPHA_MODE_UNSPECIFIED,
            Flags: if tearing_supported {
                DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING.0 as u32
            } else {
                0
            },
        };

        let factory = context.factory();
        let swap_chain: IDXGISwapChain1 =
            unsafe { factory.CreateSwapChainForHwnd(queue.raw(), hwnd, &desc, None, None) }
                .map_err(call_failed("CreateSwapChainForHwnd"))?;
        unsafe { factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER) }
            .map_err(call_failed("MakeWindowAssociation"))?;
        let swap_chain: IDXGISwapChain4 = swap_chain
            .cast()
            .map_err(call_failed("QueryInterface(IDXGISwapChain4)"))?;

        let device = context.device();
        let heap_desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
            NumDescriptors: BACK_BUFFER_COUNT as u32,
            Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
            NodeMask: 0,
        };
        let rtv_heap: ID3D12DescriptorHeap = unsafe { device.CreateDescriptorHeap(&heap_desc) }
            .map_err(call_failed("CreateDescriptorHeap"))?;
        let rtv_descriptor_size =
            unsafe { device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV) } as usize;

        let mut buffers = Vec::with_capacity(BACK_BUFFER_COUNT);
        let mut handle = unsafe { rtv_heap.GetCPUDescriptorHandleForHeapStart() };
        for i in 0..BACK_BUFFER_COUNT {
            let buffer: ID3D12Resource = unsafe { swap_chain.GetBuffer(i as u32) }
                .map_err(call_failed("IDXGISwapChain::GetBuffer"))?;
            unsafe { device.CreateRenderTargetView(&buffer, None, handle) };
            handle.ptr += rtv_descriptor_size;
            buffers.push(buffer);
        }

        info!(width, height, buffers = BACK_BUFFER_COUNT, tearing_supported, "Swap chain created");

        Ok(Self {
            swap_chain,
            buffers,
            rtv_heap,
            rtv_descriptor_size,
            tearing_supported,
            width,
            height,
        })
    }

    /// 第 `index` 个后台缓冲区的 RTV
    pub fn rtv_handle(&self, index: usize) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        let start = unsafe { self.rtv_heap.GetCPUDescriptorHandleForHeapStart() };
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: start.ptr + index * self.rtv_descriptor_size,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl PresentSurface for Dx12SwapChain {
    type Resource = ID3D12Resource;

    fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn current_back_buffer_index(&self) -> usize {
        unsafe { self.swap_chain.GetCurrentBackBufferIndex() as usize }
    }

    fn back_buffer(&self, index: usize) -> Result<&ID3D12Resource> {
        self.buffers.get(index).ok_or_else(|| {
            GraphicsError::BackBufferOutOfRange {
                index,
                count: self.buffers.len(),
            }
            .into()
        })
    }

    fn present(&self, vsync: bool) -> Result<()> {
        let sync_interval = if vsync { 1 } else { 0 };
        let flags = if !vsync && self.tearing_supported {
            DXGI_PRESENT_ALLOW_TEARING
        } else {
            DXGI_PRESENT(0)
        };

        unsafe { self.swap_chain.Present(sync_interval, flags) }
            .ok()
            .map_err(call_failed("Present"))
    }
}

fn window_hwnd(window: &Window) -> Result<HWND> {
    let handle = window
        .window_handle()
        .map_err(|e| EngineError::Window(format!("Failed to get window handle: {}", e)))?;

    match handle.as_raw() {
        RawWindowHandle::Win32(win32) => Ok(HWND(win32.hwnd.get() as *mut c_void)),
        _ => Err(GraphicsError::Unsupported("Expected Win32 window handle".to_string()).into()),
    }
}
