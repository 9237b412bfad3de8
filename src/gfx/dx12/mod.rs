//! DirectX 12 图形后端
//!
//! - `context`：DXGI 工厂、适配器和 D3D12 设备
//! - `queue`：命令队列、栅栏、完成事件和命令列表
//! - `swapchain`：三缓冲交换链和 RTV 描述符堆
//! - `pipeline`：根签名、管线状态和顶点缓冲区上传
//! - `renderer`：三角形绘制和引擎组装

pub mod context;
pub mod helpers;
pub mod pipeline;
pub mod queue;
pub mod renderer;
pub mod swapchain;

pub use context::Dx12Context;
pub use renderer::{Dx12Engine, Dx12Setup, TrianglePass};
pub use swapchain::Dx12SwapChain;
