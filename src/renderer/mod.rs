//! 渲染器模块
//!
//! 与具体图形 API 无关的渲染逻辑，全部建立在 `gfx::backend` 的 trait 之上：
//!
//! - `sync`：命令队列与栅栏同步（signal / wait / flush）
//! - `frame`：每帧的屏障协议和帧循环
//! - `scene`：场景动画时钟（清屏颜色、模型矩阵）
//! - `vertex`：顶点格式和三角形数据
//! - `shaders`：预编译着色器加载

pub mod frame;
pub mod scene;
pub mod shaders;
pub mod sync;
pub mod vertex;

pub use frame::{FrameContext, FrameLoop, FramePass, FrameReport};
pub use scene::SceneClock;
pub use sync::{CommandQueue, FenceValue};
