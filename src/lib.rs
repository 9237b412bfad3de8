//! mksv - 最小的 DirectX 12 渲染器骨架
//!
//! 绘制一个随时间旋转的彩色三角形。可复用的部分是基于栅栏的 GPU 命令队列同步
//! （signal / wait / flush）和交换链上每帧的资源状态转换协议。
//!
//! # 模块结构
//!
//! - `core`：配置、日志、错误处理、键盘、窗口
//! - `gfx`：图形后端抽象，DirectX 12 后端（Windows）和软件后端
//! - `renderer`：与后端无关的同步和帧循环
//! - `engine`：拥有所有对象并驱动每一帧
//!
//! # 使用示例
//!
//! ```no_run
//! use mksv::core::InstanceGuard;
//! use mksv::gfx::headless::HeadlessOptions;
//! use mksv::HeadlessEngine;
//!
//! let guard = InstanceGuard::acquire()?;
//! let mut engine = HeadlessEngine::headless(guard, HeadlessOptions::default(), false)?;
//! let report = engine.update()?;
//! println!("frame {} presented buffer {}", report.frame_number, report.back_buffer_index);
//! # Ok::<(), mksv::core::EngineError>(())
//! ```

pub mod core;
pub mod engine;
pub mod gfx;
pub mod renderer;

pub use engine::{Engine, HeadlessEngine};
