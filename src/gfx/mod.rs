//! 图形后端模块
//!
//! - `backend`：后端抽象 trait 和共享类型
//! - `headless`：进程内软件后端，任何平台可用
//! - `dx12`：DirectX 12 后端（仅 Windows）

pub mod backend;
pub mod headless;
#[cfg(target_os = "windows")]
pub mod dx12;

pub use backend::{QueueKind, ResourceState};
pub use headless::HeadlessDevice;
