//! 核心功能模块
//!
//! 与具体图形 API 无关的基础设施。
//!
//! # 模块组织
//!
//! - `config`：配置管理，从 TOML 文件和命令行参数加载
//! - `error`：统一的错误类型
//! - `log`：基于 tracing 的日志系统
//! - `instance`：引擎单实例令牌
//! - `keycodes` / `keyboard`：虚拟键码和键盘状态表
//! - `window`：窗口创建和消息转发

pub mod config;
pub mod error;
pub mod instance;
pub mod keyboard;
pub mod keycodes;
pub mod log;
pub mod window;

// 重新导出常用类型，方便使用
pub use config::Config;
pub use error::{EngineError, Result};
pub use instance::InstanceGuard;
pub use keyboard::{KeyFlags, KeyState, Keyboard};
pub use keycodes::Key;
pub use window::{WindowEventSink, WindowMessage};
