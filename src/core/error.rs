//! 错误处理模块
//!
//! 定义了引擎中使用的统一错误类型，使用 `thiserror` 提供友好的错误消息。
//!
//! # 错误分类
//!
//! - 操作系统句柄/资源创建失败（事件、窗口）：携带 Windows 错误码
//! - 图形 API 调用失败：携带数值状态码（HRESULT），根签名序列化失败时附带诊断信息
//! - 逻辑前置条件违反（引擎单例重复创建）：属于编程错误，见 `core::instance`
//!
//! 所有可失败的调用都返回类型化的错误，由最近的能够记录日志并中止当前操作
//! （一帧或一个启动阶段）的调用者处理，不做自动重试。

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::gfx::backend::ResourceState;

/// 引擎统一的 Result 类型
pub type Result<T> = std::result::Result<T, EngineError>;

/// 图形 API / 操作系统返回的原始状态码（HRESULT 语义）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub i32);

impl StatusCode {
    /// 通用失败（E_FAIL）
    pub const E_FAIL: StatusCode = StatusCode(0x8000_4005_u32 as i32);
    /// 参数无效（E_INVALIDARG）
    pub const E_INVALIDARG: StatusCode = StatusCode(0x8007_0057_u32 as i32);
    /// DXGI_ERROR_DEVICE_REMOVED
    pub const DEVICE_REMOVED: StatusCode = StatusCode(0x887A_0005_u32 as i32);
    /// DXGI_ERROR_DEVICE_HUNG
    pub const DEVICE_HUNG: StatusCode = StatusCode(0x887A_0006_u32 as i32);
    /// DXGI_ERROR_DEVICE_RESET
    pub const DEVICE_RESET: StatusCode = StatusCode(0x887A_0007_u32 as i32);

    /// 是否表示设备丢失（移除、挂起或重置）
    pub fn is_device_lost(&self) -> bool {
        matches!(
            *self,
            StatusCode::DEVICE_REMOVED | StatusCode::DEVICE_HUNG | StatusCode::DEVICE_RESET
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0 as u32)
    }
}

/// 引擎的错误类型
#[derive(Debug, Error)]
pub enum EngineError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 图形 API 错误
    #[error("Graphics error: {0}")]
    Graphics(#[from] GraphicsError),

    /// 窗口创建或消息循环错误
    #[error("Window error: {0}")]
    Window(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 初始化错误
    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl EngineError {
    /// 是否为设备丢失错误（会话内不可恢复）
    pub fn is_device_lost(&self) -> bool {
        match self {
            EngineError::Graphics(e) => e.is_device_lost(),
            _ => false,
        }
    }
}

/// 配置相关的错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件未找到
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    /// 配置文件解析失败
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// 配置值无效
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 图形 API 相关的错误
#[derive(Debug, Error)]
pub enum GraphicsError {
    /// 无法创建栅栏完成事件
    #[error("Failed to create fence completion event (os error {0})")]
    EventCreationFailed(StatusCode),

    /// 设备调用返回失败状态
    #[error("{call} failed with {code}")]
    DeviceCallFailed { call: &'static str, code: StatusCode },

    /// 等待原语报告失败（与超时区分）
    #[error("Waiting on fence completion event failed: {0}")]
    WaitFailed(String),

    /// 根签名序列化失败，附带诊断信息
    #[error("Root signature serialization failed with {code}: {message}")]
    RootSignature { code: StatusCode, message: String },

    /// 着色器二进制文件缺失
    #[error("Shader binary not found: {}", .0.display())]
    ShaderNotFound(PathBuf),

    /// 资源处于错误的状态
    #[error("Resource {resource} is in state {actual:?}, expected {expected:?}")]
    InvalidResourceState {
        resource: String,
        expected: ResourceState,
        actual: ResourceState,
    },

    /// 后台缓冲区索引越界
    #[error("Back buffer index {index} out of range (count {count})")]
    BackBufferOutOfRange { index: usize, count: usize },

    /// 当前平台不支持
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl GraphicsError {
    /// 构造设备调用失败错误
    pub fn device_call(call: &'static str, code: StatusCode) -> Self {
        GraphicsError::DeviceCallFailed { call, code }
    }

    /// 是否为设备丢失错误
    pub fn is_device_lost(&self) -> bool {
        match self {
            GraphicsError::DeviceCallFailed { code, .. } => code.is_device_lost(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_display() {
        assert_eq!(StatusCode::E_FAIL.to_string(), "0x80004005");
        assert_eq!(StatusCode(0).to_string(), "0x00000000");
    }

    #[test]
    fn test_device_lost_detection() {
        let lost: EngineError =
            GraphicsError::device_call("Present", StatusCode::DEVICE_REMOVED).into();
        assert!(lost.is_device_lost());

        let other: EngineError = GraphicsError::device_call("Signal", StatusCode::E_FAIL).into();
        assert!(!other.is_device_lost());

        let wait: EngineError = GraphicsError::WaitFailed("abandoned".to_string()).into();
        assert!(!wait.is_device_lost());
    }

    #[test]
    fn test_error_messages() {
        let err: EngineError =
            GraphicsError::device_call("CreateCommandQueue", StatusCode::E_INVALIDARG).into();
        assert_eq!(
            err.to_string(),
            "Graphics error: CreateCommandQueue failed with 0x80070057"
        );

        let err: EngineError = ConfigError::InvalidValue {
            field: "window.width".to_string(),
            reason: "must be greater than 0".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid value for 'window.width': must be greater than 0"
        );
    }
}
