//! 引擎单实例令牌
//!
//! 同一时刻只允许存在一个引擎实例。`InstanceGuard` 是这一约束的显式令牌：
//! 构造 `Engine` 时必须传入，令牌被释放后才能再次获取。

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::error::{EngineError, Result};

static ENGINE_ALIVE: AtomicBool = AtomicBool::new(false);

/// 单实例令牌，Drop 时释放
#[derive(Debug)]
pub struct InstanceGuard {
    _private: (),
}

impl InstanceGuard {
    /// 获取令牌
    ///
    /// 已有实例存活时返回错误；Debug 构建下这是一次断言失败。
    pub fn acquire() -> Result<Self> {
        if ENGINE_ALIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug_assert!(false, "Only 1 engine instance can exist at a time");
            return Err(EngineError::Initialization(
                "Only 1 engine instance can exist at a time".to_string(),
            ));
        }

        debug!("Engine instance guard acquired");
        Ok(Self { _private: () })
    }

    /// 当前是否有实例存活
    pub fn is_held() -> bool {
        ENGINE_ALIVE.load(Ordering::Acquire)
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        ENGINE_ALIVE.store(false, Ordering::Release);
        debug!("Engine instance guard released");
    }
}

/// 串行化需要令牌的单元测试
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_released_on_drop() {
        let _lock = test_lock();

        let guard = InstanceGuard::acquire().unwrap();
        assert!(InstanceGuard::is_held());
        drop(guard);
        assert!(!InstanceGuard::is_held());

        let again = InstanceGuard::acquire();
        assert!(again.is_ok());
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "Only 1 engine instance"))]
    fn test_second_guard_rejected() {
        let _lock = test_lock();

        let _first = InstanceGuard::acquire().unwrap();
        let second = InstanceGuard::acquire();
        assert!(second.is_err());
    }
}
