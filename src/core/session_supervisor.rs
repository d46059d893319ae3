//! 会话监管：worker 的取消令牌
//!
//! 每个 worker 持有自己那一代的 CancellationToken；restart 时取消旧令牌并换新，
//! 旧 worker 在挂起点（等待下一轮用户输入）观察到取消后退出。

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

/// 会话级取消管理
#[derive(Debug)]
pub struct SessionSupervisor {
    cancel_token: Mutex<CancellationToken>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: Mutex::new(CancellationToken::new()),
        }
    }

    /// 当前这一代的令牌
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 取消当前 worker 并换上新令牌，返回新令牌
    pub fn renew(&self) -> CancellationToken {
        let mut guard = self
            .cancel_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.cancel();
        *guard = CancellationToken::new();
        guard.clone()
    }

    /// 取消当前 worker（关闭会话时）
    pub fn cancel(&self) {
        self.cancel_token().cancel();
    }

    /// 子令牌：随当前这一代一起取消（用于 flush 定时器等附属任务）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token().child_token()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renew_cancels_previous_generation() {
        let supervisor = SessionSupervisor::new();
        let old = supervisor.cancel_token();
        let child = supervisor.child_token();
        let fresh = supervisor.renew();
        assert!(old.is_cancelled());
        assert!(child.is_cancelled());
        assert!(!fresh.is_cancelled());
        assert!(!supervisor.cancel_token().is_cancelled());
    }
}
