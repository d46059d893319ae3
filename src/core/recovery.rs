//! 错误恢复引擎
//!
//! 将错误映射为 RecoveryAction：Turn Coordinator 用它决定能力错误是否重试，
//! Session::send_with_recovery 用它决定是否重启会话后重放消息。

use crate::core::{BridgeError, CapabilityError, RecoveryAction};

/// 语义化错误恢复
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    /// 瞬时能力错误的重试次数
    capability_retries: u32,
}

impl RecoveryEngine {
    pub fn new(capability_retries: u32) -> Self {
        Self { capability_retries }
    }

    /// attempt 从 0 开始，表示已经重试过的次数
    pub fn on_capability_error(&self, err: &CapabilityError, attempt: u32) -> RecoveryAction {
        if err.is_transient() && attempt < self.capability_retries {
            RecoveryAction::RetrySameInput
        } else {
            RecoveryAction::Surface
        }
    }

    /// send 失败后调用方应采取的动作
    pub fn on_send_error(&self, err: &BridgeError) -> RecoveryAction {
        match err.root_cause() {
            BridgeError::Protocol(_) | BridgeError::Capability(_) | BridgeError::WorkerStopped => {
                RecoveryAction::RestartSession
            }
            _ => RecoveryAction::Surface,
        }
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProtocolError;

    #[test]
    fn test_transient_retried_once() {
        let engine = RecoveryEngine::default();
        let err = CapabilityError::Timeout("slow".into());
        assert_eq!(engine.on_capability_error(&err, 0), RecoveryAction::RetrySameInput);
        assert_eq!(engine.on_capability_error(&err, 1), RecoveryAction::Surface);
    }

    #[test]
    fn test_permanent_capability_error_not_retried() {
        let engine = RecoveryEngine::default();
        let err = CapabilityError::Failed("bad key".into());
        assert_eq!(engine.on_capability_error(&err, 0), RecoveryAction::Surface);
    }

    #[test]
    fn test_fault_triggers_restart() {
        let engine = RecoveryEngine::default();
        let err = BridgeError::Protocol(ProtocolError::MalformedResponse("{".into())).into_fault();
        assert_eq!(engine.on_send_error(&err), RecoveryAction::RestartSession);
    }

    #[test]
    fn test_caller_errors_surface() {
        let engine = RecoveryEngine::default();
        assert_eq!(engine.on_send_error(&BridgeError::Busy), RecoveryAction::Surface);
        assert_eq!(
            engine.on_send_error(&BridgeError::InvalidFormat("x".into())),
            RecoveryAction::Surface
        );
    }
}
