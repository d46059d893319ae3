//! 错误类型
//!
//! 协议错误（非法 handoff、未知工具、格式错误的智能体响应）致命；能力错误按 is_transient 决定是否重试；
//! BridgeError 是会话对外暴露的统一错误，可 Clone，以便 Faulted 会话反复返回同一个错误。

use thiserror::Error;

use crate::memory::SnapshotError;

/// 智能体协议错误：一律致命，会话进入 Faulted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("agent '{from}' handed off to '{to}', which is not a declared target")]
    InvalidHandoff { from: String, to: String },

    #[error("agent '{agent}' called tool '{tool}' outside its tool set")]
    UnknownTool { agent: String, tool: String },

    #[error("unknown agent '{0}'")]
    UnknownAgent(String),

    #[error("malformed agent response: {0}")]
    MalformedResponse(String),

    #[error("turn exceeded {0} agent steps without yielding to the user")]
    StepLimitExceeded(usize),
}

/// 智能体能力调用错误（模型后端失败等）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("agent call timed out: {0}")]
    Timeout(String),

    #[error("agent backend unavailable: {0}")]
    Unavailable(String),

    #[error("agent call failed: {0}")]
    Failed(String),

    #[error("agent call interrupted")]
    Interrupted,
}

impl CapabilityError {
    /// 瞬时错误可用相同输入重试一次
    pub fn is_transient(&self) -> bool {
        matches!(self, CapabilityError::Timeout(_) | CapabilityError::Unavailable(_))
    }
}

/// 会话桥对调用方暴露的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("no worker capacity available")]
    Busy,

    #[error("session has no routing state yet; send a message first")]
    NotRunning,

    #[error("rejected: a worker is running for this session")]
    WorkerRunning,

    #[error("invalid snapshot: {0}")]
    InvalidFormat(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("session faulted ({0}); call restart() and retry")]
    Faulted(Box<BridgeError>),

    #[error("worker stopped before replying")]
    WorkerStopped,
}

impl BridgeError {
    /// 包装为 Faulted；已是 Faulted 时原样返回
    pub fn into_fault(self) -> Self {
        match self {
            BridgeError::Faulted(_) => self,
            other => BridgeError::Faulted(Box::new(other)),
        }
    }

    /// 去掉 Faulted 包装后的根因
    pub fn root_cause(&self) -> &BridgeError {
        match self {
            BridgeError::Faulted(inner) => inner.root_cause(),
            other => other,
        }
    }
}

impl From<SnapshotError> for BridgeError {
    fn from(err: SnapshotError) -> Self {
        BridgeError::InvalidFormat(err.to_string())
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 用同样的输入再调用一次
    RetrySameInput,
    /// 重启会话 worker 后重放消息
    RestartSession,
    /// 直接交给调用方
    Surface,
}
