//! 核心层：错误与恢复、会话状态、取消监管

pub mod error;
pub mod recovery;
pub mod session_supervisor;
pub mod state;

pub use error::{BridgeError, CapabilityError, ProtocolError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use state::{AtomicSessionState, SessionInfo, SessionState};
