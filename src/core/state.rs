//! 状态定义：会话生命周期标志与对外投影
//!
//! SessionState 以原子量保存，调用方线程无需加锁即可读取；启动 worker 通过 CAS 抢占（Idle → Running），
//! 保证任意时刻至多一个调用方赢得启动权。

use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 会话生命周期
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Running,
    Faulted,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionState::Running,
            2 => SessionState::Faulted,
            _ => SessionState::Idle,
        }
    }
}

/// 原子会话状态
#[derive(Debug)]
pub struct AtomicSessionState(AtomicU8);

impl AtomicSessionState {
    pub fn new() -> Self {
        Self(AtomicU8::new(SessionState::Idle as u8))
    }

    pub fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// 抢占启动权：仅当当前为 Idle 时成功
    pub fn claim(&self) -> bool {
        self.0
            .compare_exchange(
                SessionState::Idle as u8,
                SessionState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Running → Faulted；其它状态下不变（重启后旧 worker 的故障不会污染新会话）
    pub fn fault(&self) -> bool {
        self.0
            .compare_exchange(
                SessionState::Running as u8,
                SessionState::Faulted as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn reset(&self) {
        self.0.store(SessionState::Idle as u8, Ordering::Release);
    }
}

impl Default for AtomicSessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// 会话对外投影（日志 / 状态查询用）
#[derive(Clone, Debug, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub state: SessionState,
    pub transcript_len: usize,
    pub has_routing_state: bool,
    pub fault: Option<String>,
    pub created_at: DateTime<Utc>,
}
