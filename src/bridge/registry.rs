//! 会话注册表（组合根）
//!
//! 按 id 持有全部会话，共享同一个 AgentRuntime；worker 容量由 Semaphore 控制，
//! max_active_workers 为 0 时不限。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};

use crate::agent::AgentRuntime;
use crate::bridge::Session;
use crate::config::BridgeSection;
use crate::core::SessionInfo;

/// 会话 ID
pub type SessionId = String;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    runtime: Arc<AgentRuntime>,
    settings: BridgeSection,
    capacity: Option<Arc<Semaphore>>,
}

impl SessionRegistry {
    pub fn new(runtime: Arc<AgentRuntime>, settings: BridgeSection) -> Self {
        let capacity = match settings.max_active_workers {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        Self {
            sessions: RwLock::new(HashMap::new()),
            runtime,
            settings,
            capacity,
        }
    }

    /// 以随机 id 新建会话
    pub async fn create(&self) -> Arc<Session> {
        let id = format!("session_{}", uuid::Uuid::new_v4());
        self.get_or_create(&id).await
    }

    /// 获取或创建指定 id 的会话
    pub async fn get_or_create(&self, id: &str) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return session.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::info!(session = %id, "Session created");
                Arc::new(Session::new(
                    id,
                    self.runtime.clone(),
                    &self.settings,
                    self.capacity.clone(),
                ))
            })
            .clone()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// 移除会话并取消其 worker
    pub async fn reset(&self, id: &str) -> bool {
        match self.sessions.write().await.remove(id) {
            Some(session) => {
                session.restart();
                tracing::info!(session = %id, "Session removed");
                true
            }
            None => false,
        }
    }

    /// 关闭全部会话
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        for (_, session) in &drained {
            session.restart();
        }
        tracing::info!(sessions = drained.len(), "Session registry shut down");
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| s.info())
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// 剩余 worker 容量；不限时为 None
    pub fn available_workers(&self) -> Option<usize> {
        self.capacity.as_ref().map(|s| s.available_permits())
    }

    pub fn runtime(&self) -> &Arc<AgentRuntime> {
        &self.runtime
    }
}
