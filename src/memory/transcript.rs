//! 会话记录：只追加的有序消息序列
//!
//! 插入顺序即对话顺序，导出 / 导入时必须原样往返；调用方只能拿到快照副本。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// 智能体名称
pub type AgentName = String;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条消息；追加后不可变
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// 产出该消息的智能体（用户消息为 None）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produced_by: Option<AgentName>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            produced_by: None,
        }
    }

    pub fn assistant(content: impl Into<String>, agent: impl Into<AgentName>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            produced_by: Some(agent.into()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            produced_by: None,
        }
    }
}

/// 会话记录
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: ChatMessage) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 前 n 条消息组成的新记录（用于与路由检查点对齐）
    pub fn prefix(&self, n: usize) -> Self {
        Self {
            messages: self.messages[..n.min(self.messages.len())].to_vec(),
        }
    }

    /// 渲染为 "role: content" 行；无记录时返回 None
    pub fn render(&self) -> Option<String> {
        if self.messages.is_empty() {
            return None;
        }
        Some(
            self.messages
                .iter()
                .map(|m| format!("{}: {}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

impl From<Vec<ChatMessage>> for Transcript {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }
}

impl IntoIterator for Transcript {
    type Item = ChatMessage;
    type IntoIter = std::vec::IntoIter<ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

/// 会话共享的记录存储；后台 worker 通过带纪元的写入句柄追加
#[derive(Clone, Debug, Default)]
pub struct SharedTranscript {
    inner: Arc<RwLock<Transcript>>,
    epoch: Arc<AtomicU64>,
}

impl SharedTranscript {
    pub fn new(transcript: Transcript) -> Self {
        Self {
            inner: Arc::new(RwLock::new(transcript)),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 快照副本，读者永远不会与 worker 的追加竞争
    pub fn snapshot(&self) -> Transcript {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 整体替换；调用方保证此时没有 worker 在运行
    pub fn replace(&self, transcript: Transcript) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = transcript;
    }

    /// 使旧 worker 的写入句柄失效，返回新纪元的写入句柄
    pub fn next_writer(&self) -> TranscriptWriter {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        TranscriptWriter {
            shared: self.clone(),
            epoch,
        }
    }

    /// 作废所有现存写入句柄（重启时调用）；持写锁，与旧 worker 正在进行的写入互斥
    pub fn revoke_writers(&self) {
        let _guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

/// 单个 worker 持有的写入句柄；纪元过期后的写入被丢弃
#[derive(Clone, Debug)]
pub struct TranscriptWriter {
    shared: SharedTranscript,
    epoch: u64,
}

impl TranscriptWriter {
    pub fn is_current(&self) -> bool {
        self.shared.epoch.load(Ordering::SeqCst) == self.epoch
    }

    /// 追加一条消息，返回追加后的长度；写入句柄已过期时返回 None
    pub fn append(&self, msg: ChatMessage) -> Option<usize> {
        let mut guard = self
            .shared
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !self.is_current() {
            tracing::debug!(epoch = self.epoch, "Dropping transcript write from stale worker");
            return None;
        }
        guard.push(msg);
        Some(guard.len())
    }

    pub fn snapshot(&self) -> Transcript {
        self.shared.snapshot()
    }

    /// 持读锁且句柄仍有效时执行 f；用于与记录长度原子地发布检查点
    pub fn with_current<R>(&self, f: impl FnOnce(&Transcript) -> R) -> Option<R> {
        let guard = self
            .shared
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !self.is_current() {
            return None;
        }
        Some(f(&guard))
    }
}
