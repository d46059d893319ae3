//! 记忆层：会话记录与快照编解码

pub mod snapshot;
pub mod transcript;

pub use snapshot::{SessionSnapshot, SnapshotError};
pub use transcript::{AgentName, ChatMessage, Role, SharedTranscript, Transcript, TranscriptWriter};
