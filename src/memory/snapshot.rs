//! 会话快照编解码
//!
//! 导出：{transcript, routing} → JSON → 可选 zlib 压缩 → 标准 base64 文本。
//! 导入严格逆序；任一步失败整体拒绝，调用方不会装载半解码的状态。

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::Transcript;

/// 当前快照格式版本
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("zlib stream failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("snapshot payload malformed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("unsupported snapshot version {0}")]
    Version(u32),
}

/// 可持久化的会话状态：记录 + 不透明的路由状态
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub transcript: Transcript,
    /// 路由状态字节，由 Turn Coordinator 解释，桥接层不查看
    #[serde(with = "routing_bytes")]
    pub routing: Vec<u8>,
}

impl SessionSnapshot {
    pub fn new(transcript: Transcript, routing: Vec<u8>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            transcript,
            routing,
        }
    }
}

/// 编码为传输安全文本；compress 为 true 时先做 zlib 压缩
pub fn encode(snapshot: &SessionSnapshot, compress: bool) -> Result<String, SnapshotError> {
    let json = serde_json::to_vec(snapshot)?;
    let bytes = if compress {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        encoder.finish()?
    } else {
        json
    };
    Ok(STANDARD.encode(bytes))
}

/// encode 的逆过程
pub fn decode(data: &str, compressed: bool) -> Result<SessionSnapshot, SnapshotError> {
    let raw = STANDARD.decode(data.trim().as_bytes())?;
    let json = if compressed {
        let mut out = Vec::new();
        ZlibDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
        out
    } else {
        raw
    };
    let snapshot: SessionSnapshot = serde_json::from_slice(&json)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::Version(snapshot.version));
    }
    Ok(snapshot)
}

/// 路由字节在 JSON 中以 base64 字符串保存
mod routing_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
