//! 路由状态：当前活跃智能体、轮次阶段、计数与本轮工具观察
//!
//! 以 JSON 字节的形式交给会话桥保存；桥接层只当作不透明数据，解释权在 Coordinator。

use serde::{Deserialize, Serialize};

use crate::agents::{Roster, ToolObservation};
use crate::core::ProtocolError;
use crate::memory::AgentName;

/// 轮次状态机
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    AwaitingHuman,
    AgentActive,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingState {
    pub active_agent: AgentName,
    pub phase: TurnPhase,
    /// 已处理的用户轮数
    pub turns: u64,
    /// 累计转交次数
    pub handoffs: u64,
    /// 本轮工具观察，轮次结束时清空
    #[serde(default)]
    pub observations: Vec<ToolObservation>,
}

impl RoutingState {
    pub fn new(orchestrator: impl Into<AgentName>) -> Self {
        Self {
            active_agent: orchestrator.into(),
            phase: TurnPhase::AwaitingHuman,
            turns: 0,
            handoffs: 0,
            observations: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        // 仅含字符串与整数的结构体序列化不会失败
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// 解码并校验活跃智能体仍在阵容中
    pub fn decode(bytes: &[u8], roster: &Roster) -> Result<Self, ProtocolError> {
        let state: RoutingState = serde_json::from_slice(bytes)
            .map_err(|e| ProtocolError::MalformedResponse(format!("routing state: {e}")))?;
        if roster.agent(&state.active_agent).is_none() {
            return Err(ProtocolError::UnknownAgent(state.active_agent));
        }
        Ok(state)
    }

    /// 故障恢复：控制权交回编排智能体，丢弃未完成轮次的观察
    pub fn recover(&mut self, orchestrator: &str) {
        self.active_agent = orchestrator.to_string();
        self.phase = TurnPhase::AwaitingHuman;
        self.observations.clear();
    }
}

/// 在挂起点发布的检查点：路由字节与当时的记录长度，二者一起导出保证一致
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    pub routing: Vec<u8>,
    pub transcript_len: usize,
}
