//! 智能体能力抽象
//!
//! 模型调用本身对桥接层不透明：给定智能体定义与完整会话记录，返回一个带标签的 AgentResponse。
//! 所有后端（真实模型 / Mock / 测试脚本）实现 AgentCapability。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::{AgentDefinition, HandoffRule};
use crate::core::CapabilityError;
use crate::memory::{AgentName, ChatMessage};

/// 智能体的一次响应
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentResponse {
    /// 文本回复；turn_complete 为 true 表示本轮交还给用户
    Text { content: String, turn_complete: bool },
    /// 转交给另一个智能体
    Handoff { target: AgentName },
    /// 调用工具，结果作为本轮观察再交给同一智能体
    ToolCall { tool: String, arguments: Value },
}

impl AgentResponse {
    /// 完成本轮的文本回复
    pub fn reply(content: impl Into<String>) -> Self {
        AgentResponse::Text {
            content: content.into(),
            turn_complete: true,
        }
    }

    /// 不结束本轮的中间文本（如转交前的说明）
    pub fn interim(content: impl Into<String>) -> Self {
        AgentResponse::Text {
            content: content.into(),
            turn_complete: false,
        }
    }

    pub fn handoff(target: impl Into<AgentName>) -> Self {
        AgentResponse::Handoff {
            target: target.into(),
        }
    }

    pub fn tool_call(tool: impl Into<String>, arguments: Value) -> Self {
        AgentResponse::ToolCall {
            tool: tool.into(),
            arguments,
        }
    }
}

/// 工具调用的观察结果（仅在当前轮内可见）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolObservation {
    pub tool: String,
    pub ok: bool,
    pub output: String,
}

/// 一次调用的上下文
#[derive(Clone, Copy, Debug)]
pub struct AgentContext<'a> {
    pub agent: &'a AgentDefinition,
    /// 完整会话记录
    pub transcript: &'a [ChatMessage],
    /// 本轮已产生的工具观察
    pub observations: &'a [ToolObservation],
    /// 当前智能体可转交的目标
    pub handoffs: &'a [HandoffRule],
}

impl<'a> AgentContext<'a> {
    /// 最近一条用户消息
    pub fn last_user_message(&self) -> Option<&'a str> {
        self.transcript
            .iter()
            .rev()
            .find(|m| m.role == crate::memory::Role::User)
            .map(|m| m.content.as_str())
    }
}

/// 智能体能力：同步于 worker 视角的一次调用
#[async_trait]
pub trait AgentCapability: Send + Sync {
    async fn invoke(&self, ctx: AgentContext<'_>) -> Result<AgentResponse, CapabilityError>;

    /// 是否支持被取消打断；不支持时 restart 只会分离旧 worker
    fn interruptible(&self) -> bool {
        false
    }
}
