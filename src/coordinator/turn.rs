//! 轮次协调器：会话 worker 内运行的协作式循环
//!
//! 唯一的挂起点是等待下一条用户输入；其余时间反复调用当前活跃智能体，处理转交、工具调用与文本回复，
//! 直到智能体声明本轮结束。每次回到挂起点前发布路由检查点，供会话导出。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentRuntime;
use crate::agents::{AgentContext, AgentDefinition, AgentResponse};
use crate::core::{BridgeError, CapabilityError, ProtocolError, RecoveryAction};
use crate::coordinator::{Checkpoint, RoutingState, TurnPhase};
use crate::memory::{ChatMessage, TranscriptWriter};

/// 协调器与会话桥之间的端口
#[async_trait]
pub trait HumanInput: Send {
    /// 挂起直到下一条用户输入到达；None 表示会话已结束
    async fn next_turn(&mut self) -> Option<String>;

    /// 发出一条非空智能体消息
    async fn emit(&mut self, message: ChatMessage);
}

/// 协调器
pub struct TurnCoordinator {
    runtime: Arc<AgentRuntime>,
    writer: TranscriptWriter,
    routing: RoutingState,
    checkpoints: Arc<watch::Sender<Option<Checkpoint>>>,
    cancel: CancellationToken,
}

impl TurnCoordinator {
    pub fn new(
        runtime: Arc<AgentRuntime>,
        writer: TranscriptWriter,
        routing: RoutingState,
        checkpoints: Arc<watch::Sender<Option<Checkpoint>>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            runtime,
            writer,
            routing,
            checkpoints,
            cancel,
        }
    }

    pub fn routing(&self) -> &RoutingState {
        &self.routing
    }

    /// 主循环；正常结束（输入关闭、被取消、句柄过期）返回 Ok，致命错误返回 Err
    pub async fn run<I: HumanInput>(&mut self, input: &mut I) -> Result<(), BridgeError> {
        loop {
            self.routing.phase = TurnPhase::AwaitingHuman;
            self.routing.observations.clear();
            if !self.publish_checkpoint() {
                return Ok(());
            }

            let Some(text) = input.next_turn().await else {
                tracing::debug!("Human input closed, coordinator stopping");
                return Ok(());
            };
            if self.cancel.is_cancelled() || self.writer.append(ChatMessage::user(text)).is_none() {
                return Ok(());
            }

            self.routing.turns += 1;
            self.routing.phase = TurnPhase::AgentActive;
            match self.run_turn(input).await {
                Ok(()) => {}
                Err(_) if self.cancel.is_cancelled() => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// 发布检查点；写入句柄已过期（会话已重启）时返回 false
    fn publish_checkpoint(&self) -> bool {
        let routing = self.routing.encode();
        self.writer
            .with_current(|transcript| {
                self.checkpoints.send_replace(Some(Checkpoint {
                    routing,
                    transcript_len: transcript.len(),
                }));
            })
            .is_some()
    }

    /// 处理一个用户轮次，直到智能体交还控制权
    async fn run_turn<I: HumanInput>(&mut self, input: &mut I) -> Result<(), BridgeError> {
        let roster = &self.runtime.roster;
        let max_steps = self.runtime.max_steps_per_turn;

        for _ in 0..max_steps {
            if self.cancel.is_cancelled() {
                return Err(CapabilityError::Interrupted.into());
            }

            let agent = roster
                .agent(&self.routing.active_agent)
                .ok_or_else(|| ProtocolError::UnknownAgent(self.routing.active_agent.clone()))?;
            let response = self.invoke_with_retry(&agent).await?;

            match response {
                AgentResponse::Text {
                    content,
                    turn_complete,
                } => {
                    if !content.trim().is_empty() {
                        let message = ChatMessage::assistant(content, agent.name.clone());
                        if self.writer.append(message.clone()).is_none() {
                            return Err(CapabilityError::Interrupted.into());
                        }
                        input.emit(message).await;
                    }
                    if turn_complete {
                        return Ok(());
                    }
                }
                AgentResponse::Handoff { target } => {
                    if target == agent.name {
                        tracing::debug!(agent = %agent.name, "Self handoff ignored");
                        continue;
                    }
                    if !roster.handoffs().allows(&agent.name, &target) {
                        return Err(ProtocolError::InvalidHandoff {
                            from: agent.name.clone(),
                            to: target,
                        }
                        .into());
                    }
                    tracing::info!(from = %agent.name, to = %target, "Handoff");
                    self.routing.active_agent = target;
                    self.routing.handoffs += 1;
                    self.routing.observations.clear();
                }
                AgentResponse::ToolCall { tool, arguments } => {
                    let observation = self
                        .runtime
                        .executor
                        .execute(&agent, &tool, arguments)
                        .await?;
                    self.routing.observations.push(observation);
                }
            }
        }

        Err(ProtocolError::StepLimitExceeded(max_steps).into())
    }

    /// 调用能力；瞬时错误按恢复引擎建议用同样输入重试
    async fn invoke_with_retry(&self, agent: &AgentDefinition) -> Result<AgentResponse, BridgeError> {
        let transcript = self.writer.snapshot();
        let ctx = AgentContext {
            agent,
            transcript: transcript.messages(),
            observations: &self.routing.observations,
            handoffs: self.runtime.roster.handoffs().targets(&agent.name),
        };
        let capability = &self.runtime.capability;

        let mut attempt = 0;
        loop {
            let result = if capability.interruptible() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(CapabilityError::Interrupted),
                    r = capability.invoke(ctx) => r,
                }
            } else {
                capability.invoke(ctx).await
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) => match self.runtime.recovery.on_capability_error(&e, attempt) {
                    RecoveryAction::RetrySameInput => {
                        tracing::warn!(agent = %agent.name, attempt, error = %e, "Transient capability error, retrying");
                        attempt += 1;
                    }
                    _ => return Err(e.into()),
                },
            }
        }
    }
}
