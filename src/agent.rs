//! 智能体运行时
//!
//! 所有会话共享的只读组件：阵容（注册表 + handoff 表）、能力后端、工具执行器与恢复引擎。
//! create_runtime 按配置组装，并在启动时校验每个智能体声明的工具都已注册。

use std::sync::Arc;

use crate::agents::{AgentCapability, RegistryError, Roster};
use crate::config::AppConfig;
use crate::core::RecoveryEngine;
use crate::tools::{DocumentRetriever, DocumentSearchTool, LightStore, LightTool, ToolExecutor, ToolRegistry};

/// 预构建的运行时组件，可多会话共享
pub struct AgentRuntime {
    pub roster: Roster,
    pub capability: Arc<dyn AgentCapability>,
    pub executor: ToolExecutor,
    pub recovery: RecoveryEngine,
    /// 单轮内智能体调用步数上限
    pub max_steps_per_turn: usize,
}

impl AgentRuntime {
    pub fn new(
        roster: Roster,
        capability: Arc<dyn AgentCapability>,
        executor: ToolExecutor,
        recovery: RecoveryEngine,
        max_steps_per_turn: usize,
    ) -> Result<Self, RegistryError> {
        roster.check_tools(&executor.tool_names())?;
        Ok(Self {
            roster,
            capability,
            executor,
            recovery,
            max_steps_per_turn: max_steps_per_turn.max(1),
        })
    }
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("orchestrator", &self.roster.orchestrator())
            .field("agents", &self.roster.registry().names())
            .field("tools", &self.executor.tool_names())
            .finish()
    }
}

/// 按配置创建运行时：注册 lights 与 document_search 工具，阵容取自 [[agents]] 或内置阵容
pub fn create_runtime(
    cfg: &AppConfig,
    capability: Arc<dyn AgentCapability>,
    retriever: Arc<dyn DocumentRetriever>,
    lights: LightStore,
) -> Result<AgentRuntime, RegistryError> {
    let roster = Roster::from_config(cfg)?;

    let mut tools = ToolRegistry::new();
    tools.register(LightTool::new(lights));
    tools.register(DocumentSearchTool::new(retriever, cfg.tools.search_top_k));

    tracing::info!(
        orchestrator = roster.orchestrator(),
        agents = roster.registry().len(),
        handoffs = roster.handoffs().len(),
        "Agent runtime created"
    );

    AgentRuntime::new(
        roster,
        capability,
        ToolExecutor::new(tools, cfg.tools.tool_timeout_secs),
        RecoveryEngine::new(cfg.coordinator.capability_retries),
        cfg.coordinator.max_steps_per_turn,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentDefinition, KeywordCapability};
    use crate::tools::InMemoryRetriever;

    #[test]
    fn test_builtin_runtime() {
        let runtime = create_runtime(
            &AppConfig::default(),
            Arc::new(KeywordCapability),
            Arc::new(InMemoryRetriever::new()),
            LightStore::default(),
        )
        .unwrap();
        assert_eq!(runtime.roster.orchestrator(), "OrchestratorAgent");
        assert_eq!(runtime.executor.tool_names(), vec!["document_search", "lights"]);
        assert_eq!(runtime.max_steps_per_turn, 16);
    }

    #[test]
    fn test_agent_with_missing_tool_rejected() {
        let mut cfg = AppConfig::default();
        cfg.coordinator.orchestrator = "Solo".into();
        cfg.agents = vec![AgentDefinition::new("Solo", "does it all").with_tool("teleport")];
        let err = create_runtime(
            &cfg,
            Arc::new(KeywordCapability),
            Arc::new(InMemoryRetriever::new()),
            LightStore::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownTool { .. }));
    }
}
