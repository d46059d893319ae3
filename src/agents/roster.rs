//! 智能体阵容：注册表 + handoff 表 + 指定的编排智能体
//!
//! 未在配置中声明 [[agents]] 时使用内置阵容：OrchestratorAgent 负责分诊，
//! DocumentSearchAgent 与 LightAgent 为专家，专家完成后可交回编排智能体。

use std::sync::Arc;

use crate::agents::{AgentDefinition, AgentRegistry, HandoffTable, RegistryError};
use crate::config::AppConfig;

pub const ORCHESTRATOR_AGENT: &str = "OrchestratorAgent";
pub const DOCUMENT_SEARCH_AGENT: &str = "DocumentSearchAgent";
pub const LIGHT_AGENT: &str = "LightAgent";

const BACK_TO_ORCHESTRATOR: &str = "Transfer to general agent who orchestrate to another task";

/// 不可变阵容，所有会话共享
#[derive(Clone, Debug)]
pub struct Roster {
    registry: AgentRegistry,
    handoffs: HandoffTable,
    orchestrator: String,
}

impl Roster {
    pub fn new(
        registry: AgentRegistry,
        handoffs: HandoffTable,
        orchestrator: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        let orchestrator = orchestrator.into();
        if !registry.contains(&orchestrator) {
            return Err(RegistryError::UnknownAgent(orchestrator));
        }
        handoffs.validate(&registry)?;
        Ok(Self {
            registry,
            handoffs,
            orchestrator,
        })
    }

    /// 内置三智能体阵容
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = AgentRegistry::new();
        registry.register(
            AgentDefinition::new(
                ORCHESTRATOR_AGENT,
                "An assistant that helps user and also manage, analyze request, orchestrate and can also handoffs to another agent.",
            )
            .with_instructions(
                "Handle general requests and hand off if there's an agent specialized in the task. \
                 There's an agent for smart home control to control all the lights, and there's also \
                 an agent for document search. When transferring to another agent, you don't need to send any text.",
            ),
        )?;
        registry.register(
            AgentDefinition::new(
                DOCUMENT_SEARCH_AGENT,
                "An assistant to help users find or search documents and summarize them.",
            )
            .with_instructions("Handle document search requests and summarize what the documents say.")
            .with_tool(crate::tools::DOCUMENT_SEARCH_TOOL),
        )?;
        registry.register(
            AgentDefinition::new(LIGHT_AGENT, "A home assistant that mainly handles light control")
                .with_instructions("Handle light control requests.")
                .with_tool(crate::tools::LIGHTS_TOOL),
        )?;

        let handoffs = HandoffTable::new()
            .add_many(
                ORCHESTRATOR_AGENT,
                [
                    (
                        DOCUMENT_SEARCH_AGENT,
                        "Transfer to this agent if there's a request on document search",
                    ),
                    (
                        LIGHT_AGENT,
                        "Transfer to this agent if there's a request on smart home light control",
                    ),
                ],
            )?
            .add(DOCUMENT_SEARCH_AGENT, ORCHESTRATOR_AGENT, BACK_TO_ORCHESTRATOR)?
            .add(LIGHT_AGENT, ORCHESTRATOR_AGENT, BACK_TO_ORCHESTRATOR)?;

        Self::new(registry, handoffs, ORCHESTRATOR_AGENT)
    }

    /// 从配置构建；配置未声明智能体时回落到内置阵容
    pub fn from_config(cfg: &AppConfig) -> Result<Self, RegistryError> {
        if cfg.agents.is_empty() {
            return Self::builtin();
        }
        let mut registry = AgentRegistry::new();
        for agent in &cfg.agents {
            registry.register(agent.clone())?;
        }
        let mut handoffs = HandoffTable::new();
        for rule in &cfg.handoffs {
            handoffs.insert(rule.clone())?;
        }
        Self::new(registry, handoffs, cfg.coordinator.orchestrator.clone())
    }

    /// 所有智能体引用的工具都必须存在于工具注册表
    pub fn check_tools(&self, available: &[String]) -> Result<(), RegistryError> {
        for agent in self.registry.iter() {
            if let Some(tool) = agent.tools.iter().find(|t| !available.contains(t)) {
                return Err(RegistryError::UnknownTool {
                    agent: agent.name.clone(),
                    tool: tool.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn agent(&self, name: &str) -> Option<Arc<AgentDefinition>> {
        self.registry.get(name)
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn handoffs(&self) -> &HandoffTable {
        &self.handoffs
    }

    pub fn orchestrator(&self) -> &str {
        &self.orchestrator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::HandoffRule;
    use crate::config::CoordinatorSection;

    #[test]
    fn test_builtin_roster() {
        let roster = Roster::builtin().unwrap();
        assert_eq!(roster.orchestrator(), ORCHESTRATOR_AGENT);
        assert_eq!(roster.registry().len(), 3);
        assert!(roster.handoffs().allows(ORCHESTRATOR_AGENT, LIGHT_AGENT));
        assert!(roster.handoffs().allows(LIGHT_AGENT, ORCHESTRATOR_AGENT));
        assert!(!roster.handoffs().allows(LIGHT_AGENT, DOCUMENT_SEARCH_AGENT));
        assert!(roster
            .check_tools(&["lights".to_string(), "document_search".to_string()])
            .is_ok());
        assert!(matches!(
            roster.check_tools(&["lights".to_string()]),
            Err(RegistryError::UnknownTool { .. })
        ));
    }

    #[test]
    fn test_unknown_orchestrator_rejected() {
        let mut registry = AgentRegistry::new();
        registry.register(AgentDefinition::new("Solo", "alone")).unwrap();
        let err = Roster::new(registry, HandoffTable::new(), "Missing").unwrap_err();
        assert_eq!(err, RegistryError::UnknownAgent("Missing".into()));
    }

    #[test]
    fn test_from_config_declared_agents() {
        let mut cfg = AppConfig::default();
        cfg.coordinator = CoordinatorSection {
            orchestrator: "Triage".into(),
            ..CoordinatorSection::default()
        };
        cfg.agents = vec![
            AgentDefinition::new("Triage", "routes"),
            AgentDefinition::new("Billing", "invoices"),
        ];
        cfg.handoffs = vec![HandoffRule {
            source: "Triage".into(),
            target: "Billing".into(),
            description: "billing questions".into(),
        }];
        let roster = Roster::from_config(&cfg).unwrap();
        assert_eq!(roster.orchestrator(), "Triage");
        assert!(roster.handoffs().allows("Triage", "Billing"));
    }
}
