//! Handoff 表：智能体之间的有向转交图
//!
//! 每个源智能体对应一组目标，每条边附带自然语言触发描述，供编排智能体判断何时转交。
//! 同一源的目标必须唯一；图允许有环（控制权可反复回到编排智能体），但不允许自环。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::agents::{AgentRegistry, RegistryError};
use crate::memory::AgentName;

/// 一条转交规则
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffRule {
    pub source: AgentName,
    pub target: AgentName,
    /// 触发描述，如 "Transfer to this agent if there's a request on document search"
    pub description: String,
}

/// Handoff 表
#[derive(Clone, Debug, Default)]
pub struct HandoffTable {
    rules: HashMap<AgentName, Vec<HandoffRule>>,
}

impl HandoffTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一条边
    pub fn add(
        mut self,
        source: impl Into<AgentName>,
        target: impl Into<AgentName>,
        description: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        self.insert(HandoffRule {
            source: source.into(),
            target: target.into(),
            description: description.into(),
        })?;
        Ok(self)
    }

    /// 为同一源一次添加多个目标
    pub fn add_many<I, T, D>(mut self, source: impl Into<AgentName>, targets: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (T, D)>,
        T: Into<AgentName>,
        D: Into<String>,
    {
        let source = source.into();
        for (target, description) in targets {
            self.insert(HandoffRule {
                source: source.clone(),
                target: target.into(),
                description: description.into(),
            })?;
        }
        Ok(self)
    }

    pub fn insert(&mut self, rule: HandoffRule) -> Result<(), RegistryError> {
        if rule.source == rule.target {
            return Err(RegistryError::SelfHandoff(rule.source));
        }
        let edges = self.rules.entry(rule.source.clone()).or_default();
        if edges.iter().any(|r| r.target == rule.target) {
            return Err(RegistryError::DuplicateHandoff {
                from: rule.source,
                to: rule.target,
            });
        }
        edges.push(rule);
        Ok(())
    }

    /// 源智能体可转交的所有规则（按添加顺序）
    pub fn targets(&self, source: &str) -> &[HandoffRule] {
        self.rules.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn allows(&self, source: &str, target: &str) -> bool {
        self.targets(source).iter().any(|r| r.target == target)
    }

    /// 所有边引用的智能体都必须已注册
    pub fn validate(&self, registry: &AgentRegistry) -> Result<(), RegistryError> {
        for rule in self.rules.values().flatten() {
            for name in [&rule.source, &rule.target] {
                if !registry.contains(name) {
                    return Err(RegistryError::UnknownAgent(name.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentDefinition;

    fn star() -> HandoffTable {
        HandoffTable::new()
            .add_many("Orchestrator", [("A", "go to A"), ("B", "go to B")])
            .unwrap()
            .add("A", "Orchestrator", "back")
            .unwrap()
            .add("B", "Orchestrator", "back")
            .unwrap()
    }

    #[test]
    fn test_cycles_allowed() {
        let table = star();
        assert!(table.allows("Orchestrator", "A"));
        assert!(table.allows("A", "Orchestrator"));
        assert!(!table.allows("A", "B"));
        assert_eq!(table.len(), 4);
        let targets: Vec<_> = table.targets("Orchestrator").iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["A", "B"]);
    }

    #[test]
    fn test_duplicate_and_self_edges_rejected() {
        let dup = star().add("Orchestrator", "A", "again");
        assert!(matches!(dup, Err(RegistryError::DuplicateHandoff { .. })));
        let selfie = HandoffTable::new().add("A", "A", "me");
        assert_eq!(selfie.unwrap_err(), RegistryError::SelfHandoff("A".into()));
    }

    #[test]
    fn test_validate_against_registry() {
        let mut registry = AgentRegistry::new();
        registry.register(AgentDefinition::new("Orchestrator", "o")).unwrap();
        registry.register(AgentDefinition::new("A", "a")).unwrap();
        assert_eq!(
            star().validate(&registry),
            Err(RegistryError::UnknownAgent("B".into()))
        );
        registry.register(AgentDefinition::new("B", "b")).unwrap();
        assert!(star().validate(&registry).is_ok());
    }

    #[test]
    fn test_unknown_source_has_no_targets() {
        assert!(star().targets("Nobody").is_empty());
    }
}
