//! 智能体注册表
//!
//! AgentDefinition 在进程启动时由静态配置创建，进程生命周期内不可变；
//! AgentRegistry 按注册顺序保存，并按名称查找。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::AgentName;

/// 工具引用（工具注册表中的名称）
pub type ToolRef = String;

/// 构建注册表 / handoff 表时的配置错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate agent '{0}'")]
    DuplicateAgent(AgentName),

    #[error("unknown agent '{0}'")]
    UnknownAgent(AgentName),

    #[error("duplicate handoff {from} -> {to}")]
    DuplicateHandoff { from: AgentName, to: AgentName },

    #[error("agent '{0}' cannot hand off to itself")]
    SelfHandoff(AgentName),

    #[error("agent '{agent}' references unregistered tool '{tool}'")]
    UnknownTool { agent: AgentName, tool: ToolRef },
}

/// 单个智能体的静态描述
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: AgentName,
    /// 能力摘要（供编排智能体判断何时转交）
    pub description: String,
    /// 系统指令（交给能力实现构造 prompt）
    #[serde(default)]
    pub instructions: String,
    /// 可调用的工具
    #[serde(default)]
    pub tools: BTreeSet<ToolRef>,
}

impl AgentDefinition {
    pub fn new(name: impl Into<AgentName>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            instructions: String::new(),
            tools: BTreeSet::new(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_tool(mut self, tool: impl Into<ToolRef>) -> Self {
        self.tools.insert(tool.into());
        self
    }

    pub fn can_use(&self, tool: &str) -> bool {
        self.tools.contains(tool)
    }
}

/// 智能体注册表
#[derive(Clone, Debug, Default)]
pub struct AgentRegistry {
    agents: Vec<Arc<AgentDefinition>>,
    index: HashMap<AgentName, usize>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: AgentDefinition) -> Result<(), RegistryError> {
        if self.index.contains_key(&agent.name) {
            return Err(RegistryError::DuplicateAgent(agent.name));
        }
        self.index.insert(agent.name.clone(), self.agents.len());
        self.agents.push(Arc::new(agent));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<AgentDefinition>> {
        self.index.get(name).map(|&i| self.agents[i].clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// 按注册顺序返回名称
    pub fn names(&self) -> Vec<AgentName> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AgentDefinition>> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
