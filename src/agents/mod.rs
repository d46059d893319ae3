//! 智能体层：注册表、handoff 表、阵容、能力抽象与 Mock 实现

pub mod capability;
pub mod handoff;
pub mod mock;
pub mod registry;
pub mod roster;

pub use capability::{AgentCapability, AgentContext, AgentResponse, ToolObservation};
pub use handoff::{HandoffRule, HandoffTable};
pub use mock::KeywordCapability;
pub use registry::{AgentDefinition, AgentRegistry, RegistryError, ToolRef};
pub use roster::{Roster, DOCUMENT_SEARCH_AGENT, LIGHT_AGENT, ORCHESTRATOR_AGENT};
