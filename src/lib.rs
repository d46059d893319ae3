//! Hive - Rust 多智能体会话桥
//!
//! 模块划分：
//! - **agent**: 共享的智能体运行时（阵容、能力后端、工具执行器、恢复引擎）
//! - **agents**: 智能体注册表、handoff 表、能力抽象与关键词 Mock
//! - **bridge**: 会话桥（worker 生命周期、回复合并、会话注册表）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **coordinator**: 路由状态与协作式轮次循环
//! - **core**: 错误与恢复、会话状态、取消监管
//! - **memory**: 会话记录与快照编解码
//! - **tools**: 工具箱（lights、document_search）与执行器

pub mod agent;
pub mod agents;
pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod core;
pub mod memory;
pub mod observability;
pub mod tools;

pub use crate::agent::{create_runtime, AgentRuntime};
pub use crate::bridge::{Session, SessionRegistry};
pub use crate::core::BridgeError;
