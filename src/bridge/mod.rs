//! 会话桥：调用方与后台轮次循环之间的并发桥接
//!
//! - **session**: 单会话的 worker 生命周期、send / 导入导出 / 重启
//! - **coalescer**: 把一个轮次内的多条智能体输出合并为一条回复
//! - **registry**: 会话注册表与 worker 容量

pub mod coalescer;
pub mod registry;
pub mod session;

pub use coalescer::{Coalescer, CoalescerEvent, ReplySlot};
pub use registry::{SessionId, SessionRegistry};
pub use session::{HumanTurn, Session};
