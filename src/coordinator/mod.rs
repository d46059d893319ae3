//! 轮次协调：路由状态与协作式轮次循环

pub mod routing;
pub mod turn;

pub use routing::{Checkpoint, RoutingState, TurnPhase};
pub use turn::{HumanInput, TurnCoordinator};
