//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时。execute 先校验工具属于当前智能体（否则为致命协议错误），
//! 再在超时内调用；工具失败或超时不致命，转为 ok=false 的观察交回智能体。每次调用输出 JSON 审计日志。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::agents::{AgentDefinition, ToolObservation};
use crate::core::ProtocolError;
use crate::tools::ToolRegistry;

/// 工具执行器
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub async fn execute(
        &self,
        agent: &AgentDefinition,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<ToolObservation, ProtocolError> {
        if !agent.can_use(tool_name) || self.registry.get(tool_name).is_none() {
            return Err(ProtocolError::UnknownTool {
                agent: agent.name.clone(),
                tool: tool_name.to_string(),
            });
        }

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "agent": agent.name,
            "tool": tool_name,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        let (ok, output) = match result {
            Ok(Ok(content)) => (true, content),
            Ok(Err(e)) => (false, format!("Tool execution failed: {e}")),
            Err(_) => (false, format!("Tool '{tool_name}' timed out")),
        };
        Ok(ToolObservation {
            tool: tool_name.to_string(),
            ok,
            output,
        })
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Sleepy;

    #[async_trait]
    impl Tool for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn description(&self) -> &str {
            "never finishes in time"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("late".into())
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            Err("boom".into())
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Sleepy);
        registry.register(Failing);
        ToolExecutor::new(registry, 1)
    }

    #[tokio::test]
    async fn test_tool_outside_agent_set_is_protocol_error() {
        let agent = AgentDefinition::new("A", "a").with_tool("failing");
        let err = executor().execute(&agent, "sleepy", json!({})).await.unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnknownTool {
                agent: "A".into(),
                tool: "sleepy".into()
            }
        );
    }

    #[tokio::test]
    async fn test_tool_failure_becomes_observation() {
        let agent = AgentDefinition::new("A", "a").with_tool("failing");
        let obs = executor().execute(&agent, "failing", json!({})).await.unwrap();
        assert!(!obs.ok);
        assert!(obs.output.contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_observation() {
        let agent = AgentDefinition::new("A", "a").with_tool("sleepy");
        let obs = executor().execute(&agent, "sleepy", json!({})).await.unwrap();
        assert!(!obs.ok);
        assert!(obs.output.contains("timed out"));
    }
}
