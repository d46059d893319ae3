//! 关键词路由 Mock 能力（无需模型后端即可跑通整个桥接）
//!
//! 编排智能体按关键词匹配 handoff 描述转交；灯光专家先 list 再 set；文档专家检索后摘要；
//! 与自身能力无关的请求交回来源智能体。

use async_trait::async_trait;
use serde_json::json;

use crate::agents::{AgentCapability, AgentContext, AgentResponse};
use crate::core::CapabilityError;
use crate::tools::{Light, DOCUMENT_SEARCH_TOOL, LIGHTS_TOOL};

const LIGHT_WORDS: &[&str] = &["light", "lamp", "chandelier"];
const DOCUMENT_WORDS: &[&str] = &["document", "search", "file", "policy"];

fn mentions(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Mock 能力
#[derive(Debug, Default)]
pub struct KeywordCapability;

impl KeywordCapability {
    /// 找到描述中含关键词的 handoff 目标
    fn route(ctx: &AgentContext<'_>, words: &[&str]) -> Option<AgentResponse> {
        ctx.handoffs
            .iter()
            .find(|r| mentions(&r.description.to_lowercase(), words))
            .map(|r| AgentResponse::handoff(r.target.clone()))
    }

    /// 交回第一个可转交目标（通常是编排智能体）
    fn hand_back(ctx: &AgentContext<'_>) -> Option<AgentResponse> {
        ctx.handoffs
            .first()
            .map(|r| AgentResponse::handoff(r.target.clone()))
    }

    fn lights(ctx: &AgentContext<'_>, message: &str) -> AgentResponse {
        match ctx.observations {
            [] => AgentResponse::tool_call(LIGHTS_TOOL, json!({"action": "list"})),
            [listing] => {
                let lights: Vec<Light> = serde_json::from_str(&listing.output).unwrap_or_default();
                let wanted = if message.contains("off") {
                    Some(false)
                } else if message.contains(" on") {
                    Some(true)
                } else {
                    None
                };
                let target = lights
                    .iter()
                    .find(|l| message.contains(&l.name.to_lowercase()));
                match (wanted, target) {
                    (Some(is_on), _) if message.contains("all") => {
                        AgentResponse::tool_call(LIGHTS_TOOL, json!({"action": "set_all", "is_on": is_on}))
                    }
                    (Some(is_on), Some(light)) => AgentResponse::tool_call(
                        LIGHTS_TOOL,
                        json!({"action": "set", "id": light.id, "is_on": is_on}),
                    ),
                    _ => AgentResponse::reply(
                        lights
                            .iter()
                            .map(|l| format!("{}: {}", l.name, if l.is_on { "on" } else { "off" }))
                            .collect::<Vec<_>>()
                            .join("\n"),
                    ),
                }
            }
            [.., last] if last.ok => AgentResponse::reply(format!("Done. {}", last.output)),
            [.., last] => AgentResponse::reply(format!("Sorry, that did not work: {}", last.output)),
        }
    }

    fn documents(ctx: &AgentContext<'_>, message: &str) -> AgentResponse {
        match ctx.observations.last() {
            None => AgentResponse::tool_call(DOCUMENT_SEARCH_TOOL, json!({"query": message})),
            Some(obs) => AgentResponse::reply(format!("Here is what I found:\n{}", obs.output)),
        }
    }
}

#[async_trait]
impl AgentCapability for KeywordCapability {
    async fn invoke(&self, ctx: AgentContext<'_>) -> Result<AgentResponse, CapabilityError> {
        let message = ctx.last_user_message().unwrap_or_default().to_lowercase();
        let agent = ctx.agent;

        if agent.can_use(LIGHTS_TOOL) {
            if ctx.observations.is_empty() && !mentions(&message, LIGHT_WORDS) {
                if let Some(back) = Self::hand_back(&ctx) {
                    return Ok(back);
                }
            }
            return Ok(Self::lights(&ctx, &message));
        }

        if agent.can_use(DOCUMENT_SEARCH_TOOL) {
            if ctx.observations.is_empty() && !mentions(&message, DOCUMENT_WORDS) {
                if let Some(back) = Self::hand_back(&ctx) {
                    return Ok(back);
                }
            }
            return Ok(Self::documents(&ctx, &message));
        }

        if mentions(&message, LIGHT_WORDS) {
            if let Some(handoff) = Self::route(&ctx, LIGHT_WORDS) {
                return Ok(handoff);
            }
        }
        if mentions(&message, DOCUMENT_WORDS) {
            if let Some(handoff) = Self::route(&ctx, DOCUMENT_WORDS) {
                return Ok(handoff);
            }
        }
        Ok(AgentResponse::reply(format!(
            "Hello! I'm {}. Ask me about the lights or your documents.",
            agent.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentDefinition, HandoffRule, Roster, ToolObservation, LIGHT_AGENT, ORCHESTRATOR_AGENT};
    use crate::memory::ChatMessage;

    fn ctx_for<'a>(
        agent: &'a AgentDefinition,
        transcript: &'a [ChatMessage],
        observations: &'a [ToolObservation],
        handoffs: &'a [HandoffRule],
    ) -> AgentContext<'a> {
        AgentContext {
            agent,
            transcript,
            observations,
            handoffs,
        }
    }

    #[tokio::test]
    async fn test_orchestrator_routes_lights() {
        let roster = Roster::builtin().unwrap();
        let agent = roster.agent(ORCHESTRATOR_AGENT).unwrap();
        let transcript = vec![ChatMessage::user("Turn on the table lamp")];
        let ctx = ctx_for(&agent, &transcript, &[], roster.handoffs().targets(ORCHESTRATOR_AGENT));
        let response = KeywordCapability.invoke(ctx).await.unwrap();
        assert_eq!(response, AgentResponse::handoff(LIGHT_AGENT));
    }

    #[tokio::test]
    async fn test_light_agent_sets_named_light() {
        let roster = Roster::builtin().unwrap();
        let agent = roster.agent(LIGHT_AGENT).unwrap();
        let transcript = vec![ChatMessage::user("Turn on the table lamp")];
        let listing = ToolObservation {
            tool: LIGHTS_TOOL.into(),
            ok: true,
            output: r#"[{"id":1,"name":"Table Lamp","is_on":false}]"#.into(),
        };
        let observations = [listing];
        let ctx = ctx_for(&agent, &transcript, &observations, roster.handoffs().targets(LIGHT_AGENT));
        let response = KeywordCapability.invoke(ctx).await.unwrap();
        assert_eq!(
            response,
            AgentResponse::tool_call(LIGHTS_TOOL, json!({"action": "set", "id": 1, "is_on": true}))
        );
    }

    #[tokio::test]
    async fn test_specialist_hands_back_unrelated_request() {
        let roster = Roster::builtin().unwrap();
        let agent = roster.agent(LIGHT_AGENT).unwrap();
        let transcript = vec![ChatMessage::user("what's your name?")];
        let ctx = ctx_for(&agent, &transcript, &[], roster.handoffs().targets(LIGHT_AGENT));
        let response = KeywordCapability.invoke(ctx).await.unwrap();
        assert_eq!(response, AgentResponse::handoff(ORCHESTRATOR_AGENT));
    }
}
