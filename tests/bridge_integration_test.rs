//! 会话桥集成测试：只通过公开 API 驱动

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use hive::agents::{AgentCapability, AgentContext, AgentResponse, KeywordCapability};
use hive::bridge::Session;
use hive::config::{AppConfig, BridgeSection};
use hive::core::{BridgeError, CapabilityError, ProtocolError, SessionState};
use hive::memory::{ChatMessage, Role};
use hive::tools::{InMemoryRetriever, LightStore};
use hive::create_runtime;

/// 由闭包决定每次响应的能力
struct FnCapability<F>(F);

#[async_trait]
impl<F> AgentCapability for FnCapability<F>
where
    F: Fn(&AgentContext<'_>) -> Result<AgentResponse, CapabilityError> + Send + Sync,
{
    async fn invoke(&self, ctx: AgentContext<'_>) -> Result<AgentResponse, CapabilityError> {
        (self.0)(&ctx)
    }
}

fn runtime_with(capability: impl AgentCapability + 'static) -> Arc<hive::AgentRuntime> {
    let runtime = create_runtime(
        &AppConfig::default(),
        Arc::new(capability),
        Arc::new(InMemoryRetriever::new()),
        LightStore::default(),
    )
    .unwrap();
    Arc::new(runtime)
}

fn session_with(capability: impl AgentCapability + 'static) -> Session {
    // 轮次在挂起点封口即交付；较长的静默期让测试不依赖调度时序
    let settings = BridgeSection {
        flush_delay_ms: 200,
        ..BridgeSection::default()
    };
    Session::new("test", runtime_with(capability), &settings, None)
}

/// 编排者先说一句过渡语再转交；灯光专家要想一会儿才回答
struct SlowSpecialist;

#[async_trait]
impl AgentCapability for SlowSpecialist {
    async fn invoke(&self, ctx: AgentContext<'_>) -> Result<AgentResponse, CapabilityError> {
        if ctx.agent.name == "LightAgent" {
            tokio::time::sleep(Duration::from_millis(50)).await;
            return Ok(AgentResponse::reply("The lamp is on."));
        }
        let said_interim = ctx
            .transcript
            .last()
            .map_or(false, |m| m.role == Role::Assistant);
        Ok(if said_interim {
            AgentResponse::handoff("LightAgent")
        } else {
            AgentResponse::interim("Let me get the light agent.")
        })
    }
}

/// "slow" 需要 100ms 且不可打断，其余立即回声
struct SlowOnRequest;

#[async_trait]
impl AgentCapability for SlowOnRequest {
    async fn invoke(&self, ctx: AgentContext<'_>) -> Result<AgentResponse, CapabilityError> {
        let message = ctx.last_user_message().unwrap_or_default().to_string();
        if message == "slow" {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(AgentResponse::reply(format!("re: {message}")))
    }
}

fn echo() -> impl AgentCapability {
    FnCapability(|ctx: &AgentContext<'_>| {
        Ok(AgentResponse::reply(format!(
            "echo: {}",
            ctx.last_user_message().unwrap_or_default()
        )))
    })
}

#[tokio::test]
async fn test_hello_yields_two_transcript_entries() {
    let session = session_with(echo());
    let reply = session.send("hello").await.unwrap();
    assert_eq!(reply, "echo: hello");

    let transcript = session.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0], ChatMessage::user("hello"));
    assert_eq!(transcript[1].role, Role::Assistant);
    assert_eq!(transcript[1].content, reply);
    assert_eq!(session.state(), SessionState::Running);
}

#[tokio::test]
async fn test_replies_fifo_under_concurrent_sends() {
    let session = Arc::new(session_with(echo()));
    let handles: Vec<_> = (0..10)
        .map(|i| {
            let session = session.clone();
            tokio::spawn(async move {
                let message = format!("m{i}");
                let reply = session.send(message.clone()).await.unwrap();
                (message, reply)
            })
        })
        .collect();

    for result in join_all(handles).await {
        let (message, reply) = result.unwrap();
        assert_eq!(reply, format!("echo: {message}"));
    }

    let transcript = session.transcript();
    assert_eq!(transcript.len(), 20);
    for pair in transcript.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].content, format!("echo: {}", pair[0].content));
    }
}

#[tokio::test]
async fn test_three_quick_messages_become_one_reply() {
    let session = session_with(FnCapability(|ctx: &AgentContext<'_>| {
        let last = ctx.transcript.last().map(|m| m.content.as_str());
        Ok(match last {
            Some("one") => AgentResponse::interim("two"),
            Some("two") => AgentResponse::reply("three"),
            _ => AgentResponse::interim("one"),
        })
    }));

    let reply = session.send("count").await.unwrap();
    assert_eq!(reply, "one\n\ntwo\n\nthree");
    assert_eq!(session.transcript().len(), 4);
}

#[tokio::test]
async fn test_export_before_start_is_not_running() {
    let session = session_with(echo());
    assert_eq!(session.export_state(true), Err(BridgeError::NotRunning));
    assert_eq!(session.export_state(false), Err(BridgeError::NotRunning));
}

#[tokio::test]
async fn test_snapshot_round_trip_preserves_routing() {
    let source = session_with(KeywordCapability);
    let reply = source.send("Turn on the table lamp").await.unwrap();
    assert!(reply.contains("Table Lamp"));

    for compress in [false, true] {
        let blob = source.export_state(compress).unwrap();

        let restored = session_with(KeywordCapability);
        restored.import_state(&blob, compress).unwrap();
        assert_eq!(restored.transcript(), source.transcript());
        assert!(restored.info().has_routing_state);
        assert_eq!(restored.export_state(compress).unwrap(), blob);

        // 路由状态随快照恢复：灯光专家仍是活跃智能体
        restored.send("turn off the porch light").await.unwrap();
        let last = restored.transcript().last().cloned().unwrap();
        assert_eq!(last.produced_by.as_deref(), Some("LightAgent"));
    }
}

#[tokio::test]
async fn test_import_rejects_garbage_and_running_worker() {
    let session = session_with(echo());
    session
        .set_transcript(vec![ChatMessage::user("kept")])
        .unwrap();

    let err = session.import_state("%%% not base64 %%%", false).unwrap_err();
    assert!(matches!(err, BridgeError::InvalidFormat(_)));
    assert_eq!(session.transcript(), vec![ChatMessage::user("kept")]);

    session.send("hi").await.unwrap();
    let blob = session.export_state(false).unwrap();
    assert_eq!(session.import_state(&blob, false), Err(BridgeError::WorkerRunning));
    assert_eq!(session.set_transcript(Vec::new()), Err(BridgeError::WorkerRunning));

    session.restart();
    session.import_state(&blob, false).unwrap();
    assert_eq!(session.transcript().len(), 3);
}

#[tokio::test]
async fn test_fault_fails_fast_until_restart() {
    let session = session_with(FnCapability(|ctx: &AgentContext<'_>| {
        match ctx.last_user_message() {
            Some("boom") => Ok(AgentResponse::handoff("Nowhere")),
            other => Ok(AgentResponse::reply(format!("ok: {}", other.unwrap_or_default()))),
        }
    }));

    let expected = BridgeError::Faulted(Box::new(BridgeError::Protocol(
        ProtocolError::InvalidHandoff {
            from: "OrchestratorAgent".into(),
            to: "Nowhere".into(),
        },
    )));
    assert_eq!(session.send("boom").await, Err(expected.clone()));
    assert_eq!(session.state(), SessionState::Faulted);
    assert_eq!(session.send("hello").await, Err(expected.clone()));
    assert_eq!(session.export_state(false), Err(expected));

    session.restart();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.send("hello").await.unwrap(), "ok: hello");

    let contents: Vec<_> = session.transcript().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["boom", "hello", "ok: hello"]);
}

#[tokio::test]
async fn test_send_with_recovery_replays_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let session = session_with(FnCapability(move |_ctx: &AgentContext<'_>| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(CapabilityError::Failed("backend crashed".into()))
        } else {
            Ok(AgentResponse::reply("recovered"))
        }
    }));

    assert_eq!(session.send_with_recovery("hi").await.unwrap(), "recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let users = session
        .transcript()
        .iter()
        .filter(|m| m.role == Role::User)
        .count();
    assert_eq!(users, 2);
}

#[tokio::test]
async fn test_transient_error_retried_inside_turn() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let session = session_with(FnCapability(move |_ctx: &AgentContext<'_>| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(CapabilityError::Timeout("slow model".into()))
        } else {
            Ok(AgentResponse::reply("fine"))
        }
    }));

    assert_eq!(session.send("hi").await.unwrap(), "fine");
    assert_eq!(session.state(), SessionState::Running);
}

#[tokio::test]
async fn test_produced_by_always_registered() {
    let session = session_with(KeywordCapability);
    for message in [
        "hello",
        "turn on the chandelier",
        "search the travel policy",
        "what's your name?",
        "turn off all the lights",
    ] {
        session.send(message).await.unwrap();
    }

    let known = ["OrchestratorAgent", "DocumentSearchAgent", "LightAgent"];
    for message in session.transcript() {
        match message.role {
            Role::User => assert!(message.produced_by.is_none()),
            _ => assert!(known.contains(&message.produced_by.as_deref().unwrap())),
        }
    }
}

#[tokio::test]
async fn test_default_settings_wait_for_slow_specialist() {
    let session = Session::new("default", runtime_with(SlowSpecialist), &BridgeSection::default(), None);

    let reply = session.send("lamp on").await.unwrap();
    assert_eq!(reply, "Let me get the light agent.\n\nThe lamp is on.");

    let contents: Vec<_> = session.transcript().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["lamp on", "Let me get the light agent.", "The lamp is on."]);
}

#[tokio::test]
async fn test_restart_detaches_in_flight_worker() {
    let session = Arc::new(session_with(SlowOnRequest));

    let in_flight = {
        let session = session.clone();
        tokio::spawn(async move { session.send("slow").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.restart();

    assert_eq!(in_flight.await.unwrap(), Err(BridgeError::WorkerStopped));
    assert_eq!(session.send("fast").await.unwrap(), "re: fast");

    // 旧 worker 的调用结束后，其输出不会写入会话记录
    tokio::time::sleep(Duration::from_millis(150)).await;
    let contents: Vec<_> = session.transcript().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["slow", "fast", "re: fast"]);
}
