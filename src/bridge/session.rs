//! 会话桥
//!
//! 每个会话至多一个后台 worker（tokio 任务）运行 TurnCoordinator。调用方经无界 mpsc 投递用户轮次，
//! 每轮附带一个 oneshot 回复槽；worker 在首次 send 时通过原子 CAS 懒启动。故障后会话进入 Faulted，
//! 此后所有 send 立即返回同一个错误，直到 restart。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentRuntime;
use crate::bridge::{Coalescer, CoalescerEvent, ReplySlot};
use crate::config::BridgeSection;
use crate::coordinator::{Checkpoint, HumanInput, RoutingState, TurnCoordinator};
use crate::core::{
    AtomicSessionState, BridgeError, RecoveryAction, SessionInfo, SessionState, SessionSupervisor,
};
use crate::memory::snapshot::{self, SessionSnapshot};
use crate::memory::{ChatMessage, SharedTranscript, Transcript};

/// 一个排队中的用户轮次
#[derive(Debug)]
pub struct HumanTurn {
    pub text: String,
    pub reply: ReplySlot,
}

/// 生命周期标志与故障原因；二者在同一把锁下更新
#[derive(Debug, Default)]
struct Lifecycle {
    state: AtomicSessionState,
    fault: Mutex<Option<BridgeError>>,
}

impl Lifecycle {
    fn fault_slot(&self) -> MutexGuard<'_, Option<BridgeError>> {
        self.fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_fault(&self) -> Option<BridgeError> {
        self.fault_slot().clone()
    }

    /// 记录故障；所属 worker 已被取消（会话已重启）时忽略
    fn record_fault(&self, err: BridgeError, cancel: &CancellationToken) -> bool {
        let mut slot = self.fault_slot();
        if cancel.is_cancelled() {
            return false;
        }
        *slot = Some(err);
        self.state.fault();
        true
    }

    fn clear(&self) {
        let mut slot = self.fault_slot();
        *slot = None;
        self.state.reset();
    }
}

/// worker 侧的 HumanInput 实现：从入站队列取轮次，把输出交给合并器
struct BridgePort {
    inbound: mpsc::UnboundedReceiver<HumanTurn>,
    emit_tx: mpsc::Sender<CoalescerEvent>,
    cancel: CancellationToken,
    turn_open: bool,
}

#[async_trait]
impl HumanInput for BridgePort {
    async fn next_turn(&mut self) -> Option<String> {
        if self.turn_open {
            self.turn_open = false;
            let _ = self.emit_tx.send(CoalescerEvent::Seal).await;
        }

        let turn = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            turn = self.inbound.recv() => turn,
        }?;
        self.emit_tx.send(CoalescerEvent::Open(turn.reply)).await.ok()?;
        self.turn_open = true;
        Some(turn.text)
    }

    async fn emit(&mut self, message: ChatMessage) {
        let _ = self.emit_tx.send(CoalescerEvent::Message(message)).await;
    }
}

impl BridgePort {
    /// 故障：结束当前轮次，关闭入站队列并让所有排队轮次以同一错误返回
    async fn fail(&mut self, err: BridgeError) {
        let _ = self.emit_tx.send(CoalescerEvent::Fail(err.clone())).await;
        self.turn_open = false;
        self.inbound.close();
        while let Ok(turn) = self.inbound.try_recv() {
            let _ = turn.reply.send(Err(err.clone()));
        }
    }
}

/// 单个会话
pub struct Session {
    id: String,
    runtime: Arc<AgentRuntime>,
    flush_delay: Duration,
    emit_capacity: usize,
    capacity: Option<Arc<Semaphore>>,
    lifecycle: Arc<Lifecycle>,
    supervisor: SessionSupervisor,
    transcript: SharedTranscript,
    checkpoints: Arc<watch::Sender<Option<Checkpoint>>>,
    inbound: Mutex<Option<mpsc::UnboundedSender<HumanTurn>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// 下一个 worker 从编排智能体开始（重启后）
    reroute: AtomicBool,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        runtime: Arc<AgentRuntime>,
        settings: &BridgeSection,
        capacity: Option<Arc<Semaphore>>,
    ) -> Self {
        let (checkpoints, _) = watch::channel(None);
        Self {
            id: id.into(),
            runtime,
            flush_delay: settings.flush_delay(),
            emit_capacity: settings.emit_channel_capacity.max(1),
            capacity,
            lifecycle: Arc::new(Lifecycle::default()),
            supervisor: SessionSupervisor::new(),
            transcript: SharedTranscript::default(),
            checkpoints: Arc::new(checkpoints),
            inbound: Mutex::new(None),
            worker: Mutex::new(None),
            reroute: AtomicBool::new(false),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state.load()
    }

    fn inbound(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<HumanTurn>>> {
        self.inbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 发送一条用户消息并等待本轮合并后的回复
    pub async fn send(&self, message: impl Into<String>) -> Result<String, BridgeError> {
        if let Some(fault) = self.lifecycle.current_fault() {
            return Err(fault);
        }

        let (reply, reply_rx) = oneshot::channel();
        self.enqueue(HumanTurn {
            text: message.into(),
            reply,
        })?;

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(self
                .lifecycle
                .current_fault()
                .unwrap_or(BridgeError::WorkerStopped)),
        }
    }

    /// send 的推荐调用方式：致命错误时重启一次并重放同一条消息
    ///
    /// 重放会再次追加这条用户消息，记录中因此可能出现两次。
    pub async fn send_with_recovery(&self, message: impl Into<String>) -> Result<String, BridgeError> {
        let message = message.into();
        let err = match self.send(message.clone()).await {
            Ok(reply) => return Ok(reply),
            Err(e) => e,
        };
        match self.runtime.recovery.on_send_error(&err) {
            RecoveryAction::RestartSession => {
                tracing::warn!(session = %self.id, error = %err, "Send failed, restarting session and replaying");
                self.restart();
                self.send(message).await
            }
            _ => Err(err),
        }
    }

    /// 投递到入站队列；没有 worker 时抢占启动权并启动
    fn enqueue(&self, turn: HumanTurn) -> Result<(), BridgeError> {
        let mut inbound = self.inbound();
        if let Some(tx) = inbound.as_ref() {
            return tx.send(turn).map_err(|_| {
                self.lifecycle
                    .current_fault()
                    .unwrap_or(BridgeError::WorkerStopped)
            });
        }

        if !self.lifecycle.state.claim() {
            return Err(self.lifecycle.current_fault().unwrap_or(BridgeError::Busy));
        }
        let permit = match &self.capacity {
            Some(semaphore) => match semaphore.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.lifecycle.state.reset();
                    tracing::warn!(session = %self.id, "No worker capacity available");
                    return Err(BridgeError::Busy);
                }
            },
            None => None,
        };

        let tx = self.spawn_worker(permit);
        tx.send(turn).map_err(|_| BridgeError::WorkerStopped)?;
        *inbound = Some(tx);
        Ok(())
    }

    /// 调用方需持有 inbound 锁
    fn spawn_worker(&self, permit: Option<OwnedSemaphorePermit>) -> mpsc::UnboundedSender<HumanTurn> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.supervisor.cancel_token();
        let coalescer = Coalescer::new(self.flush_delay, self.supervisor.child_token());

        let mut routing = self.restore_routing();
        if self.reroute.swap(false, Ordering::SeqCst) {
            routing.recover(self.runtime.roster.orchestrator());
        }

        let worker = Worker {
            session: self.id.clone(),
            coordinator: TurnCoordinator::new(
                self.runtime.clone(),
                self.transcript.next_writer(),
                routing,
                self.checkpoints.clone(),
                cancel.clone(),
            ),
            coalescer,
            emit_capacity: self.emit_capacity,
            inbound: rx,
            lifecycle: self.lifecycle.clone(),
            cancel,
            _permit: permit,
        };
        let handle = tokio::spawn(worker.run());
        *self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
        tx
    }

    /// 最近检查点里的路由状态；没有时从编排智能体开始
    fn restore_routing(&self) -> RoutingState {
        let orchestrator = self.runtime.roster.orchestrator();
        match self.checkpoints.borrow().as_ref() {
            Some(checkpoint) => RoutingState::decode(&checkpoint.routing, &self.runtime.roster)
                .unwrap_or_else(|e| {
                    tracing::warn!(session = %self.id, error = %e, "Stored routing state unusable, starting at orchestrator");
                    RoutingState::new(orchestrator)
                }),
            None => RoutingState::new(orchestrator),
        }
    }

    /// 会话记录快照
    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.transcript.snapshot().into_iter().collect()
    }

    /// "role: content" 行；无记录时返回 None
    pub fn render_history(&self) -> Option<String> {
        self.transcript.snapshot().render()
    }

    /// 替换会话记录；worker 运行时拒绝
    pub fn set_transcript(&self, messages: Vec<ChatMessage>) -> Result<(), BridgeError> {
        let _inbound = self.inbound();
        if self.state() == SessionState::Running {
            return Err(BridgeError::WorkerRunning);
        }
        let len = messages.len();
        self.transcript.replace(Transcript::from(messages));
        self.checkpoints.send_if_modified(|checkpoint| match checkpoint {
            Some(cp) => {
                cp.transcript_len = len;
                true
            }
            None => false,
        });
        Ok(())
    }

    /// 导出路由状态与记录；二者取自同一个检查点
    pub fn export_state(&self, compress: bool) -> Result<String, BridgeError> {
        if let Some(fault) = self.lifecycle.current_fault() {
            return Err(fault);
        }
        let checkpoint = self
            .checkpoints
            .borrow()
            .clone()
            .ok_or(BridgeError::NotRunning)?;
        let transcript = self.transcript.snapshot().prefix(checkpoint.transcript_len);
        let encoded = snapshot::encode(&SessionSnapshot::new(transcript, checkpoint.routing), compress)?;
        tracing::debug!(session = %self.id, compress, bytes = encoded.len(), "Session exported");
        Ok(encoded)
    }

    /// 导入快照；worker 运行时拒绝。任何解码失败都不改变会话
    pub fn import_state(&self, data: &str, compressed: bool) -> Result<(), BridgeError> {
        let _inbound = self.inbound();
        if self.state() == SessionState::Running {
            return Err(BridgeError::WorkerRunning);
        }
        let snapshot = snapshot::decode(data, compressed)?;
        RoutingState::decode(&snapshot.routing, &self.runtime.roster)
            .map_err(|e| BridgeError::InvalidFormat(e.to_string()))?;

        let transcript_len = snapshot.transcript.len();
        self.transcript.replace(snapshot.transcript);
        self.checkpoints.send_replace(Some(Checkpoint {
            routing: snapshot.routing,
            transcript_len,
        }));
        self.reroute.store(false, Ordering::SeqCst);
        tracing::info!(session = %self.id, messages = transcript_len, "Session imported");
        Ok(())
    }

    /// 取消 worker（不等待排空），清除 Faulted，保留记录与路由检查点
    pub fn restart(&self) {
        let mut inbound = self.inbound();
        inbound.take();
        // 分离旧任务：不可中断的能力调用会自然结束，其输出被纪元守卫丢弃
        drop(
            self.worker
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take(),
        );
        self.supervisor.renew();
        self.transcript.revoke_writers();
        self.lifecycle.clear();
        self.reroute.store(true, Ordering::SeqCst);
        tracing::info!(session = %self.id, "Session restarted");
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            state: self.state(),
            transcript_len: self.transcript.len(),
            has_routing_state: self.checkpoints.borrow().is_some(),
            fault: self.lifecycle.current_fault().map(|e| e.to_string()),
            created_at: self.created_at,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.supervisor.cancel();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// 后台 worker：协调器 + 合并器
struct Worker {
    session: String,
    coordinator: TurnCoordinator,
    coalescer: Coalescer,
    emit_capacity: usize,
    inbound: mpsc::UnboundedReceiver<HumanTurn>,
    lifecycle: Arc<Lifecycle>,
    cancel: CancellationToken,
    /// worker 结束时释放容量
    _permit: Option<OwnedSemaphorePermit>,
}

impl Worker {
    async fn run(self) {
        let Worker {
            session,
            mut coordinator,
            coalescer,
            emit_capacity,
            inbound,
            lifecycle,
            cancel,
            _permit,
        } = self;
        tracing::info!(session = %session, agent = %coordinator.routing().active_agent, "Session worker started");

        let (emit_tx, emit_rx) = mpsc::channel(emit_capacity);
        let coalescer_task = tokio::spawn(coalescer.run(emit_rx));
        let mut port = BridgePort {
            inbound,
            emit_tx,
            cancel: cancel.clone(),
            turn_open: false,
        };

        match coordinator.run(&mut port).await {
            Ok(()) => tracing::info!(session = %session, "Session worker stopped"),
            Err(e) => {
                let fault = e.into_fault();
                if lifecycle.record_fault(fault.clone(), &cancel) {
                    tracing::error!(session = %session, error = %fault, "Session worker faulted");
                    port.fail(fault).await;
                } else {
                    tracing::debug!(session = %session, error = %fault, "Stale worker error discarded");
                }
            }
        }

        drop(port);
        let _ = coalescer_task.await;
    }
}
