//! 回复合并器
//!
//! 一个用户轮次内智能体可能发出多条消息，调用方却只等待一条回复。每条非空消息追加到缓冲区、
//! 代数加一并启动延迟 flush 定时器；定时器到期时代数未变才真正合并（"\n\n" 连接）并交付。
//! 协调器回到挂起点时封口（Seal），缓冲立即交付，不会与下一轮混在一起。

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::core::BridgeError;
use crate::memory::ChatMessage;

/// 单个用户轮次的回复槽
pub type ReplySlot = oneshot::Sender<Result<String, BridgeError>>;

/// Coordinator → Coalescer 的事件
#[derive(Debug)]
pub enum CoalescerEvent {
    /// 新轮次开始，附带调用方等待的回复槽
    Open(ReplySlot),
    Message(ChatMessage),
    /// 轮次结束
    Seal,
    /// worker 故障，当前轮次以错误结束
    Fail(BridgeError),
}

#[derive(Debug, Default)]
struct CoalesceBuffer {
    pending: Vec<String>,
    generation: u64,
    slot: Option<ReplySlot>,
}

impl CoalesceBuffer {
    /// 合并交付；没有回复槽时丢弃（轮次已交付过的迟到输出只记日志）
    fn deliver(&mut self, cancelled: bool) {
        let joined = self.pending.join("\n\n");
        self.pending.clear();
        match self.slot.take() {
            Some(_) if cancelled => {
                tracing::debug!("Session restarted, dropping reply slot");
            }
            Some(slot) => {
                if slot.send(Ok(joined)).is_err() {
                    tracing::debug!("Caller gone before reply was delivered");
                }
            }
            None if !joined.is_empty() => {
                tracing::debug!(chars = joined.len(), "Late agent output after reply delivered, kept in transcript only");
            }
            None => {}
        }
    }
}

/// 合并器；clone 共享同一缓冲
#[derive(Clone, Debug)]
pub struct Coalescer {
    buffer: Arc<Mutex<CoalesceBuffer>>,
    flush_delay: Duration,
    cancel: CancellationToken,
}

impl Coalescer {
    pub fn new(flush_delay: Duration, cancel: CancellationToken) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(CoalesceBuffer::default())),
            flush_delay,
            cancel,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoalesceBuffer> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 开始新轮次
    pub fn open(&self, slot: ReplySlot) {
        let mut buf = self.lock();
        if buf.slot.is_some() || !buf.pending.is_empty() {
            // 上一轮未封口（不应发生），先交付
            buf.deliver(self.cancel.is_cancelled());
        }
        buf.slot = Some(slot);
    }

    /// 追加一条消息并重新计时；空白消息丢弃且不重新计时。返回本次计时对应的代数
    pub fn push(&self, message: ChatMessage) -> Option<u64> {
        if message.content.trim().is_empty() {
            return None;
        }
        let generation = {
            let mut buf = self.lock();
            buf.pending.push(message.content);
            buf.generation += 1;
            buf.generation
        };

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.flush_delay).await;
            this.fire(generation);
        });
        Some(generation)
    }

    /// 定时器到期：代数未变才交付，返回是否交付
    pub fn fire(&self, generation: u64) -> bool {
        let mut buf = self.lock();
        if buf.generation != generation || buf.pending.is_empty() {
            return false;
        }
        buf.deliver(self.cancel.is_cancelled());
        true
    }

    /// 封口：缓冲立即交付；本轮没有任何文本时交付空字符串
    pub fn seal(&self) {
        let mut buf = self.lock();
        buf.generation += 1;
        buf.deliver(self.cancel.is_cancelled());
    }

    /// 以错误结束当前轮次
    pub fn fail(&self, err: BridgeError) {
        let mut buf = self.lock();
        buf.generation += 1;
        buf.pending.clear();
        if let Some(slot) = buf.slot.take() {
            let _ = slot.send(Err(err));
        }
    }

    /// 消费事件直到发送端全部关闭
    pub async fn run(self, mut rx: mpsc::Receiver<CoalescerEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                CoalescerEvent::Open(slot) => self.open(slot),
                CoalescerEvent::Message(message) => {
                    tracing::debug!(agent = ?message.produced_by, "Agent message");
                    self.push(message);
                }
                CoalescerEvent::Seal => self.seal(),
                CoalescerEvent::Fail(err) => self.fail(err),
            }
        }
        let mut buf = self.lock();
        buf.generation += 1;
        buf.pending.clear();
        // 未交付的槽在此丢弃，调用方收到 WorkerStopped
        buf.slot = None;
    }
}
