//! Quality-of-service dispatch layer between local producers and the egress.
//!
//! Producers hand messages to the [`Handler`]; a single dispatcher task owns
//! a bounded [`PriorityQueue`] and forwards messages to the egress sink one
//! at a time, most important first. Best-effort store-and-forward: under
//! memory pressure the queue sheds the least important traffic, and a failed
//! delivery is retried until it succeeds or is trimmed out.
//!
//! Guarantees:
//! * Priority dominance: of two queued messages with differing priority,
//!   the higher one is delivered first once a delivery slot opens.
//! * Tie-break within a class: newest first by default, oldest first with
//!   `prioritize_oldest` (FIFO for producers that need it).
//! * At most one delivery in flight; the sink never sees concurrent calls.
//! * Deterministic shedding: trim evicts in non-decreasing priority order
//!   until the byte budget holds.
//!
//! Non-guarantees, by design: no persistence, no exactly-once delivery, no
//! fairness between producers, no ordering across priority classes, and no
//! producer-visible acknowledgement beyond enqueued-vs-rejected. Sustained
//! high-priority pressure starves and eventually sheds lower classes; QoS
//! here is a priority, not a share.
//!
//! Design notes:
//! * The handler is a small state machine (`Idle`, `Running`, and a
//!   transient `Stopping` on the way back down). The dispatcher task and
//!   the ingress channel exist exactly while `Running`.
//! * One lifecycle mutex guards start/stop/enqueue, and enqueue holds it
//!   across the channel send. Stop closes that channel, so the serialization
//!   is what keeps a producer from sending into a torn-down channel; parking
//!   producers on the lock is the intended backpressure path.
//! * Stop is fire-and-forget: it signals the dispatcher and returns without
//!   awaiting it. Anything still queued is dropped, and an in-flight
//!   delivery runs to completion with its result discarded.

use std::sync::Arc;

use log::debug;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::egress::MessageSink;
use crate::message::Message;
use crate::metrics;

mod dispatcher;
pub mod queue;

pub use queue::PriorityQueue;

use dispatcher::Dispatcher;

/// Errors produced by the QoS layer.
#[derive(Debug, Error)]
pub enum QosError {
    /// Construction-time configuration violations, all joined.
    #[error("invalid qos configuration: {0}")]
    InvalidConfig(String),

    /// Payload exceeds the per-message limit. Internal: the dispatcher
    /// discards the message and producers never see this.
    #[error("payload of {size} bytes exceeds the {limit} byte per-message limit")]
    OversizeMessage { size: usize, limit: usize },

    /// Enqueue was called while the handler was not running.
    #[error("qos handler is not running")]
    Shutdown,
}

/// Tuning for the queue owned by the dispatcher.
#[derive(Debug, Clone)]
pub struct QosConfig {
    /// Hard cap on the sum of queued payload bytes.
    pub max_queue_bytes: usize,
    /// Per-message payload limit. Must not exceed `max_queue_bytes`.
    pub max_message_bytes: usize,
    /// Serve equal-priority messages oldest first instead of newest first.
    pub prioritize_oldest: bool,
}

impl Default for QosConfig {
    fn default() -> Self {
        QosConfig {
            max_queue_bytes: 1024 * 1024,
            max_message_bytes: 256 * 1024,
            prioritize_oldest: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Stopping,
}

struct LifecycleState {
    state: State,
    ingress_tx: Option<mpsc::Sender<Message>>,
    done_tx: Option<oneshot::Sender<()>>,
}

/// Façade over the dispatcher: start, stop, enqueue.
pub struct Handler {
    config: QosConfig,
    sink: Arc<dyn MessageSink>,
    lifecycle: Mutex<LifecycleState>,
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler").field("config", &self.config).finish()
    }
}

impl Handler {
    /// Validate the configuration and build an idle handler. All violations
    /// are reported together in one [`QosError::InvalidConfig`].
    pub fn new(config: QosConfig, sink: Arc<dyn MessageSink>) -> Result<Self, QosError> {
        let mut violations = Vec::new();
        if config.max_queue_bytes == 0 {
            violations.push("max_queue_bytes must be positive");
        }
        if config.max_message_bytes == 0 {
            violations.push("max_message_bytes must be positive");
        }
        if config.max_message_bytes > config.max_queue_bytes {
            violations.push("max_message_bytes may not exceed max_queue_bytes");
        }
        if !violations.is_empty() {
            return Err(QosError::InvalidConfig(violations.join("; ")));
        }

        Ok(Handler {
            config,
            sink,
            lifecycle: Mutex::new(LifecycleState {
                state: State::Idle,
                ingress_tx: None,
                done_tx: None,
            }),
        })
    }

    /// Launch the dispatcher task. Idempotent: a second start while running
    /// is a no-op.
    pub async fn start(&self) {
        let mut lc = self.lifecycle.lock().await;
        if lc.state == State::Running {
            return;
        }

        // Capacity 1: a producer parks until the dispatcher takes its
        // message, which is the backpressure this layer promises.
        let (ingress_tx, ingress_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = oneshot::channel();
        let queue = PriorityQueue::new(
            self.config.max_queue_bytes,
            self.config.max_message_bytes,
            self.config.prioritize_oldest,
        );
        tokio::spawn(Dispatcher::new(queue, ingress_rx, done_rx, Arc::clone(&self.sink)).run());

        lc.ingress_tx = Some(ingress_tx);
        lc.done_tx = Some(done_tx);
        lc.state = State::Running;
        debug!("qos handler started");
    }

    /// Signal the dispatcher and tear down the ingress channel. Idempotent,
    /// and does not wait for the dispatcher to observe the signal. Queued
    /// messages are dropped; an in-flight delivery completes unobserved.
    pub async fn stop(&self) {
        let mut lc = self.lifecycle.lock().await;
        if lc.state != State::Running {
            return;
        }
        lc.state = State::Stopping;
        if let Some(done) = lc.done_tx.take() {
            let _ = done.send(());
        }
        lc.ingress_tx = None;
        lc.state = State::Idle;
        debug!("qos handler stopped");
    }

    /// Hand a message to the dispatcher. Fails fast with
    /// [`QosError::Shutdown`] when the handler is not running; otherwise the
    /// caller may park here until the dispatcher is ready for the message.
    pub async fn enqueue(&self, msg: Message) -> Result<(), QosError> {
        let lc = self.lifecycle.lock().await;
        let tx = match lc.ingress_tx.as_ref() {
            Some(tx) if lc.state == State::Running => tx,
            _ => {
                metrics::inc_shutdown_rejected();
                return Err(QosError::Shutdown);
            }
        };
        // Lock stays held across the send so stop() cannot close the
        // channel underneath an in-progress producer.
        if tx.send(msg).await.is_err() {
            metrics::inc_shutdown_rejected();
            return Err(QosError::Shutdown);
        }
        Ok(())
    }

    /// True while the dispatcher task is alive and accepting enqueues.
    pub async fn is_running(&self) -> bool {
        self.lifecycle.lock().await.state == State::Running
    }
}
