//! Dispatcher task: drains the ingress channel into the priority queue and
//! drives at-most-one in-flight delivery to the egress sink.
//!
//! The single-slot discipline is the guarantee the egress depends on: the
//! downstream connection is not assumed safe for concurrent writers, so a
//! new delivery launches only after the previous one reported back. Delivery
//! failures are treated as transient; the failed message re-enters the queue
//! with a fresh ingest timestamp and the error itself is dropped.

use std::sync::Arc;

use log::{debug, trace, warn};
use tokio::sync::{mpsc, oneshot};

use crate::egress::MessageSink;
use crate::message::Message;
use crate::metrics;
use crate::qos::queue::PriorityQueue;

/// `None` when the sink accepted the message, `Some(msg)` when the attempt
/// failed and the message should be retried.
type DeliveryOutcome = Option<Message>;

pub(crate) struct Dispatcher {
    queue: PriorityQueue,
    ingress: mpsc::Receiver<Message>,
    done: oneshot::Receiver<()>,
    sink: Arc<dyn MessageSink>,
    /// Present iff a delivery is in flight. Resolves exactly once per
    /// launched delivery, success or failure.
    in_flight: Option<oneshot::Receiver<DeliveryOutcome>>,
}

impl Dispatcher {
    pub(crate) fn new(
        queue: PriorityQueue,
        ingress: mpsc::Receiver<Message>,
        done: oneshot::Receiver<()>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Dispatcher {
            queue,
            ingress,
            done,
            sink,
            in_flight: None,
        }
    }

    /// Event loop. `biased` keeps the arms in a fixed order so the done
    /// signal is always observed before new ingress is accepted; shutdown
    /// must not drain the ingress channel.
    pub(crate) async fn run(mut self) {
        debug!("qos dispatcher running");
        loop {
            tokio::select! {
                biased;

                _ = &mut self.done => {
                    break;
                }

                outcome = Self::delivery_finished(&mut self.in_flight), if self.in_flight.is_some() => {
                    self.in_flight = None;
                    match outcome {
                        Ok(Some(msg)) => {
                            metrics::inc_delivery_retried();
                            trace!("re-queueing message {} after failed delivery", msg.id);
                            self.absorb(msg);
                        }
                        Ok(None) => metrics::inc_delivered(),
                        Err(_) => warn!("delivery task dropped its report; message lost"),
                    }
                    self.launch_next();
                }

                received = self.ingress.recv() => {
                    match received {
                        Some(msg) => {
                            self.absorb(msg);
                            self.launch_next();
                        }
                        None => break,
                    }
                }
            }
        }
        if !self.queue.is_empty() {
            debug!(
                "dispatcher exiting; dropping {} queued messages ({} bytes)",
                self.queue.len(),
                self.queue.size_bytes()
            );
        }
    }

    /// Resolve the in-flight slot. Callers gate on `in_flight.is_some()`;
    /// the pending branch keeps the future total without that precondition.
    async fn delivery_finished(
        slot: &mut Option<oneshot::Receiver<DeliveryOutcome>>,
    ) -> Result<DeliveryOutcome, oneshot::error::RecvError> {
        match slot.as_mut() {
            Some(rx) => rx.await,
            None => std::future::pending().await,
        }
    }

    /// Enqueue into the priority queue. Oversize rejection and trim eviction
    /// end here; producers are fire-and-forget and never see either.
    fn absorb(&mut self, msg: Message) {
        match self.queue.enqueue(msg) {
            Ok(()) => metrics::inc_enqueued(),
            Err(err) => {
                debug!("discarding message: {}", err);
                metrics::inc_oversize_discarded();
            }
        }
    }

    /// Dequeue and hand the next message to a delivery task, unless one is
    /// already in flight or the queue is empty.
    fn launch_next(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let msg = match self.queue.dequeue() {
            Some(msg) => msg,
            None => return,
        };

        let (report, slot) = oneshot::channel();
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            let outcome = match sink.handle_message(&msg).await {
                Ok(()) => None,
                Err(err) => {
                    debug!("delivery of {} failed: {:#}", msg.id, err);
                    Some(msg)
                }
            };
            let _ = report.send(outcome);
        });
        self.in_flight = Some(slot);
    }
}
