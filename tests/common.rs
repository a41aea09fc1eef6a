//! Test utilities & fixtures.
//! Provides a scripted egress sink that records deliveries, can park behind
//! a gate, and can fail the first N attempts.

// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

use uplink::egress::MessageSink;
use uplink::message::{Message, Priority};

/// Egress double: parks deliveries while the gate is closed, fails the
/// first `fail_first` attempts, records everything that gets through.
pub struct RecordingSink {
    delivered: Mutex<Vec<Message>>,
    attempts: AtomicUsize,
    fail_first: usize,
    open: watch::Receiver<bool>,
}

/// Controls whether the paired [`RecordingSink`] lets deliveries through.
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    pub fn pause(&self) {
        let _ = self.tx.send(false);
    }
    pub fn resume(&self) {
        let _ = self.tx.send(true);
    }
}

/// Build a sink that fails the first `fail_first` delivery attempts and
/// succeeds afterwards. The gate starts open.
pub fn recording_sink(fail_first: usize) -> (Arc<RecordingSink>, Gate) {
    let (tx, rx) = watch::channel(true);
    (
        Arc::new(RecordingSink {
            delivered: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_first,
            open: rx,
        }),
        Gate { tx },
    )
}

impl RecordingSink {
    pub async fn delivered(&self) -> Vec<Message> {
        self.delivered.lock().await.clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Poll until `n` deliveries have landed or the timeout passes.
    pub async fn wait_for_deliveries(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.delivered.lock().await.len() >= n {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn handle_message(&self, msg: &Message) -> Result<()> {
        let mut open = self.open.clone();
        while !*open.borrow() {
            if open.changed().await.is_err() {
                break;
            }
        }
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            return Err(anyhow!("scripted failure on attempt {}", attempt));
        }
        self.delivered.lock().await.push(msg.clone());
        Ok(())
    }
}

pub fn mk_msg(dest: &str, priority: Priority, bytes: usize) -> Message {
    Message::new(dest, priority, vec![0u8; bytes])
}
