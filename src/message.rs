//! Message model shared by producers, the QoS dispatcher, and the egress.
//!
//! A [`Message`] is the opaque unit of work the agent relays: the core never
//! inspects the payload or the destination, it only dispatches on the
//! [`Priority`] class. Producers speak numeric 0–99 QoS values on the wire;
//! [`Priority::from_qos`] folds those into the four dispatch bands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dispatch priority class. Higher variants are served first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Map a numeric 0–99 QoS value onto a priority band. Values above 99
    /// clamp to `Critical`.
    pub fn from_qos(value: u8) -> Self {
        match value {
            0..=24 => Priority::Low,
            25..=49 => Priority::Medium,
            50..=74 => Priority::High,
            _ => Priority::Critical,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// The unit of work relayed end-to-end.
///
/// Everything except `priority` is opaque to the QoS core: `dest` and
/// `content_type` are routing hints for the remote service, `submitted_at`
/// is producer wall-clock metadata (ordering always uses a monotonic ingest
/// timestamp taken inside the queue, never this field).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub dest: String,
    pub content_type: Option<String>,
    pub priority: Priority,
    pub submitted_at: DateTime<Utc>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(dest: impl Into<String>, priority: Priority, payload: Vec<u8>) -> Self {
        Message {
            id: Uuid::new_v4(),
            dest: dest.into(),
            content_type: None,
            priority,
            submitted_at: Utc::now(),
            payload,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Payload length in bytes; the quantity the queue budget accounts in.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}
