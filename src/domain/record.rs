//! Event records as stored in the inbox log and as handed to the listener.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single inbound event with its delivery flag.
///
/// The `sequence` is assigned by the store at append time and never changes,
/// so it is the only ordering key used for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Position in the log (monotonically increasing)
    pub sequence: u64,

    /// Origin of the event (e.g. a phone number)
    pub sender: String,

    /// Event payload
    pub body: String,

    /// Whether the record has been handed to the listener
    pub delivered: bool,

    /// When the receiver handed the event to us (absent for legacy entries)
    pub received_at: Option<DateTime<Utc>>,
}

impl EventRecord {
    /// Build the payload pushed to the listener
    pub fn to_delivery(&self) -> Delivery {
        Delivery {
            sequence: self.sequence,
            sender: self.sender.clone(),
            body: self.body.clone(),
        }
    }
}

/// On-disk shape of one log line.
///
/// Every field added after the first release must be optional with a safe
/// default, so old logs stay readable. Older logs used `from` for the sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(alias = "from")]
    pub sender: String,

    pub body: String,

    #[serde(default)]
    pub emitted: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    pub fn new(sequence: u64, sender: &str, body: &str) -> Self {
        Self {
            sender: sender.to_string(),
            body: body.to_string(),
            emitted: false,
            seq: Some(sequence),
            received_at: Some(Utc::now()),
        }
    }

    /// Convert to the in-memory record. Callers must have assigned `seq`.
    pub fn to_record(&self) -> EventRecord {
        EventRecord {
            sequence: self.seq.unwrap_or_default(),
            sender: self.sender.clone(),
            body: self.body.clone(),
            delivered: self.emitted,
            received_at: self.received_at,
        }
    }
}

/// What the listener receives for each delivered record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub sequence: u64,
    pub sender: String,
    pub body: String,
}
