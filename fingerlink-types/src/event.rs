//! Stream payloads

use serde::{Deserialize, Serialize};

use crate::status::{OperationStatus, Outcome};
use crate::template::Slot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Status,
    Error,
    Connection,
}

/// One message on the status stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<Slot>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<u16>,
}

impl StreamEvent {
    /// Greeting sent when a stream client attaches
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Connection,
            status: None,
            message: message.into(),
            slot: None,
            accuracy: None,
        }
    }
}

impl From<&OperationStatus> for StreamEvent {
    fn from(status: &OperationStatus) -> Self {
        let (event_type, label) = if status.is_idle() {
            (EventType::Status, "idle")
        } else {
            match status.outcome {
                Outcome::Error => (EventType::Error, Outcome::Error.as_str()),
                Outcome::Pending => (EventType::Status, status.kind.as_str()),
                outcome => (EventType::Status, outcome.as_str()),
            }
        };

        Self {
            event_type,
            status: Some(label.to_string()),
            message: status.message.clone(),
            slot: status.slot,
            accuracy: status.score,
        }
    }
}

impl From<OperationStatus> for StreamEvent {
    fn from(status: OperationStatus) -> Self {
        Self::from(&status)
    }
}

/// Sensor reachability summary for a status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorStatus {
    pub connected: bool,
    pub message: String,
}
