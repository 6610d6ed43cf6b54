//! Operation status and domain failures

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::template::Slot;

/// Sensor operation currently in progress
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Idle,
    Enrolling,
    Verifying,
    Deleting,
    Clearing,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Enrolling => "enrolling",
            Self::Verifying => "verifying",
            Self::Deleting => "deleting",
            Self::Clearing => "clearing",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an operation stands
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Pending,
    Success,
    /// Expected domain outcome (no finger, mismatch, ...)
    Failed,
    /// Transport or sensor fault
    Error,
}

impl Outcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }
}

/// Expected, reportable reasons an operation did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    #[error("No finger detected on the sensor")]
    NoFinger,

    #[error("Finger was not removed from the sensor")]
    FingerNotRemoved,

    #[error("Fingerprint image quality too low")]
    BadImage,

    #[error("The two scans did not match")]
    EnrollMismatch,

    #[error("Fingerprint not recognized")]
    NoMatch,

    #[error("No fingerprint stored at slot {0}")]
    SlotEmpty(Slot),

    #[error("Slot {0} is already occupied")]
    SlotOccupied(Slot),

    #[error("Slot {slot} is outside the sensor library (0..{capacity})")]
    SlotOutOfRange { slot: Slot, capacity: u16 },

    #[error("Sensor library is full")]
    StorageFull,

    #[error("Fingerprint already exists at slot {0}")]
    AlreadyEnrolled(Slot),
}

impl Failure {
    pub fn reason(self) -> FailureReason {
        match self {
            Self::NoFinger => FailureReason::NoFinger,
            Self::FingerNotRemoved => FailureReason::FingerNotRemoved,
            Self::BadImage => FailureReason::BadImage,
            Self::EnrollMismatch => FailureReason::Mismatch,
            Self::NoMatch => FailureReason::NoMatch,
            Self::SlotEmpty(_) => FailureReason::SlotEmpty,
            Self::SlotOccupied(_) => FailureReason::SlotOccupied,
            Self::SlotOutOfRange { .. } => FailureReason::SlotOutOfRange,
            Self::StorageFull => FailureReason::StorageFull,
            Self::AlreadyEnrolled(_) => FailureReason::AlreadyEnrolled,
        }
    }

    /// Slot the failure refers to, if any
    pub fn slot(self) -> Option<Slot> {
        match self {
            Self::SlotEmpty(slot)
            | Self::SlotOccupied(slot)
            | Self::AlreadyEnrolled(slot)
            | Self::SlotOutOfRange { slot, .. } => Some(slot),
            _ => None,
        }
    }
}

/// Machine-readable failure tag carried in a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoFinger,
    FingerNotRemoved,
    BadImage,
    Mismatch,
    NoMatch,
    SlotEmpty,
    SlotOccupied,
    SlotOutOfRange,
    StorageFull,
    AlreadyEnrolled,
}

/// Process-wide current status, and the payload fanned out to subscribers
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatus {
    pub kind: OperationKind,
    pub outcome: Outcome,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<Slot>,

    /// Match score reported by the sensor on verify
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl OperationStatus {
    pub fn idle() -> Self {
        Self {
            message: "Ready".to_string(),
            ..Self::default()
        }
    }

    pub fn pending(kind: OperationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            outcome: Outcome::Pending,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn success(kind: OperationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            outcome: Outcome::Success,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn failed(kind: OperationKind, failure: Failure) -> Self {
        Self {
            kind,
            outcome: Outcome::Failed,
            message: failure.to_string(),
            slot: failure.slot(),
            reason: Some(failure.reason()),
            ..Self::default()
        }
    }

    pub fn error(kind: OperationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            outcome: Outcome::Error,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_slot(mut self, slot: Slot) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn with_score(mut self, score: u16) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_idle(&self) -> bool {
        self.kind == OperationKind::Idle
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_idle() && self.outcome.is_terminal()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.kind, self.outcome.as_str(), self.message)
    }
}
