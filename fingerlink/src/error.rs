//! High-level error types

use std::path::PathBuf;

use fingerlink_core::{Confirmation, Instruction};
use fingerlink_types::{Failure, Slot};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Another sensor operation holds the operation lock
    #[error("Sensor is busy with another operation")]
    Busy,

    /// Expected domain outcome, reported as `failed`
    #[error(transparent)]
    Failed(#[from] Failure),

    #[error("No template metadata for slot {0}")]
    UnknownSlot(Slot),

    #[error("Sensor did not answer in time")]
    LinkTimeout,

    #[error("Link error: {0}")]
    Transport(#[from] fingerlink_transport::Error),

    #[error("Frame error: {0}")]
    Frame(#[from] fingerlink_core::Error),

    /// Confirmation code the controller has no domain meaning for
    #[error("Sensor rejected {instruction}: {code}")]
    Sensor {
        instruction: Instruction,
        code: Confirmation,
    },

    #[error("Sensor rejected the handshake password")]
    WrongPassword,

    #[error("Registry storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Registry serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Type error: {0}")]
    Types(#[from] fingerlink_types::Error),
}

impl Error {
    /// Expected outcome, if this is one
    pub fn failure(&self) -> Option<Failure> {
        match self {
            Self::Failed(failure) => Some(*failure),
            _ => None,
        }
    }

    /// Check if this is an expected domain outcome
    pub fn is_failure(&self) -> bool {
        self.failure().is_some()
    }

    /// Check if the link to the sensor should be presumed stale
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::LinkTimeout | Self::Transport(_) | Self::Frame(_))
    }
}
