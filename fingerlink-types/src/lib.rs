//! Type definitions for fingerlink

pub mod action;
pub mod error;
pub mod event;
pub mod status;
pub mod template;

pub use action::Action;
pub use error::{Error, Result};
pub use event::{EventType, SensorStatus, StreamEvent};
pub use status::{Failure, FailureReason, OperationKind, OperationStatus, Outcome};
pub use template::{Slot, TemplateRecord};
