//! # fingerlink
//!
//! Network-facing session controller for serial optical fingerprint
//! sensors (R503 / R30x family).
//!
//! ## Features
//!
//! - One sensor operation at a time; concurrent callers get `Busy`
//! - Enroll, verify, delete (by slot or by scan), clear and count
//! - Live status fan-out to any number of subscribers
//! - Persistent slot metadata with actions fired on verify
//!
//! ## Quick Start
//!
//! ```no_run
//! use fingerlink::{ControllerBuilder, TemplateRegistry};
//! use fingerlink::link::SensorLink;
//! use fingerlink::transport::TcpTransport;
//!
//! #[tokio::main]
//! async fn main() -> fingerlink::Result<()> {
//!     // Sensor behind a serial-to-TCP bridge
//!     let link = SensorLink::new(TcpTransport::new("192.168.1.40", 2000));
//!     let controller = ControllerBuilder::new(link)
//!         .registry(TemplateRegistry::open("fingerprints.json"))
//!         .build();
//!
//!     controller.connect().await?;
//!
//!     let status = controller.begin_enroll(Some("Alice")).await?;
//!     println!("{}", status);
//!
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod indicator;
pub mod link;
pub mod operation;
pub mod registry;
pub mod steps;

#[cfg(test)]
mod sim;

// Re-exports
pub use broadcast::{StatusBroadcaster, Subscription};
pub use config::{Config, ScanPolicy};
pub use controller::{ControllerBuilder, Reconciliation, SessionController};
pub use dispatch::{ActionDispatcher, DispatchReport, LogDispatcher};
pub use error::{Error, Result};
pub use link::SensorLink;
pub use registry::TemplateRegistry;

pub use fingerlink_transport as transport;

// Re-export types
pub use fingerlink_core::SystemParameters;
pub use fingerlink_types::{
    Action, EventType, Failure, FailureReason, OperationKind, OperationStatus, Outcome,
    SensorStatus, Slot, StreamEvent, TemplateRecord,
};
