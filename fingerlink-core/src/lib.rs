//! # fingerlink-core
//!
//! Wire protocol for serial optical fingerprint sensors (R503 / R30x family).
//!
//! This crate provides the low-level protocol primitives:
//! - Frame structure and encoding/decoding
//! - Checksum calculation
//! - Instruction and confirmation code definitions
//! - Protocol constants
//! - Link session state

pub mod checksum;
pub mod constants;
pub mod error;
pub mod instruction;
pub mod packet;
pub mod params;
pub mod session;

pub use error::{Error, Result};
pub use instruction::{CharBuffer, Confirmation, Instruction};
pub use packet::{Packet, PacketKind, Response};
pub use params::{StatusRegister, SystemParameters};
pub use session::{Session, SessionState};

