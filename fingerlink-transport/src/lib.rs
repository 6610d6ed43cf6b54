//! Transport layer for fingerlink
//!
//! Provides the byte channel to the sensor module. The module itself speaks
//! UART; hosts reach it either through a local serial bridge or a
//! serial-to-TCP bridge (ser2net and similar), both of which look like a
//! stream to this crate.

pub mod error;
pub mod tcp;

pub use error::{Error, Result};
pub use tcp::TcpTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;

/// Transport trait for different communication methods
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the channel
    async fn connect(&mut self) -> Result<()>;

    /// Close the channel
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if the channel is open
    fn is_connected(&self) -> bool;

    /// Send raw bytes
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive whatever bytes are available (with timeout)
    ///
    /// May return part of a frame; callers accumulate until a frame decodes.
    async fn receive(&mut self, timeout: Duration) -> Result<BytesMut>;

    /// Describe the remote end for logs
    fn remote_addr(&self) -> String;
}
