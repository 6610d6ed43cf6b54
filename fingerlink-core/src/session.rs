//! Link session state
//!
//! A session represents the host's view of one attached module and tracks:
//! - Connection state (stale after a transport failure)
//! - Exchange counter (increments per command, used to correlate logs)
//! - Library capacity reported by the module

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use crate::constants::DEFAULT_CAPACITY;
use crate::error::{Error, Result};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No channel, or the last exchange failed at the transport level
    Disconnected,

    /// Channel open and the last exchange succeeded
    Connected,

    /// Connected and the module accepted the password
    Verified,
}

/// Session tracker
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Exchanges issued since the session was created
    exchange_counter: AtomicU64,

    /// Library capacity (DEFAULT_CAPACITY until the module reports one)
    capacity: AtomicU16,

    /// Current session state
    state: parking_lot::RwLock<SessionState>,
}

impl Session {
    /// Create a new disconnected session
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                exchange_counter: AtomicU64::new(0),
                capacity: AtomicU16::new(DEFAULT_CAPACITY),
                state: parking_lot::RwLock::new(SessionState::Disconnected),
            }),
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        !matches!(self.state(), SessionState::Disconnected)
    }

    /// Check if the password handshake completed
    pub fn is_verified(&self) -> bool {
        matches!(self.state(), SessionState::Verified)
    }

    /// Library capacity
    pub fn capacity(&self) -> u16 {
        self.inner.capacity.load(Ordering::Acquire)
    }

    /// Record the capacity reported by the module
    pub fn set_capacity(&self, capacity: u16) {
        self.inner.capacity.store(capacity, Ordering::Release);
    }

    /// Mark the password as accepted
    pub fn verify(&self) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state == SessionState::Disconnected {
            return Err(Error::InvalidSessionState(format!(
                "Cannot verify from state: {:?}",
                *state
            )));
        }

        *state = SessionState::Verified;
        Ok(())
    }

    /// Record a completed exchange
    ///
    /// A stale session becomes connected again; a verified one stays verified.
    pub fn record_success(&self) {
        let mut state = self.inner.state.write();

        if *state == SessionState::Disconnected {
            *state = SessionState::Connected;
        }
    }

    /// Mark the channel as possibly stale after a transport failure
    pub fn mark_stale(&self) {
        *self.inner.state.write() = SessionState::Disconnected;
    }

    /// Close session
    pub fn close(&self) {
        self.inner.capacity.store(DEFAULT_CAPACITY, Ordering::Release);
        *self.inner.state.write() = SessionState::Disconnected;
    }

    /// Get next exchange ID
    pub fn next_exchange_id(&self) -> u64 {
        self.inner.exchange_counter.fetch_add(1, Ordering::AcqRel)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
