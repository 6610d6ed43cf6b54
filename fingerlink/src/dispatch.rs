//! Action dispatch contract

use async_trait::async_trait;
use tracing::info;

use fingerlink_types::Action;

/// Result of one dispatched action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub ok: bool,
    pub message: String,
}

impl DispatchReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Executes the action bound to a verified template
///
/// Implementations talk to whatever the action drives (a smart plug, a
/// relay, ...). They report failure in the [`DispatchReport`]; the
/// controller logs it and never lets it affect the verify outcome.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, action: Action) -> DispatchReport;
}

/// Dispatcher that only logs, for setups without a downstream device
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl ActionDispatcher for LogDispatcher {
    async fn dispatch(&self, action: Action) -> DispatchReport {
        info!(%action, "No dispatcher configured, action logged only");
        DispatchReport::ok(format!("Action '{}' logged", action))
    }
}
