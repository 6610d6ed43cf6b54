//! Session controller
//!
//! Serializes sensor operations behind one non-queuing lock, publishes
//! their progress and keeps the template registry in step with the module.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use fingerlink_core::SystemParameters;
use fingerlink_transport::Transport;
use fingerlink_types::{
    Action, Failure, FailureReason, OperationKind, OperationStatus, Outcome, SensorStatus, Slot,
    TemplateRecord,
};

use crate::broadcast::{StatusBroadcaster, Subscription};
use crate::config::{Config, ScanPolicy};
use crate::dispatch::{ActionDispatcher, LogDispatcher};
use crate::error::{Error, Result};
use crate::indicator::Cue;
use crate::link::SensorLink;
use crate::operation;
use crate::registry::TemplateRegistry;
use crate::steps::Steps;

const PLACE_FINGER: &str = "Place your finger on the sensor";

/// Registry changes made by [`SessionController::reconcile`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub added: Vec<Slot>,
    pub removed: Vec<Slot>,
}

/// Front door to the sensor
///
/// Cheap to clone; clones share the same sensor, registry and status.
///
/// # Examples
///
/// ```no_run
/// use fingerlink::{Config, ControllerBuilder};
/// use fingerlink::transport::TcpTransport;
///
/// #[tokio::main]
/// async fn main() -> fingerlink::Result<()> {
///     let config = Config::from_env()?;
///     let transport = TcpTransport::parse(&config.sensor_addr)?;
///     let controller = ControllerBuilder::from_config(&config, Box::new(transport))?.build();
///
///     controller.connect().await?;
///
///     let status = controller.begin_verify().await?;
///     println!("{}", status);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    link: SensorLink,
    registry: TemplateRegistry,
    broadcaster: StatusBroadcaster,
    dispatcher: Arc<dyn ActionDispatcher>,
    policy: ScanPolicy,
    op_lock: Mutex<()>,
    status: parking_lot::Mutex<OperationStatus>,
}

pub struct ControllerBuilder {
    link: SensorLink,
    registry: TemplateRegistry,
    dispatcher: Arc<dyn ActionDispatcher>,
    policy: ScanPolicy,
    subscriber_queue: usize,
}

impl ControllerBuilder {
    pub fn new(link: SensorLink) -> Self {
        Self {
            link,
            registry: TemplateRegistry::in_memory(),
            dispatcher: Arc::new(LogDispatcher),
            policy: ScanPolicy::default(),
            subscriber_queue: 8,
        }
    }

    /// Wire a link and registry from `config`
    pub fn from_config(config: &Config, transport: Box<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let link = SensorLink::from_boxed(transport)
            .with_address(config.address)
            .with_password(config.password)
            .with_timeout(config.exchange_timeout);

        Ok(Self::new(link)
            .registry(TemplateRegistry::open(&config.registry_path))
            .policy(config.scan.clone())
            .subscriber_queue(config.subscriber_queue))
    }

    pub fn registry(mut self, registry: TemplateRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn policy(mut self, policy: ScanPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn subscriber_queue(mut self, depth: usize) -> Self {
        self.subscriber_queue = depth;
        self
    }

    pub fn build(self) -> SessionController {
        SessionController {
            inner: Arc::new(Inner {
                link: self.link,
                registry: self.registry,
                broadcaster: StatusBroadcaster::new(self.subscriber_queue),
                dispatcher: self.dispatcher,
                policy: self.policy,
                op_lock: Mutex::new(()),
                status: parking_lot::Mutex::new(OperationStatus::idle()),
            }),
        }
    }
}

impl SessionController {
    pub fn builder(link: SensorLink) -> ControllerBuilder {
        ControllerBuilder::new(link)
    }

    /// Handshake with the sensor and drop records beyond its capacity
    pub async fn connect(&self) -> Result<SystemParameters> {
        let inner = &self.inner;
        let _lock = inner.op_lock.try_lock().map_err(|_| Error::Busy)?;

        let params = inner.link.connect().await?;
        inner.registry.retain_below(inner.link.capacity())?;

        Ok(params)
    }

    /// Check if the last sensor exchange succeeded
    pub fn is_connected(&self) -> bool {
        self.inner.link.is_connected()
    }

    /// Enroll a finger into the lowest free slot
    ///
    /// Returns the terminal status; `Err` only when the sensor is busy or
    /// the name is invalid.
    pub async fn begin_enroll(&self, name: Option<&str>) -> Result<OperationStatus> {
        self.enroll(None, name).await
    }

    /// Enroll a finger into a specific slot
    pub async fn begin_enroll_at(&self, slot: Slot, name: Option<&str>) -> Result<OperationStatus> {
        self.enroll(Some(slot), name).await
    }

    pub async fn begin_verify(&self) -> Result<OperationStatus> {
        let inner = &self.inner;
        let guard = inner.begin(OperationKind::Verifying, PLACE_FINGER)?;
        let steps = inner.steps();

        let result = operation::identify(&steps).await.map(|found| {
            let label = match inner.registry.get(found.slot) {
                Some(record) => {
                    if record.action.is_bound() {
                        inner.dispatch(found.slot, record.action);
                    }
                    record.label()
                }
                None => format!("slot {}", found.slot),
            };

            OperationStatus::success(
                OperationKind::Verifying,
                format!("Fingerprint recognized: {}", label),
            )
            .with_slot(found.slot)
            .with_score(found.score)
        });

        Ok(guard.finish(result).await)
    }

    /// Delete the template at `slot`, or the one matching a scanned finger
    pub async fn begin_delete(&self, slot: Option<Slot>) -> Result<OperationStatus> {
        let inner = &self.inner;
        let message = match slot {
            Some(slot) => format!("Deleting fingerprint at slot {}", slot),
            None => "Place the finger to delete on the sensor".to_string(),
        };
        let guard = inner.begin(OperationKind::Deleting, &message)?;
        let steps = inner.steps();

        let result = inner.delete(&steps, slot).await;

        Ok(guard.finish(result).await)
    }

    /// Erase every template from the sensor, then the registry
    pub async fn begin_clear(&self) -> Result<OperationStatus> {
        let inner = &self.inner;
        let guard = inner.begin(OperationKind::Clearing, "Clearing all fingerprints")?;
        let steps = inner.steps();

        let result = inner.clear(&steps).await;

        Ok(guard.finish(result).await)
    }

    /// Number of templates stored on the sensor
    ///
    /// Does not take the operation lock; the single exchange waits for the
    /// link instead.
    pub async fn get_count(&self) -> Result<u16> {
        self.inner.steps().count().await
    }

    pub async fn sensor_status(&self) -> SensorStatus {
        match self.get_count().await {
            Ok(count) => SensorStatus {
                connected: true,
                message: format!("Sensor connected. {} fingerprints stored.", count),
            },
            Err(e) => SensorStatus {
                connected: false,
                message: format!("Sensor not available: {}", e),
            },
        }
    }

    pub fn list_templates(&self) -> Vec<TemplateRecord> {
        self.inner.registry.list()
    }

    /// Rename a template; allowed while an operation is running
    pub fn rename_template(&self, slot: Slot, name: &str) -> Result<TemplateRecord> {
        let record = self.inner.registry.rename(slot, name)?;
        info!(slot, name = ?record.name, "Template renamed");
        Ok(record)
    }

    /// Bind an action to a template; allowed while an operation is running
    pub fn set_template_action(&self, slot: Slot, action: Action) -> Result<TemplateRecord> {
        let record = self.inner.registry.set_action(slot, action)?;
        info!(slot, %action, "Template action updated");
        Ok(record)
    }

    /// Make the registry match the sensor's occupancy
    pub async fn reconcile(&self) -> Result<Reconciliation> {
        let inner = &self.inner;
        let _lock = inner.op_lock.try_lock().map_err(|_| Error::Busy)?;

        let occupied = inner.steps().index_table().await?;
        let (added, removed) = inner.registry.reconcile(&occupied)?;

        Ok(Reconciliation { added, removed })
    }

    /// Receive status updates, starting with the current status
    pub fn subscribe(&self) -> Subscription {
        let current = self.inner.status.lock();
        self.inner.broadcaster.subscribe_with(current.clone())
    }

    pub fn current_status(&self) -> OperationStatus {
        self.inner.status.lock().clone()
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.inner.registry
    }

    pub fn link(&self) -> &SensorLink {
        &self.inner.link
    }

    async fn enroll(&self, requested: Option<Slot>, name: Option<&str>) -> Result<OperationStatus> {
        let name = match name {
            Some(name) => TemplateRecord::normalize_name(name)?,
            None => None,
        };

        let inner = &self.inner;
        let guard = inner.begin(OperationKind::Enrolling, PLACE_FINGER)?;
        let steps = inner.steps();

        let progress = |message: &str| guard.progress(message);
        let result = match operation::enroll(&steps, requested, &progress).await {
            Ok(slot) => inner.record_enrollment(&steps, slot, name).await,
            Err(e) => Err(e),
        };

        Ok(guard.finish(result).await)
    }
}

impl Inner {
    fn steps(&self) -> Steps<'_> {
        Steps::new(&self.link, &self.policy)
    }

    /// Take the operation lock and announce the start
    fn begin(&self, kind: OperationKind, message: &str) -> Result<OperationGuard<'_>> {
        let lock = self.op_lock.try_lock().map_err(|_| Error::Busy)?;

        info!(%kind, "Operation started");
        self.publish(OperationStatus::pending(kind, message));

        Ok(OperationGuard {
            inner: self,
            kind,
            finished: false,
            _lock: lock,
        })
    }

    fn publish(&self, status: OperationStatus) {
        let mut current = self.status.lock();
        *current = status.clone();
        self.broadcaster.publish(status);
    }

    /// Map an aborted sequence onto its terminal status
    fn settle(&self, kind: OperationKind, error: Error) -> OperationStatus {
        match error {
            Error::Failed(failure) => {
                info!(%kind, %failure, "Operation failed");
                OperationStatus::failed(kind, failure)
            }
            e if e.is_transport() => {
                warn!(%kind, error = %e, "Sensor communication failed");
                OperationStatus::error(kind, format!("Sensor communication error: {}", e))
            }
            e => {
                warn!(%kind, error = %e, "Operation error");
                OperationStatus::error(kind, e.to_string())
            }
        }
    }

    async fn record_enrollment(
        &self,
        steps: &Steps<'_>,
        slot: Slot,
        name: Option<String>,
    ) -> Result<OperationStatus> {
        let record = TemplateRecord::enrolled(slot, name);
        let label = record.label();

        if let Err(e) = self.registry.put(record) {
            warn!(slot, error = %e, "Registry write failed, removing template from sensor");
            if let Err(rollback) = steps.delete(slot).await {
                warn!(slot, error = %rollback, "Rollback failed, reconcile to repair");
            }
            return Err(e);
        }

        Ok(OperationStatus::success(
            OperationKind::Enrolling,
            format!("Fingerprint enrolled: {}", label),
        )
        .with_slot(slot))
    }

    async fn delete(&self, steps: &Steps<'_>, slot: Option<Slot>) -> Result<OperationStatus> {
        let slot = match slot {
            Some(slot) => match operation::delete_slot(steps, slot).await {
                Ok(()) => slot,
                Err(Error::Failed(Failure::SlotEmpty(_))) if self.registry.contains(slot) => {
                    warn!(slot, "Sensor slot already empty, dropping its record");
                    slot
                }
                Err(e) => return Err(e),
            },
            None => operation::delete_by_scan(steps).await?,
        };

        let label = match self.registry.remove(slot)? {
            Some(record) => record.label(),
            None => format!("slot {}", slot),
        };

        Ok(OperationStatus::success(
            OperationKind::Deleting,
            format!("Deleted fingerprint {}", label),
        )
        .with_slot(slot))
    }

    /// Sensor first; the registry is only wiped once the module confirmed
    async fn clear(&self, steps: &Steps<'_>) -> Result<OperationStatus> {
        steps.empty().await?;

        let removed = self.registry.remove_all()?;
        info!(removed, "Registry cleared");

        Ok(OperationStatus::success(
            OperationKind::Clearing,
            "All fingerprints deleted",
        ))
    }

    /// Fire the bound action without holding up the verify
    fn dispatch(&self, slot: Slot, action: Action) {
        let dispatcher = Arc::clone(&self.dispatcher);

        tokio::spawn(async move {
            let report = dispatcher.dispatch(action).await;

            if report.ok {
                info!(slot, %action, message = %report.message, "Action dispatched");
            } else {
                warn!(slot, %action, message = %report.message, "Action dispatch failed");
            }
        });
    }

    async fn show(&self, status: &OperationStatus) {
        let cue = match status.outcome {
            Outcome::Pending => return,
            Outcome::Success => Cue::Success,
            Outcome::Failed if status.reason == Some(FailureReason::AlreadyEnrolled) => Cue::Duplicate,
            Outcome::Failed => Cue::Failure,
            Outcome::Error if self.link.is_connected() => Cue::Error,
            Outcome::Error => return,
        };

        self.steps().indicate(cue).await;
    }
}

/// Held for the lifetime of one operation
///
/// Publishes the terminal status and the return to idle before the lock is
/// released. An operation dropped before [`OperationGuard::finish`] (a
/// cancelled future or a panic) still ends in an error status and idle.
struct OperationGuard<'a> {
    inner: &'a Inner,
    kind: OperationKind,
    finished: bool,
    _lock: MutexGuard<'a, ()>,
}

impl OperationGuard<'_> {
    fn progress(&self, message: &str) {
        self.inner.publish(OperationStatus::pending(self.kind, message));
    }

    async fn finish(mut self, result: Result<OperationStatus>) -> OperationStatus {
        let status = match result {
            Ok(status) => {
                info!(kind = %self.kind, message = %status.message, "Operation succeeded");
                status
            }
            Err(e) => self.inner.settle(self.kind, e),
        };

        self.inner.show(&status).await;

        self.inner.publish(status.clone());
        self.inner.publish(OperationStatus::idle());
        self.finished = true;

        status
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(kind = %self.kind, "Operation aborted");
            self.inner
                .publish(OperationStatus::error(self.kind, "Operation aborted"));
            self.inner.publish(OperationStatus::idle());
        }
    }
}
