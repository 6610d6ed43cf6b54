//! Operation sequences
//!
//! Multi-step flows over the sensor. They talk to the module only; the
//! controller owns locking, status publishing and the registry.

use std::fmt;

use tracing::{debug, info};

use fingerlink_core::CharBuffer;
use fingerlink_types::{Failure, Slot};

use crate::error::{Error, Result};
use crate::indicator::Cue;
use crate::steps::{Match, Steps};

/// Enroll progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollState {
    WaitFinger1,
    Capture1,
    WaitRemove,
    WaitFinger2,
    Capture2,
    Merge,
    CheckDuplicate,
    FindFreeSlot,
    Store,
    Done(Slot),
}

impl fmt::Display for EnrollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done(slot) => write!(f, "Done({})", slot),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Enroll one finger into `requested` or the lowest free slot
///
/// `progress` is called once, when the person has to lift and place the
/// finger again.
pub async fn enroll(
    steps: &Steps<'_>,
    requested: Option<Slot>,
    progress: &(dyn Fn(&str) + Send + Sync),
) -> Result<Slot> {
    let capacity = steps.capacity();
    if let Some(slot) = requested {
        if slot >= capacity {
            return Err(Failure::SlotOutOfRange { slot, capacity }.into());
        }
    }

    let mut state = EnrollState::WaitFinger1;
    let mut attempts = 0u8;
    let mut slot = None;

    loop {
        debug!(%state, "Enroll step");

        state = match state {
            EnrollState::WaitFinger1 => {
                steps.indicate(Cue::Waiting).await;
                match steps.wait_for_finger().await {
                    Ok(()) => EnrollState::Capture1,
                    Err(Error::Failed(Failure::BadImage)) => {
                        retry(steps, &mut attempts, EnrollState::WaitFinger1)?
                    }
                    Err(e) => return Err(e),
                }
            }
            EnrollState::Capture1 => {
                if steps.characterize(CharBuffer::One).await? {
                    attempts = 0;
                    progress("Remove finger, then place the same finger again");
                    EnrollState::WaitRemove
                } else {
                    retry(steps, &mut attempts, EnrollState::WaitFinger1)?
                }
            }
            EnrollState::WaitRemove => {
                steps.indicate(Cue::Remove).await;
                steps.wait_for_removal().await?;
                steps.indicate(Cue::Waiting).await;
                EnrollState::WaitFinger2
            }
            EnrollState::WaitFinger2 => match steps.wait_for_finger().await {
                Ok(()) => EnrollState::Capture2,
                Err(Error::Failed(Failure::BadImage)) => {
                    retry(steps, &mut attempts, EnrollState::WaitFinger2)?
                }
                Err(e) => return Err(e),
            },
            EnrollState::Capture2 => {
                if steps.characterize(CharBuffer::Two).await? {
                    EnrollState::Merge
                } else {
                    retry(steps, &mut attempts, EnrollState::WaitFinger2)?
                }
            }
            EnrollState::Merge => {
                steps.merge().await?;
                if steps.policy().reject_duplicates {
                    EnrollState::CheckDuplicate
                } else {
                    EnrollState::FindFreeSlot
                }
            }
            EnrollState::CheckDuplicate => match steps.search(CharBuffer::One).await? {
                Some(found) => {
                    info!(slot = found.slot, score = found.score, "Finger already enrolled");
                    return Err(Failure::AlreadyEnrolled(found.slot).into());
                }
                None => EnrollState::FindFreeSlot,
            },
            EnrollState::FindFreeSlot => {
                let target = match requested {
                    Some(slot) => {
                        if steps.occupied(slot).await? {
                            return Err(Failure::SlotOccupied(slot).into());
                        }
                        slot
                    }
                    None => steps.free_slot().await?.ok_or(Failure::StorageFull)?,
                };

                slot = Some(target);
                EnrollState::Store
            }
            EnrollState::Store => {
                let target = slot.ok_or(Failure::StorageFull)?;
                steps.store(CharBuffer::One, target).await?;
                EnrollState::Done(target)
            }
            EnrollState::Done(slot) => return Ok(slot),
        };
    }
}

/// Count a rejected capture and decide where to go next
fn retry(steps: &Steps<'_>, attempts: &mut u8, back_to: EnrollState) -> Result<EnrollState> {
    *attempts += 1;

    if *attempts >= steps.policy().capture_attempts.max(1) {
        return Err(Failure::BadImage.into());
    }

    debug!(attempts = *attempts, "Capture failed, retrying");
    Ok(back_to)
}

/// Capture a finger and find it in the library
pub async fn identify(steps: &Steps<'_>) -> Result<Match> {
    steps.indicate(Cue::Waiting).await;
    steps.capture(CharBuffer::One).await?;

    steps
        .search(CharBuffer::One)
        .await?
        .ok_or_else(|| Failure::NoMatch.into())
}

/// Delete the template matching the presented finger
pub async fn delete_by_scan(steps: &Steps<'_>) -> Result<Slot> {
    let found = identify(steps).await?;
    steps.delete(found.slot).await?;

    Ok(found.slot)
}

/// Delete the template at `slot`
pub async fn delete_slot(steps: &Steps<'_>, slot: Slot) -> Result<()> {
    let capacity = steps.capacity();
    if slot >= capacity {
        return Err(Failure::SlotOutOfRange { slot, capacity }.into());
    }

    if !steps.occupied(slot).await? {
        return Err(Failure::SlotEmpty(slot).into());
    }

    steps.delete(slot).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanPolicy;
    use crate::link::SensorLink;
    use crate::sim::{self, Fault, SimHandle};
    use fingerlink_core::Instruction;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    async fn connected(capacity: u16) -> (SensorLink, SimHandle) {
        let (sensor, handle) = sim::sensor(capacity);
        let link = SensorLink::new(sensor);
        link.connect().await.unwrap();
        (link, handle)
    }

    fn quiet(_: &str) {}

    #[tokio::test(start_paused = true)]
    async fn test_enroll_first_free_slot() {
        let (link, handle) = connected(10).await;
        handle.place(0, 1);
        handle.script([Some(5), None, Some(5)]);
        let policy = ScanPolicy::default();
        let notices = Mutex::new(Vec::new());

        let slot = enroll(&Steps::new(&link, &policy), None, &|msg: &str| {
            notices.lock().push(msg.to_string())
        })
        .await
        .unwrap();

        assert_eq!(slot, 1);
        assert_eq!(handle.slot(1), Some(5));
        assert_eq!(notices.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enroll_mismatch() {
        let (link, handle) = connected(10).await;
        handle.script([Some(5), None, Some(6)]);
        let policy = ScanPolicy::default();

        let err = enroll(&Steps::new(&link, &policy), None, &quiet).await.unwrap_err();

        assert_eq!(err.failure(), Some(Failure::EnrollMismatch));
        assert_eq!(handle.stored(), 0);
        assert_eq!(handle.sent(Instruction::Store), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enroll_rejects_duplicate() {
        let (link, handle) = connected(10).await;
        handle.place(3, 5);
        handle.script([Some(5), None, Some(5)]);
        let policy = ScanPolicy::default();

        let err = enroll(&Steps::new(&link, &policy), None, &quiet).await.unwrap_err();

        assert_eq!(err.failure(), Some(Failure::AlreadyEnrolled(3)));
        assert_eq!(handle.stored(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enroll_duplicates_allowed_when_disabled() {
        let (link, handle) = connected(10).await;
        handle.place(0, 5);
        handle.script([Some(5), None, Some(5)]);
        let policy = ScanPolicy {
            reject_duplicates: false,
            ..ScanPolicy::default()
        };

        let slot = enroll(&Steps::new(&link, &policy), None, &quiet).await.unwrap();
        assert_eq!(slot, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enroll_requested_slot() {
        let (link, handle) = connected(10).await;
        handle.place(4, 1);
        let policy = ScanPolicy::default();
        let steps = Steps::new(&link, &policy);

        handle.script([Some(5), None, Some(5)]);
        assert_eq!(enroll(&steps, Some(8), &quiet).await.unwrap(), 8);

        handle.script([Some(6), None, Some(6)]);
        let err = enroll(&steps, Some(4), &quiet).await.unwrap_err();
        assert_eq!(err.failure(), Some(Failure::SlotOccupied(4)));

        let err = enroll(&steps, Some(10), &quiet).await.unwrap_err();
        assert_eq!(
            err.failure(),
            Some(Failure::SlotOutOfRange {
                slot: 10,
                capacity: 10
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_enroll_storage_full() {
        let (link, handle) = connected(2).await;
        handle.place(0, 1);
        handle.place(1, 2);
        handle.script([Some(5), None, Some(5)]);
        let policy = ScanPolicy::default();

        let err = enroll(&Steps::new(&link, &policy), None, &quiet).await.unwrap_err();
        assert_eq!(err.failure(), Some(Failure::StorageFull));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enroll_retries_poor_capture() {
        let (link, handle) = connected(10).await;
        handle.script([Some(5), Some(5), None, Some(5)]);
        handle.with_state(|state| state.bad_images = 1);
        let policy = ScanPolicy::default();

        let slot = enroll(&Steps::new(&link, &policy), None, &quiet).await.unwrap();

        assert_eq!(slot, 0);
        assert_eq!(handle.sent(Instruction::Img2Tz), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enroll_retries_failed_image_capture() {
        let (link, handle) = connected(10).await;
        handle.script([Some(5), None, Some(5)]);
        handle.with_state(|state| state.failed_captures = 1);
        let policy = ScanPolicy::default();

        let slot = enroll(&Steps::new(&link, &policy), None, &quiet).await.unwrap();

        assert_eq!(slot, 0);
        assert_eq!(handle.slot(0), Some(5));
        assert_eq!(handle.sent(Instruction::GenImg), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enroll_gives_up_after_failed_captures() {
        let (link, handle) = connected(10).await;
        handle.script([Some(5), None, Some(5)]);
        handle.with_state(|state| state.failed_captures = 3);
        let policy = ScanPolicy::default();

        let err = enroll(&Steps::new(&link, &policy), None, &quiet).await.unwrap_err();

        assert_eq!(err.failure(), Some(Failure::BadImage));
        assert_eq!(handle.stored(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enroll_aborts_on_link_timeout() {
        let (link, handle) = connected(10).await;
        handle.script([Some(5), None, Some(5)]);
        handle.fault(Instruction::Search, Fault::Drop);
        let policy = ScanPolicy::default();

        let err = enroll(&Steps::new(&link, &policy), None, &quiet).await.unwrap_err();

        assert!(matches!(err, Error::LinkTimeout));
        assert!(!link.is_connected());
        assert_eq!(handle.stored(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_no_match() {
        let (link, handle) = connected(10).await;
        handle.place(0, 1);
        handle.script([Some(9)]);
        let policy = ScanPolicy::default();

        let err = identify(&Steps::new(&link, &policy)).await.unwrap_err();
        assert_eq!(err.failure(), Some(Failure::NoMatch));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_by_scan() {
        let (link, handle) = connected(10).await;
        handle.place(2, 7);
        handle.script([Some(7)]);
        let policy = ScanPolicy::default();

        assert_eq!(delete_by_scan(&Steps::new(&link, &policy)).await.unwrap(), 2);
        assert_eq!(handle.slot(2), None);
    }

    #[tokio::test]
    async fn test_delete_slot_failures() {
        let (link, handle) = connected(10).await;
        handle.place(1, 7);
        let policy = ScanPolicy::default();
        let steps = Steps::new(&link, &policy);

        let err = delete_slot(&steps, 3).await.unwrap_err();
        assert_eq!(err.failure(), Some(Failure::SlotEmpty(3)));

        let err = delete_slot(&steps, 12).await.unwrap_err();
        assert_eq!(
            err.failure(),
            Some(Failure::SlotOutOfRange {
                slot: 12,
                capacity: 10
            })
        );

        delete_slot(&steps, 1).await.unwrap();
        assert_eq!(handle.stored(), 0);
    }
}
