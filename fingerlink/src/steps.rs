//! Single sensor steps
//!
//! Each step is one instruction (or a bounded polling loop of one
//! instruction) with its confirmation codes mapped onto domain outcomes.
//! Sequences in [`crate::operation`] are built from these.

use tokio::time::sleep;
use tracing::{debug, trace};

use fingerlink_core::constants::{INDEX_PAGE_BYTES, INDEX_PAGE_SLOTS};
use fingerlink_core::{CharBuffer, Confirmation, Instruction, Response};
use fingerlink_types::{Failure, Slot};

use crate::config::ScanPolicy;
use crate::error::{Error, Result};
use crate::indicator::Cue;
use crate::link::SensorLink;

/// Best library match for a characterized finger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub slot: Slot,
    pub score: u16,
}

pub struct Steps<'a> {
    link: &'a SensorLink,
    policy: &'a ScanPolicy,
}

impl<'a> Steps<'a> {
    pub fn new(link: &'a SensorLink, policy: &'a ScanPolicy) -> Self {
        Self { link, policy }
    }

    pub fn policy(&self) -> &ScanPolicy {
        self.policy
    }

    pub fn capacity(&self) -> u16 {
        self.link.capacity()
    }

    /// Poll until a finger is on the glass and its image is captured
    pub async fn wait_for_finger(&self) -> Result<()> {
        let polls = self.policy.polls_within(self.policy.finger_timeout);

        for poll in 0..polls {
            let response = self.link.exchange(Instruction::GenImg, &[]).await?;

            match response.confirmation {
                Confirmation::Ok => {
                    debug!(poll, "Finger detected");
                    return Ok(());
                }
                Confirmation::NoFinger => trace!(poll, "No finger yet"),
                code if code.is_bad_image() => return Err(Failure::BadImage.into()),
                code => return Err(rejected(Instruction::GenImg, code)),
            }

            sleep(self.policy.poll_interval).await;
        }

        Err(Failure::NoFinger.into())
    }

    /// Poll until the finger has been lifted
    pub async fn wait_for_removal(&self) -> Result<()> {
        let polls = self.policy.polls_within(self.policy.removal_timeout);

        for poll in 0..polls {
            let response = self.link.exchange(Instruction::GenImg, &[]).await?;

            match response.confirmation {
                Confirmation::NoFinger => {
                    debug!(poll, "Finger removed");
                    return Ok(());
                }
                Confirmation::Ok => trace!(poll, "Finger still present"),
                code if code.is_bad_image() => trace!(poll, "Finger still present"),
                code => return Err(rejected(Instruction::GenImg, code)),
            }

            sleep(self.policy.poll_interval).await;
        }

        Err(Failure::FingerNotRemoved.into())
    }

    /// Turn the captured image into features in `buffer`
    ///
    /// Returns `false` when the image was too poor to characterize.
    pub async fn characterize(&self, buffer: CharBuffer) -> Result<bool> {
        let response = self
            .link
            .exchange(Instruction::Img2Tz, &[buffer.into()])
            .await?;

        match response.confirmation {
            Confirmation::Ok => Ok(true),
            code if code.is_bad_image() => {
                debug!(?buffer, %code, "Image rejected");
                Ok(false)
            }
            code => Err(rejected(Instruction::Img2Tz, code)),
        }
    }

    /// Wait for a finger and characterize it, retrying poor captures
    pub async fn capture(&self, buffer: CharBuffer) -> Result<()> {
        let attempts = self.policy.capture_attempts.max(1);

        for attempt in 1..=attempts {
            let captured = match self.wait_for_finger().await {
                Ok(()) => self.characterize(buffer).await?,
                Err(Error::Failed(Failure::BadImage)) => false,
                Err(e) => return Err(e),
            };

            if captured {
                return Ok(());
            }

            debug!(attempt, attempts, "Capture failed, retrying");
        }

        Err(Failure::BadImage.into())
    }

    /// Combine both feature buffers into one model
    pub async fn merge(&self) -> Result<()> {
        let response = self.link.exchange(Instruction::RegModel, &[]).await?;

        match response.confirmation {
            Confirmation::Ok => Ok(()),
            Confirmation::CombineFailed => Err(Failure::EnrollMismatch.into()),
            code => Err(rejected(Instruction::RegModel, code)),
        }
    }

    /// Search the whole library for the features in `buffer`
    pub async fn search(&self, buffer: CharBuffer) -> Result<Option<Match>> {
        let mut params = vec![buffer.into()];
        params.extend_from_slice(&0u16.to_be_bytes());
        params.extend_from_slice(&self.capacity().to_be_bytes());

        let response = self.link.exchange(Instruction::Search, &params).await?;

        match response.confirmation {
            Confirmation::Ok => Ok(Some(Match {
                slot: response.u16_at(0)?,
                score: response.u16_at(2)?,
            })),
            Confirmation::NotFound | Confirmation::NoMatch => Ok(None),
            code => Err(rejected(Instruction::Search, code)),
        }
    }

    /// Occupancy of every slot in the library
    pub async fn index_table(&self) -> Result<Vec<bool>> {
        let capacity = self.capacity();
        let pages = capacity.div_ceil(INDEX_PAGE_SLOTS);
        let mut occupied = Vec::with_capacity(usize::from(capacity));

        for page in 0..pages {
            let table = self.index_page(page).await?;
            let base = page * INDEX_PAGE_SLOTS;

            for offset in 0..INDEX_PAGE_SLOTS.min(capacity - base) {
                let byte = table[usize::from(offset / 8)];
                occupied.push(byte & (1 << (offset % 8)) != 0);
            }
        }

        Ok(occupied)
    }

    /// Check if the module holds a template at `slot`
    pub async fn occupied(&self, slot: Slot) -> Result<bool> {
        let page = slot / INDEX_PAGE_SLOTS;
        let offset = slot % INDEX_PAGE_SLOTS;
        let table = self.index_page(page).await?;

        Ok(table[usize::from(offset / 8)] & (1 << (offset % 8)) != 0)
    }

    /// Lowest empty slot, if any
    pub async fn free_slot(&self) -> Result<Option<Slot>> {
        let table = self.index_table().await?;

        Ok(table
            .iter()
            .position(|occupied| !occupied)
            .map(|slot| slot as Slot))
    }

    /// Write the model in `buffer` to `slot`
    pub async fn store(&self, buffer: CharBuffer, slot: Slot) -> Result<()> {
        let mut params = vec![buffer.into()];
        params.extend_from_slice(&slot.to_be_bytes());

        let response = self.link.exchange(Instruction::Store, &params).await?;

        match response.confirmation {
            Confirmation::Ok => Ok(()),
            Confirmation::PageOutOfRange => Err(Failure::SlotOutOfRange {
                slot,
                capacity: self.capacity(),
            }
            .into()),
            code => Err(rejected(Instruction::Store, code)),
        }
    }

    pub async fn delete(&self, slot: Slot) -> Result<()> {
        let mut params = slot.to_be_bytes().to_vec();
        params.extend_from_slice(&1u16.to_be_bytes());

        let response = self.link.exchange(Instruction::DeletChar, &params).await?;
        expect_ok(Instruction::DeletChar, response)
    }

    /// Erase the whole library
    pub async fn empty(&self) -> Result<()> {
        let response = self.link.exchange(Instruction::Empty, &[]).await?;
        expect_ok(Instruction::Empty, response)
    }

    /// Number of stored templates
    pub async fn count(&self) -> Result<u16> {
        let response = self.link.exchange(Instruction::TemplateNum, &[]).await?;

        if !response.confirmation.is_ok() {
            return Err(rejected(Instruction::TemplateNum, response.confirmation));
        }

        Ok(response.u16_at(0)?)
    }

    /// Show `cue` on the ring LED when feedback is enabled
    ///
    /// Never fails; LED trouble must not change an outcome.
    pub async fn indicate(&self, cue: Cue) {
        if !self.policy.led_feedback {
            return;
        }

        match self.link.exchange(Instruction::AuraLedConfig, &cue.params()).await {
            Ok(response) if response.confirmation.is_ok() => trace!(?cue, "LED updated"),
            Ok(response) => debug!(?cue, code = %response.confirmation, "LED rejected"),
            Err(e) => debug!(?cue, error = %e, "LED update failed"),
        }
    }

    async fn index_page(&self, page: u16) -> Result<[u8; INDEX_PAGE_BYTES]> {
        let page = u8::try_from(page).map_err(|_| {
            Error::from(fingerlink_core::Error::InvalidLength(page))
        })?;

        let response = self
            .link
            .exchange(Instruction::ReadIndexTable, &[page])
            .await?;

        if !response.confirmation.is_ok() {
            return Err(rejected(Instruction::ReadIndexTable, response.confirmation));
        }

        let mut table = [0u8; INDEX_PAGE_BYTES];
        match response.payload.get(..INDEX_PAGE_BYTES) {
            Some(bytes) => table.copy_from_slice(bytes),
            None => {
                return Err(fingerlink_core::Error::ShortPayload {
                    expected: INDEX_PAGE_BYTES,
                    actual: response.payload.len(),
                }
                .into());
            }
        }

        Ok(table)
    }
}

fn rejected(instruction: Instruction, code: Confirmation) -> Error {
    Error::Sensor { instruction, code }
}

fn expect_ok(instruction: Instruction, response: Response) -> Result<()> {
    if response.confirmation.is_ok() {
        Ok(())
    } else {
        Err(rejected(instruction, response.confirmation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{self, Fault};
    use pretty_assertions::assert_eq;

    async fn connected(capacity: u16) -> (SensorLink, sim::SimHandle) {
        let (sensor, handle) = sim::sensor(capacity);
        let link = SensorLink::new(sensor);
        link.connect().await.unwrap();
        (link, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_finger_times_out() {
        let (link, handle) = connected(10).await;
        let policy = ScanPolicy::default();
        let steps = Steps::new(&link, &policy);

        let err = steps.wait_for_finger().await.unwrap_err();

        assert_eq!(err.failure(), Some(Failure::NoFinger));
        assert_eq!(handle.sent(Instruction::GenImg), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_finger_after_a_few_polls() {
        let (link, handle) = connected(10).await;
        handle.script([None, None, Some(1)]);
        let policy = ScanPolicy::default();

        Steps::new(&link, &policy).wait_for_finger().await.unwrap();
        assert_eq!(handle.sent(Instruction::GenImg), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finger_not_removed() {
        let (link, handle) = connected(10).await;
        handle.script(std::iter::repeat_n(Some(1), 200));
        let policy = ScanPolicy::default();

        let err = Steps::new(&link, &policy).wait_for_removal().await.unwrap_err();
        assert_eq!(err.failure(), Some(Failure::FingerNotRemoved));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_retries_bad_images() {
        let (link, handle) = connected(10).await;
        handle.script([Some(4), Some(4)]);
        handle.with_state(|state| state.bad_images = 1);
        let policy = ScanPolicy::default();

        Steps::new(&link, &policy).capture(CharBuffer::One).await.unwrap();
        assert_eq!(handle.with_state(|state| state.buffers[0]), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_gives_up_after_attempts() {
        let (link, handle) = connected(10).await;
        handle.script([Some(4), Some(4), Some(4)]);
        handle.with_state(|state| state.bad_images = 3);
        let policy = ScanPolicy::default();

        let err = Steps::new(&link, &policy).capture(CharBuffer::One).await.unwrap_err();
        assert_eq!(err.failure(), Some(Failure::BadImage));
    }

    #[tokio::test]
    async fn test_index_table_and_free_slot() {
        let (link, handle) = connected(300).await;
        for slot in 0..260 {
            handle.place(slot, u32::from(slot));
        }
        handle.with_state(|state| state.slots[7] = None);
        let policy = ScanPolicy::default();
        let steps = Steps::new(&link, &policy);

        let table = steps.index_table().await.unwrap();
        assert_eq!(table.len(), 300);
        assert!(table[259]);
        assert!(!table[260]);

        assert_eq!(steps.free_slot().await.unwrap(), Some(7));
        assert!(steps.occupied(257).await.unwrap());
        assert!(!steps.occupied(7).await.unwrap());
    }

    #[tokio::test]
    async fn test_search_and_count() {
        let (link, handle) = connected(10).await;
        handle.place(6, 42);
        handle.with_state(|state| state.buffers[0] = Some(42));
        let policy = ScanPolicy::default();
        let steps = Steps::new(&link, &policy);

        assert_eq!(
            steps.search(CharBuffer::One).await.unwrap(),
            Some(Match { slot: 6, score: 100 })
        );
        assert_eq!(steps.count().await.unwrap(), 1);

        handle.with_state(|state| state.buffers[0] = Some(7));
        assert_eq!(steps.search(CharBuffer::One).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sensor_rejection() {
        let (link, handle) = connected(10).await;
        handle.with_state(|state| state.clear_fails = true);
        let policy = ScanPolicy::default();

        let err = Steps::new(&link, &policy).empty().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Sensor {
                instruction: Instruction::Empty,
                code: Confirmation::ClearFailed
            }
        ));
    }

    #[tokio::test]
    async fn test_led_failures_are_swallowed() {
        let (link, handle) = connected(10).await;
        handle.fault(Instruction::AuraLedConfig, Fault::Corrupt);
        let policy = ScanPolicy {
            led_feedback: true,
            ..ScanPolicy::default()
        };
        let steps = Steps::new(&link, &policy);

        steps.indicate(Cue::Waiting).await;
        steps.indicate(Cue::Success).await;

        assert_eq!(handle.with_state(|state| state.leds.clone()), vec![
            Cue::Waiting.params(),
            Cue::Success.params()
        ]);
    }

    #[tokio::test]
    async fn test_led_disabled_sends_nothing() {
        let (link, handle) = connected(10).await;
        let policy = ScanPolicy::default();

        Steps::new(&link, &policy).indicate(Cue::Error).await;
        assert_eq!(handle.sent(Instruction::AuraLedConfig), 0);
    }
}
