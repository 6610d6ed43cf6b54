//! Simulated sensor module for tests
//!
//! Decodes command frames and answers the way an R503 does. Finger
//! placements are scripted: each image capture consumes one entry of the
//! finger queue, `None` meaning nothing on the glass.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;

use fingerlink_core::constants::{DEFAULT_ADDRESS, INDEX_PAGE_BYTES, INDEX_PAGE_SLOTS};
use fingerlink_core::params::{StatusRegister, SystemParameters};
use fingerlink_core::{Confirmation, Instruction, Packet, PacketKind};
use fingerlink_transport::{Error, Result, Transport};

/// Injected fault for the next matching instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Swallow the command, never answer
    Drop,
    /// Answer with a broken checksum
    Corrupt,
}

#[derive(Debug)]
pub struct SimState {
    pub password: u32,
    pub slots: Vec<Option<u32>>,
    pub fingers: VecDeque<Option<u32>>,
    pub image: Option<u32>,
    pub buffers: [Option<u32>; 2],
    /// Characterizations that report a disorderly image before succeeding
    pub bad_images: usize,
    /// Image captures that fail outright before the finger is read
    pub failed_captures: usize,
    /// Time the module takes before its acknowledge reaches the host
    pub reply_delay: Option<Duration>,
    pub faults: Vec<(Instruction, Fault)>,
    pub clear_fails: bool,
    pub log: Vec<Instruction>,
    pub leds: Vec<[u8; 4]>,
    pub connects: usize,
}

impl SimState {
    fn new(capacity: u16) -> Self {
        Self {
            password: 0,
            slots: vec![None; usize::from(capacity)],
            fingers: VecDeque::new(),
            image: None,
            buffers: [None; 2],
            bad_images: 0,
            failed_captures: 0,
            reply_delay: None,
            faults: Vec::new(),
            clear_fails: false,
            log: Vec::new(),
            leds: Vec::new(),
            connects: 0,
        }
    }

    fn capacity(&self) -> u16 {
        self.slots.len() as u16
    }

    fn answer(&mut self, instruction: Instruction, params: &[u8]) -> (Confirmation, Vec<u8>) {
        let u16_at = |offset: usize| -> u16 {
            params
                .get(offset..offset + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .unwrap_or(0)
        };
        let buffer = |index: usize| -> usize {
            usize::from(params.get(index).copied().unwrap_or(1).clamp(1, 2)) - 1
        };

        match instruction {
            Instruction::VfyPwd => {
                let password = u32::from_be_bytes([params[0], params[1], params[2], params[3]]);
                if password == self.password {
                    (Confirmation::Ok, vec![])
                } else {
                    (Confirmation::WrongPassword, vec![])
                }
            }
            Instruction::ReadSysPara => {
                let params = SystemParameters {
                    status: StatusRegister::PASSWORD_VERIFIED,
                    system_id: 0,
                    capacity: self.capacity(),
                    security_level: 3,
                    address: DEFAULT_ADDRESS,
                    packet_size: 128,
                    baud_rate: 57_600,
                };
                (Confirmation::Ok, params.to_bytes().to_vec())
            }
            Instruction::GenImg if self.failed_captures > 0 => {
                self.failed_captures -= 1;
                (Confirmation::EnrollFailed, vec![])
            }
            Instruction::GenImg => match self.fingers.pop_front().flatten() {
                Some(finger) => {
                    self.image = Some(finger);
                    (Confirmation::Ok, vec![])
                }
                None => {
                    self.image = None;
                    (Confirmation::NoFinger, vec![])
                }
            },
            Instruction::Img2Tz => {
                if self.bad_images > 0 {
                    self.bad_images -= 1;
                    return (Confirmation::ImageDisorderly, vec![]);
                }
                match self.image {
                    Some(finger) => {
                        self.buffers[buffer(0)] = Some(finger);
                        (Confirmation::Ok, vec![])
                    }
                    None => (Confirmation::InvalidImage, vec![]),
                }
            }
            Instruction::RegModel => match self.buffers {
                [Some(a), Some(b)] if a == b => (Confirmation::Ok, vec![]),
                _ => (Confirmation::CombineFailed, vec![]),
            },
            Instruction::Store => {
                let slot = usize::from(u16_at(1));
                match (self.buffers[buffer(0)], self.slots.get_mut(slot)) {
                    (Some(finger), Some(entry)) => {
                        *entry = Some(finger);
                        (Confirmation::Ok, vec![])
                    }
                    (_, None) => (Confirmation::PageOutOfRange, vec![]),
                    (None, _) => (Confirmation::FlashWriteError, vec![]),
                }
            }
            Instruction::Search => {
                let wanted = self.buffers[buffer(0)];
                let start = usize::from(u16_at(1));
                let count = usize::from(u16_at(3));

                let hit = self
                    .slots
                    .iter()
                    .enumerate()
                    .skip(start)
                    .take(count)
                    .find(|(_, entry)| wanted.is_some() && **entry == wanted);

                match hit {
                    Some((slot, _)) => {
                        let mut data = (slot as u16).to_be_bytes().to_vec();
                        data.extend_from_slice(&100u16.to_be_bytes());
                        (Confirmation::Ok, data)
                    }
                    None => (Confirmation::NotFound, vec![]),
                }
            }
            Instruction::DeletChar => {
                let start = usize::from(u16_at(0));
                let count = usize::from(u16_at(2));
                if start + count > self.slots.len() {
                    return (Confirmation::DeleteFailed, vec![]);
                }
                for entry in &mut self.slots[start..start + count] {
                    *entry = None;
                }
                (Confirmation::Ok, vec![])
            }
            Instruction::Empty => {
                if self.clear_fails {
                    return (Confirmation::ClearFailed, vec![]);
                }
                self.slots.iter_mut().for_each(|entry| *entry = None);
                (Confirmation::Ok, vec![])
            }
            Instruction::TemplateNum => {
                let count = self.slots.iter().filter(|entry| entry.is_some()).count() as u16;
                (Confirmation::Ok, count.to_be_bytes().to_vec())
            }
            Instruction::ReadIndexTable => {
                let page = usize::from(params.first().copied().unwrap_or(0));
                let base = page * usize::from(INDEX_PAGE_SLOTS);
                let mut table = vec![0u8; INDEX_PAGE_BYTES];

                for (offset, entry) in self.slots.iter().skip(base).take(usize::from(INDEX_PAGE_SLOTS)).enumerate() {
                    if entry.is_some() {
                        table[offset / 8] |= 1 << (offset % 8);
                    }
                }
                (Confirmation::Ok, table)
            }
            Instruction::AuraLedConfig => {
                let mut led = [0u8; 4];
                led.copy_from_slice(&params[..4]);
                self.leds.push(led);
                (Confirmation::Ok, vec![])
            }
            _ => (Confirmation::Other(0x1C), vec![]),
        }
    }
}

/// Transport end plugged into the link under test
pub struct SimSensor {
    state: Arc<Mutex<SimState>>,
    connected: bool,
    outbox: VecDeque<BytesMut>,
}

/// Test-side handle for scripting and inspecting the module
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

pub fn sensor(capacity: u16) -> (SimSensor, SimHandle) {
    let state = Arc::new(Mutex::new(SimState::new(capacity)));

    (
        SimSensor {
            state: Arc::clone(&state),
            connected: false,
            outbox: VecDeque::new(),
        },
        SimHandle { state },
    )
}

impl SimHandle {
    /// Queue finger presence results for upcoming captures
    pub fn script(&self, fingers: impl IntoIterator<Item = Option<u32>>) {
        self.state.lock().fingers.extend(fingers);
    }

    pub fn place(&self, slot: u16, finger: u32) {
        self.state.lock().slots[usize::from(slot)] = Some(finger);
    }

    pub fn slot(&self, slot: u16) -> Option<u32> {
        self.state.lock().slots[usize::from(slot)]
    }

    pub fn stored(&self) -> usize {
        self.state.lock().slots.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn fault(&self, instruction: Instruction, fault: Fault) {
        self.state.lock().faults.push((instruction, fault));
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        f(&mut self.state.lock())
    }

    pub fn sent(&self, instruction: Instruction) -> usize {
        self.state.lock().log.iter().filter(|i| **i == instruction).count()
    }
}

#[async_trait]
impl Transport for SimSensor {
    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        self.state.lock().connects += 1;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        self.outbox.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let packet = match Packet::decode(BytesMut::from(data)) {
            Ok(packet) if packet.kind == PacketKind::Command => packet,
            _ => return Ok(()),
        };
        let Ok(instruction) = packet.instruction() else {
            return Ok(());
        };

        let mut state = self.state.lock();
        state.log.push(instruction);

        let fault = state
            .faults
            .iter()
            .position(|(target, _)| *target == instruction)
            .map(|index| state.faults.remove(index).1);

        let (confirmation, data) = state.answer(instruction, packet.params());
        drop(state);

        let Ok(reply) = Packet::acknowledge(DEFAULT_ADDRESS, confirmation, &data) else {
            return Ok(());
        };
        let mut frame = reply.encode();

        match fault {
            Some(Fault::Drop) => {}
            Some(Fault::Corrupt) => {
                let last = frame.len() - 1;
                frame[last] ^= 0xFF;
                self.outbox.push_back(frame);
            }
            None => self.outbox.push_back(frame),
        }

        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<BytesMut> {
        let delay = self.state.lock().reply_delay;

        if let Some(delay) = delay {
            if self.outbox.is_empty() || timeout < delay {
                tokio::time::sleep(timeout).await;
                return Err(Error::ReadTimeout);
            }
            tokio::time::sleep(delay).await;
        }

        self.outbox.pop_front().ok_or(Error::ReadTimeout)
    }

    fn remote_addr(&self) -> String {
        "sim".to_string()
    }
}
