//! Sensor frame structure and encoding/decoding

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum,
    constants::{DEFAULT_ADDRESS, HEADER},
    error::{Error, Result},
    instruction::{Confirmation, Instruction},
};

/// Packet identifier
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// Command packet (host to module)
    Command = 0x01,

    /// Data packet with more data following
    Data = 0x02,

    /// Acknowledge packet (module to host)
    Acknowledge = 0x07,

    /// Last data packet
    EndData = 0x08,
}

impl TryFrom<u8> for PacketKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Command),
            0x02 => Ok(Self::Data),
            0x07 => Ok(Self::Acknowledge),
            0x08 => Ok(Self::EndData),
            _ => Err(Error::UnknownPacketKind(value)),
        }
    }
}

/// Sensor protocol frame
///
/// # Frame Structure
///
/// ```text
/// ┌──────────┬───────────┬────────────┬──────────┬───────────┬──────────┐
/// │  Header  │  Address  │ Identifier │  Length  │  Payload  │ Checksum │
/// │ 2 bytes  │  4 bytes  │   1 byte   │ 2 bytes  │  N bytes  │ 2 bytes  │
/// │ (0xEF01) │ (BE u32)  │            │ (BE u16) │           │ (BE u16) │
/// └──────────┴───────────┴────────────┴──────────┴───────────┴──────────┘
/// ```
///
/// The length field counts the payload plus the two checksum bytes. A
/// command payload starts with the instruction byte; an acknowledge payload
/// starts with the confirmation code.
///
/// # Examples
///
/// ```
/// use fingerlink_core::{Instruction, Packet};
/// use fingerlink_core::constants::DEFAULT_ADDRESS;
///
/// let packet = Packet::command(DEFAULT_ADDRESS, Instruction::GenImg, &[]).unwrap();
/// let encoded = packet.encode();
///
/// let decoded = Packet::decode(encoded).unwrap();
/// assert_eq!(decoded.instruction().unwrap(), Instruction::GenImg);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Module address
    pub address: u32,

    /// Packet identifier
    pub kind: PacketKind,

    /// Packet payload
    pub payload: Bytes,
}

impl Packet {
    /// Bytes before the payload: header, address, identifier, length
    pub const PREFIX_SIZE: usize = 9;

    /// Bytes a frame adds around its payload
    pub const OVERHEAD: usize = Self::PREFIX_SIZE + 2;

    /// Largest payload the module sends or accepts
    pub const MAX_PAYLOAD_SIZE: usize = 256;

    /// Create a packet
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] if the payload exceeds
    /// [`Packet::MAX_PAYLOAD_SIZE`].
    pub fn new(address: u32, kind: PacketKind, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();

        if payload.len() > Self::MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max: Self::MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self {
            address,
            kind,
            payload,
        })
    }

    /// Create a command packet: instruction byte followed by parameters
    ///
    /// # Examples
    ///
    /// ```
    /// use fingerlink_core::{Instruction, Packet, PacketKind};
    ///
    /// let packet = Packet::command(0xFFFF_FFFF, Instruction::Img2Tz, &[0x01]).unwrap();
    /// assert_eq!(packet.kind, PacketKind::Command);
    /// assert_eq!(packet.payload.as_ref(), &[0x02, 0x01]);
    /// ```
    pub fn command(address: u32, instruction: Instruction, params: &[u8]) -> Result<Self> {
        let mut payload = BytesMut::with_capacity(1 + params.len());
        payload.put_u8(instruction.into());
        payload.put_slice(params);

        Self::new(address, PacketKind::Command, payload.freeze())
    }

    /// Create an acknowledge packet: confirmation code followed by data
    pub fn acknowledge(address: u32, confirmation: Confirmation, data: &[u8]) -> Result<Self> {
        let mut payload = BytesMut::with_capacity(1 + data.len());
        payload.put_u8(confirmation.code());
        payload.put_slice(data);

        Self::new(address, PacketKind::Acknowledge, payload.freeze())
    }

    /// Value of the length field for this packet
    pub fn length_field(&self) -> u16 {
        // Bounded by MAX_PAYLOAD_SIZE at construction
        (self.payload.len() + 2) as u16
    }

    /// Calculate checksum for this packet
    pub fn checksum(&self) -> u16 {
        checksum::calculate(self.kind as u8, self.length_field(), &self.payload)
    }

    /// Encode packet to bytes
    ///
    /// # Examples
    ///
    /// ```
    /// use fingerlink_core::{Instruction, Packet};
    ///
    /// let packet = Packet::command(0xFFFF_FFFF, Instruction::GenImg, &[]).unwrap();
    /// assert_eq!(
    ///     packet.encode().as_ref(),
    ///     &[0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x03, 0x01, 0x00, 0x05]
    /// );
    /// ```
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::OVERHEAD + self.payload.len());

        buf.put_u16(HEADER);
        buf.put_u32(self.address);
        buf.put_u8(self.kind as u8);
        buf.put_u16(self.length_field());
        buf.put_slice(&self.payload);
        buf.put_u16(self.checksum());

        buf
    }

    /// Decode exactly one frame
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer is shorter than the frame it announces
    /// - Header or packet identifier is invalid
    /// - Checksum verification fails
    pub fn decode(mut buf: BytesMut) -> Result<Self> {
        match Self::parse(&mut buf)? {
            Some(packet) => Ok(packet),
            None => Err(Error::FrameTooShort {
                expected: Self::frame_len(&buf)
                    .and_then(|len| len.ok())
                    .unwrap_or(Self::OVERHEAD),
                actual: buf.len(),
            }),
        }
    }

    /// Decode one frame from the front of a receive buffer
    ///
    /// Returns `Ok(None)` while the buffer holds only part of a frame. On
    /// success the frame's bytes are consumed and anything after it stays
    /// in the buffer.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<Self>> {
        if buf.len() >= 2 {
            let header = u16::from_be_bytes([buf[0], buf[1]]);
            if header != HEADER {
                return Err(Error::BadHeader(header));
            }
        }

        let Some(frame_len) = Self::frame_len(buf) else {
            return Ok(None);
        };
        let frame_len = frame_len?;

        if buf.len() < frame_len {
            return Ok(None);
        }

        let mut frame = buf.split_to(frame_len);

        frame.advance(2);
        let address = frame.get_u32();
        let kind = PacketKind::try_from(frame.get_u8())?;
        let length = frame.get_u16();

        let payload_len = usize::from(length) - 2;
        let payload = frame.split_to(payload_len).freeze();
        let checksum_received = frame.get_u16();

        let checksum_calculated = checksum::calculate(kind as u8, length, &payload);
        if checksum_calculated != checksum_received {
            return Err(Error::ChecksumMismatch {
                expected: checksum_calculated,
                received: checksum_received,
            });
        }

        Ok(Some(Self {
            address,
            kind,
            payload,
        }))
    }

    /// Total frame length announced by a buffered prefix, if it is complete
    fn frame_len(buf: &[u8]) -> Option<Result<usize>> {
        if buf.len() < Self::PREFIX_SIZE {
            return None;
        }

        let length = u16::from_be_bytes([buf[7], buf[8]]);
        if length < 2 || usize::from(length) > Self::MAX_PAYLOAD_SIZE + 2 {
            return Some(Err(Error::InvalidLength(length)));
        }

        Some(Ok(Self::PREFIX_SIZE + usize::from(length)))
    }

    /// Instruction of a command packet
    pub fn instruction(&self) -> Result<Instruction> {
        match self.payload.first() {
            Some(code) if self.kind == PacketKind::Command => Instruction::try_from(*code),
            _ => Err(Error::UnexpectedPacket(self.kind)),
        }
    }

    /// Parameters of a command packet (payload after the instruction byte)
    pub fn params(&self) -> &[u8] {
        self.payload.get(1..).unwrap_or_default()
    }

    /// Check if this is a response packet
    pub fn is_response(&self) -> bool {
        self.kind == PacketKind::Acknowledge
    }

    /// Get total frame size
    pub fn size(&self) -> usize {
        Self::OVERHEAD + self.payload.len()
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            kind: PacketKind::Command,
            payload: Bytes::new(),
        }
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("address", &format!("0x{:08X}", self.address))
            .field("kind", &self.kind)
            .field("checksum", &format!("0x{:04X}", self.checksum()))
            .field("payload", &hex::encode(&self.payload))
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet[{:?}](address=0x{:08X}, len={})",
            self.kind,
            self.address,
            self.payload.len()
        )
    }
}

/// Decoded acknowledge frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Confirmation code
    pub confirmation: Confirmation,

    /// Data after the confirmation code
    pub payload: Bytes,
}

impl Response {
    /// Decode an acknowledge frame into confirmation code and data
    ///
    /// # Examples
    ///
    /// ```
    /// use fingerlink_core::{Confirmation, Response};
    /// use bytes::BytesMut;
    ///
    /// let frame = BytesMut::from(
    ///     &[0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x07, 0x00, 0x03, 0x02, 0x00, 0x0C][..],
    /// );
    /// let response = Response::decode(frame).unwrap();
    /// assert_eq!(response.confirmation, Confirmation::NoFinger);
    /// ```
    pub fn decode(buf: BytesMut) -> Result<Self> {
        Self::try_from(Packet::decode(buf)?)
    }

    /// Read a big-endian u16 from the data at `offset`
    pub fn u16_at(&self, offset: usize) -> Result<u16> {
        match self.payload.get(offset..offset + 2) {
            Some(bytes) => Ok(u16::from_be_bytes([bytes[0], bytes[1]])),
            None => Err(Error::ShortPayload {
                expected: offset + 2,
                actual: self.payload.len(),
            }),
        }
    }
}

impl TryFrom<Packet> for Response {
    type Error = Error;

    fn try_from(packet: Packet) -> Result<Self> {
        if packet.kind != PacketKind::Acknowledge {
            return Err(Error::UnexpectedPacket(packet.kind));
        }

        let mut payload = packet.payload;
        if payload.is_empty() {
            return Err(Error::EmptyAcknowledge);
        }

        let confirmation = Confirmation::from(payload.get_u8());

        Ok(Self {
            confirmation,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const GEN_IMG_FRAME: [u8; 12] = [
        0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x03, 0x01, 0x00, 0x05,
    ];

    #[test]
    fn test_encode_gen_img() {
        let packet = Packet::command(DEFAULT_ADDRESS, Instruction::GenImg, &[]).unwrap();
        assert_eq!(packet.encode().as_ref(), &GEN_IMG_FRAME);
    }

    #[test]
    fn test_encode_search() {
        // Search buffer 1, slots 0..200
        let packet =
            Packet::command(DEFAULT_ADDRESS, Instruction::Search, &[0x01, 0x00, 0x00, 0x00, 0xC8])
                .unwrap();

        assert_eq!(
            packet.encode().as_ref(),
            &[
                0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x08, 0x04, 0x01, 0x00, 0x00,
                0x00, 0xC8, 0x00, 0xD6
            ]
        );
    }

    #[test]
    fn test_decode_hand_built_acknowledge() {
        // Search hit: slot 5, score 120
        let frame = BytesMut::from(
            &[
                0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x07, 0x00, 0x07, 0x00, 0x00, 0x05, 0x00,
                0x78, 0x00, 0x8B,
            ][..],
        );

        let response = Response::decode(frame).unwrap();
        assert_eq!(response.confirmation, Confirmation::Ok);
        assert_eq!(response.u16_at(0).unwrap(), 5);
        assert_eq!(response.u16_at(2).unwrap(), 120);
        assert!(response.u16_at(3).is_err());
    }

    #[test]
    fn test_checksum_verification() {
        let mut encoded = BytesMut::from(&GEN_IMG_FRAME[..]);
        encoded[11] ^= 0xFF;

        let result = Packet::decode(encoded);
        assert!(matches!(result, Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_bad_header() {
        let mut encoded = BytesMut::from(&GEN_IMG_FRAME[..]);
        encoded[0] = 0xAA;

        assert_eq!(Packet::decode(encoded), Err(Error::BadHeader(0xAA01)));
    }

    #[test]
    fn test_frame_too_short() {
        let buf = BytesMut::from(&GEN_IMG_FRAME[..5]);
        assert!(matches!(Packet::decode(buf), Err(Error::FrameTooShort { .. })));
    }

    #[test]
    fn test_invalid_length() {
        let mut encoded = BytesMut::from(&GEN_IMG_FRAME[..]);
        encoded[7] = 0x7F;

        assert_eq!(Packet::decode(encoded), Err(Error::InvalidLength(0x7F03)));
    }

    #[test]
    fn test_parse_partial_then_complete() {
        let mut buf = BytesMut::from(&GEN_IMG_FRAME[..7]);
        assert_eq!(Packet::parse(&mut buf).unwrap(), None);

        buf.extend_from_slice(&GEN_IMG_FRAME[7..]);
        buf.extend_from_slice(&GEN_IMG_FRAME[..3]);

        let packet = Packet::parse(&mut buf).unwrap().unwrap();
        assert_eq!(packet.instruction().unwrap(), Instruction::GenImg);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_response_rejects_command_packet() {
        let frame = BytesMut::from(&GEN_IMG_FRAME[..]);
        assert_eq!(
            Response::decode(frame),
            Err(Error::UnexpectedPacket(PacketKind::Command))
        );
    }

    #[test]
    fn test_empty_acknowledge() {
        let packet = Packet::new(DEFAULT_ADDRESS, PacketKind::Acknowledge, Bytes::new()).unwrap();
        assert_eq!(Response::try_from(packet), Err(Error::EmptyAcknowledge));
    }

    #[test]
    fn test_payload_too_large() {
        let result = Packet::new(DEFAULT_ADDRESS, PacketKind::Data, vec![0u8; 257]);
        assert!(matches!(result, Err(Error::PayloadTooLarge { size: 257, .. })));
    }

    fn any_instruction() -> impl Strategy<Value = Instruction> {
        prop_oneof![
            Just(Instruction::GenImg),
            Just(Instruction::Img2Tz),
            Just(Instruction::Search),
            Just(Instruction::RegModel),
            Just(Instruction::Store),
            Just(Instruction::DeletChar),
            Just(Instruction::Empty),
            Just(Instruction::ReadSysPara),
            Just(Instruction::VfyPwd),
            Just(Instruction::TemplateNum),
            Just(Instruction::ReadIndexTable),
            Just(Instruction::AuraLedConfig),
        ]
    }

    proptest! {
        #[test]
        fn prop_command_round_trip(
            address in any::<u32>(),
            instruction in any_instruction(),
            params in proptest::collection::vec(any::<u8>(), 0..Packet::MAX_PAYLOAD_SIZE),
        ) {
            let packet = Packet::command(address, instruction, &params).unwrap();
            let decoded = Packet::decode(packet.encode()).unwrap();

            prop_assert_eq!(decoded.address, address);
            prop_assert_eq!(decoded.instruction().unwrap(), instruction);
            prop_assert_eq!(decoded.params(), params.as_slice());
        }

        #[test]
        fn prop_payload_bit_flip_detected(
            instruction in any_instruction(),
            params in proptest::collection::vec(any::<u8>(), 0..64),
            position in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let packet = Packet::command(DEFAULT_ADDRESS, instruction, &params).unwrap();
            let mut encoded = packet.encode();

            let offset = Packet::PREFIX_SIZE + position.index(packet.payload.len());
            encoded[offset] ^= 1 << bit;

            let result = Packet::decode(encoded);
            prop_assert!(
                matches!(result, Err(Error::ChecksumMismatch { .. })),
                "flip not detected: {:?}",
                result
            );
        }
    }
}
