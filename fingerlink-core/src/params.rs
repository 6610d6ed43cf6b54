//! System parameter block returned by ReadSysPara

use std::fmt;

use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};

use crate::constants::{BAUD_UNIT, SYSTEM_PARAMETERS_LEN};
use crate::error::{Error, Result};

bitflags! {
    /// Module status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusRegister: u16 {
        /// Module is executing a command
        const BUSY = 1 << 0;
        /// Last match succeeded
        const PASS = 1 << 1;
        /// Handshake password verified
        const PASSWORD_VERIFIED = 1 << 2;
        /// Image buffer holds a valid image
        const IMAGE_VALID = 1 << 3;
    }
}

/// Module configuration as reported by the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemParameters {
    pub status: StatusRegister,
    pub system_id: u16,
    /// Number of template slots
    pub capacity: u16,
    /// Matching threshold level (1..=5)
    pub security_level: u16,
    pub address: u32,
    /// Data packet size in bytes
    pub packet_size: u16,
    pub baud_rate: u32,
}

impl SystemParameters {
    /// Parse the 16-byte parameter block
    ///
    /// # Examples
    ///
    /// ```
    /// use fingerlink_core::params::SystemParameters;
    ///
    /// let block = [
    ///     0x00, 0x04, 0x00, 0x00, 0x00, 0xC8, 0x00, 0x03,
    ///     0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x02, 0x00, 0x06,
    /// ];
    /// let params = SystemParameters::parse(&block).unwrap();
    /// assert_eq!(params.capacity, 200);
    /// assert_eq!(params.baud_rate, 57600);
    /// ```
    pub fn parse(block: &[u8]) -> Result<Self> {
        if block.len() < SYSTEM_PARAMETERS_LEN {
            return Err(Error::ShortPayload {
                expected: SYSTEM_PARAMETERS_LEN,
                actual: block.len(),
            });
        }

        let packet_size = match BigEndian::read_u16(&block[12..14]) {
            0 => 32,
            1 => 64,
            2 => 128,
            _ => 256,
        };

        Ok(Self {
            status: StatusRegister::from_bits_truncate(BigEndian::read_u16(&block[0..2])),
            system_id: BigEndian::read_u16(&block[2..4]),
            capacity: BigEndian::read_u16(&block[4..6]),
            security_level: BigEndian::read_u16(&block[6..8]),
            address: BigEndian::read_u32(&block[8..12]),
            packet_size,
            baud_rate: u32::from(BigEndian::read_u16(&block[14..16])) * BAUD_UNIT,
        })
    }

    /// Encode back into the 16-byte block layout
    pub fn to_bytes(&self) -> [u8; SYSTEM_PARAMETERS_LEN] {
        let mut block = [0u8; SYSTEM_PARAMETERS_LEN];

        let packet_size_code = match self.packet_size {
            32 => 0,
            64 => 1,
            128 => 2,
            _ => 3,
        };

        BigEndian::write_u16(&mut block[0..2], self.status.bits());
        BigEndian::write_u16(&mut block[2..4], self.system_id);
        BigEndian::write_u16(&mut block[4..6], self.capacity);
        BigEndian::write_u16(&mut block[6..8], self.security_level);
        BigEndian::write_u32(&mut block[8..12], self.address);
        BigEndian::write_u16(&mut block[12..14], packet_size_code);
        BigEndian::write_u16(&mut block[14..16], (self.baud_rate / BAUD_UNIT) as u16);

        block
    }
}

impl fmt::Display for SystemParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sensor[address: 0x{:08X}, capacity: {}, security: {}, baud: {}]",
            self.address, self.capacity, self.security_level, self.baud_rate
        )
    }
}
