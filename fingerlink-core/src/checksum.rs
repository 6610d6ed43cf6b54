//! Sensor frame checksum
//!
//! From the module's user manual:
//! 1. Take every byte from the packet identifier up to the last payload byte
//!    (identifier, both length bytes, payload)
//! 2. Sum them as unsigned values
//! 3. Keep the low 16 bits
//!
//! The result is appended to the frame big-endian.

use tracing::trace;

/// Calculate the checksum of a frame body
///
/// # Algorithm
///
/// ```text
/// sum(identifier, len_hi, len_lo, payload...) mod 65536
/// ```
///
/// `length` is the frame's length field, which counts the payload plus the
/// two checksum bytes.
///
/// # Examples
///
/// ```
/// use fingerlink_core::checksum;
///
/// // GenImg command: identifier 0x01, length 0x0003, instruction 0x01
/// assert_eq!(checksum::calculate(0x01, 3, &[0x01]), 0x0005);
/// ```
pub fn calculate(identifier: u8, length: u16, payload: &[u8]) -> u16 {
    let [len_hi, len_lo] = length.to_be_bytes();

    let sum = payload
        .iter()
        .fold(
            u16::from(identifier)
                .wrapping_add(u16::from(len_hi))
                .wrapping_add(u16::from(len_lo)),
            |acc, byte| acc.wrapping_add(u16::from(*byte)),
        );

    trace!(
        identifier = identifier,
        length = length,
        payload_len = payload.len(),
        checksum = format!("0x{:04X}", sum),
        "Calculated checksum"
    );

    sum
}

/// Verify checksum
pub fn verify(identifier: u8, length: u16, payload: &[u8], expected: u16) -> bool {
    calculate(identifier, length, payload) == expected
}
