//! Protocol constants

/// Frame sync header
pub const HEADER: u16 = 0xEF01;

/// Factory default module address
pub const DEFAULT_ADDRESS: u32 = 0xFFFF_FFFF;

/// Factory default module password
pub const DEFAULT_PASSWORD: u32 = 0x0000_0000;

/// Library capacity assumed until the module reports its own (R503)
pub const DEFAULT_CAPACITY: u16 = 200;

/// Templates covered by one index table page
pub const INDEX_PAGE_SLOTS: u16 = 256;

/// Size of one index table page in bytes
pub const INDEX_PAGE_BYTES: usize = 32;

/// Baud rate unit used by the system parameter block (N x 9600)
pub const BAUD_UNIT: u32 = 9600;

/// Size of the system parameter block returned by ReadSysPara
pub const SYSTEM_PARAMETERS_LEN: usize = 16;

/// Aura LED control codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LedMode {
    Breathing = 1,
    Flashing = 2,
    On = 3,
    Off = 4,
    GradualOn = 5,
    GradualOff = 6,
}

/// Aura LED colors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LedColor {
    Red = 1,
    Blue = 2,
    Purple = 3,
    Green = 4,
    Yellow = 5,
    Cyan = 6,
    White = 7,
}
