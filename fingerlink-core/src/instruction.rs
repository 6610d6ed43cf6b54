//! Sensor instruction and confirmation code definitions

use std::fmt;

use crate::error::{Error, Result};

/// Instruction codes
///
/// The subset of the R30x/R503 instruction set the controller drives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Instruction {
    // Image capture and feature extraction
    GenImg = 0x01,
    Img2Tz = 0x02,
    Match = 0x03,
    Search = 0x04,
    RegModel = 0x05,

    // Template library
    Store = 0x06,
    LoadChar = 0x07,
    UpChar = 0x08,
    DownChar = 0x09,
    DeletChar = 0x0C,
    Empty = 0x0D,

    // System
    SetSysPara = 0x0E,
    ReadSysPara = 0x0F,
    SetPwd = 0x12,
    VfyPwd = 0x13,
    TemplateNum = 0x1D,
    ReadIndexTable = 0x1F,

    // Peripherals
    AuraLedConfig = 0x35,
    HandShake = 0x40,
}

impl Instruction {
    /// Check if the instruction reads or writes the template library
    pub fn touches_library(self) -> bool {
        matches!(
            self,
            Self::Search
                | Self::Store
                | Self::LoadChar
                | Self::DeletChar
                | Self::Empty
                | Self::TemplateNum
                | Self::ReadIndexTable
        )
    }

    /// Check if the instruction needs a finger on the sensor
    pub fn needs_finger(self) -> bool {
        matches!(self, Self::GenImg)
    }

    /// Get instruction name
    pub fn name(self) -> &'static str {
        match self {
            Self::GenImg => "GenImg",
            Self::Img2Tz => "Img2Tz",
            Self::Match => "Match",
            Self::Search => "Search",
            Self::RegModel => "RegModel",
            Self::Store => "Store",
            Self::LoadChar => "LoadChar",
            Self::UpChar => "UpChar",
            Self::DownChar => "DownChar",
            Self::DeletChar => "DeletChar",
            Self::Empty => "Empty",
            Self::SetSysPara => "SetSysPara",
            Self::ReadSysPara => "ReadSysPara",
            Self::SetPwd => "SetPwd",
            Self::VfyPwd => "VfyPwd",
            Self::TemplateNum => "TemplateNum",
            Self::ReadIndexTable => "ReadIndexTable",
            Self::AuraLedConfig => "AuraLedConfig",
            Self::HandShake => "HandShake",
        }
    }
}

impl From<Instruction> for u8 {
    fn from(instruction: Instruction) -> u8 {
        instruction as u8
    }
}

impl TryFrom<u8> for Instruction {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::GenImg),
            0x02 => Ok(Self::Img2Tz),
            0x03 => Ok(Self::Match),
            0x04 => Ok(Self::Search),
            0x05 => Ok(Self::RegModel),
            0x06 => Ok(Self::Store),
            0x07 => Ok(Self::LoadChar),
            0x08 => Ok(Self::UpChar),
            0x09 => Ok(Self::DownChar),
            0x0C => Ok(Self::DeletChar),
            0x0D => Ok(Self::Empty),
            0x0E => Ok(Self::SetSysPara),
            0x0F => Ok(Self::ReadSysPara),
            0x12 => Ok(Self::SetPwd),
            0x13 => Ok(Self::VfyPwd),
            0x1D => Ok(Self::TemplateNum),
            0x1F => Ok(Self::ReadIndexTable),
            0x35 => Ok(Self::AuraLedConfig),
            0x40 => Ok(Self::HandShake),
            _ => Err(Error::UnknownInstruction(value)),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

/// Character buffer selector for Img2Tz, Search and Store
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum CharBuffer {
    One = 0x01,
    Two = 0x02,
}

impl From<CharBuffer> for u8 {
    fn from(buffer: CharBuffer) -> u8 {
        buffer as u8
    }
}

/// Confirmation codes carried in the first payload byte of every
/// acknowledge frame
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Confirmation {
    Ok,
    PacketReceiveError,
    NoFinger,
    EnrollFailed,
    ImageDisorderly,
    TooFewFeatures,
    NoMatch,
    NotFound,
    CombineFailed,
    PageOutOfRange,
    TemplateReadError,
    UploadFeatureFailed,
    DataReceiveError,
    UploadImageFailed,
    DeleteFailed,
    ClearFailed,
    WrongPassword,
    InvalidImage,
    FlashWriteError,
    InvalidRegister,
    Other(u8),
}

impl Confirmation {
    /// Raw confirmation byte
    pub fn code(self) -> u8 {
        match self {
            Self::Ok => 0x00,
            Self::PacketReceiveError => 0x01,
            Self::NoFinger => 0x02,
            Self::EnrollFailed => 0x03,
            Self::ImageDisorderly => 0x06,
            Self::TooFewFeatures => 0x07,
            Self::NoMatch => 0x08,
            Self::NotFound => 0x09,
            Self::CombineFailed => 0x0A,
            Self::PageOutOfRange => 0x0B,
            Self::TemplateReadError => 0x0C,
            Self::UploadFeatureFailed => 0x0D,
            Self::DataReceiveError => 0x0E,
            Self::UploadImageFailed => 0x0F,
            Self::DeleteFailed => 0x10,
            Self::ClearFailed => 0x11,
            Self::WrongPassword => 0x13,
            Self::InvalidImage => 0x15,
            Self::FlashWriteError => 0x18,
            Self::InvalidRegister => 0x1A,
            Self::Other(code) => code,
        }
    }

    /// Check if the sensor accepted the instruction
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Check if the code reports a poor capture that a fresh placement may fix
    pub fn is_bad_image(self) -> bool {
        matches!(
            self,
            Self::EnrollFailed | Self::ImageDisorderly | Self::TooFewFeatures | Self::InvalidImage
        )
    }

    /// Human description from the module manual
    pub fn describe(self) -> &'static str {
        match self {
            Self::Ok => "command execution complete",
            Self::PacketReceiveError => "error when receiving data package",
            Self::NoFinger => "no finger on the sensor",
            Self::EnrollFailed => "fail to enroll the finger",
            Self::ImageDisorderly => "fingerprint image too disorderly",
            Self::TooFewFeatures => "too few feature points",
            Self::NoMatch => "finger doesn't match",
            Self::NotFound => "no matching fingerprint found",
            Self::CombineFailed => "fail to combine the character files",
            Self::PageOutOfRange => "page id beyond the finger library",
            Self::TemplateReadError => "error when reading template",
            Self::UploadFeatureFailed => "error when uploading template",
            Self::DataReceiveError => "module can't receive the following data packages",
            Self::UploadImageFailed => "error when uploading image",
            Self::DeleteFailed => "fail to delete the template",
            Self::ClearFailed => "fail to clear finger library",
            Self::WrongPassword => "wrong password",
            Self::InvalidImage => "fail to generate image for lack of valid primary image",
            Self::FlashWriteError => "error when writing flash",
            Self::InvalidRegister => "invalid register number",
            Self::Other(_) => "undocumented confirmation code",
        }
    }
}

impl From<u8> for Confirmation {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Self::Ok,
            0x01 => Self::PacketReceiveError,
            0x02 => Self::NoFinger,
            0x03 => Self::EnrollFailed,
            0x06 => Self::ImageDisorderly,
            0x07 => Self::TooFewFeatures,
            0x08 => Self::NoMatch,
            0x09 => Self::NotFound,
            0x0A => Self::CombineFailed,
            0x0B => Self::PageOutOfRange,
            0x0C => Self::TemplateReadError,
            0x0D => Self::UploadFeatureFailed,
            0x0E => Self::DataReceiveError,
            0x0F => Self::UploadImageFailed,
            0x10 => Self::DeleteFailed,
            0x11 => Self::ClearFailed,
            0x13 => Self::WrongPassword,
            0x15 => Self::InvalidImage,
            0x18 => Self::FlashWriteError,
            0x1A => Self::InvalidRegister,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} ({})", self.code(), self.describe())
    }
}
