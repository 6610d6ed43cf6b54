//! Ring LED cues

use fingerlink_core::constants::{LedColor, LedMode};

/// What the LED should tell the person at the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// Waiting for a finger
    Waiting,
    /// Lift the finger
    Remove,
    Success,
    /// Finger is already enrolled
    Duplicate,
    /// Not recognized or another expected failure
    Failure,
    /// Sensor or link fault
    Error,
}

impl Cue {
    fn pattern(self) -> (LedMode, LedColor) {
        match self {
            Self::Waiting => (LedMode::Breathing, LedColor::Blue),
            Self::Remove => (LedMode::Flashing, LedColor::Purple),
            Self::Success => (LedMode::On, LedColor::Green),
            Self::Duplicate => (LedMode::Flashing, LedColor::Purple),
            Self::Failure => (LedMode::Flashing, LedColor::Red),
            Self::Error => (LedMode::On, LedColor::Red),
        }
    }

    /// Parameters of the Aura LED instruction: control, speed, color, count
    pub fn params(self) -> [u8; 4] {
        let (mode, color) = self.pattern();
        let count = if mode == LedMode::Flashing { 3 } else { 0 };

        [mode as u8, 0x80, color as u8, count]
    }
}
