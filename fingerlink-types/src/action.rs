//! Bound actions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Downstream effect fired when a template's finger is verified
///
/// The dispatcher that executes it is stateless: `Toggle` is forwarded as
/// is and the plug decides what it means.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    #[serde(alias = "na")]
    None,
    On,
    Off,
    Toggle,
}

impl Action {
    /// Check if verifying this template should dispatch anything
    pub fn is_bound(self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::On => "on",
            Self::Off => "off",
            Self::Toggle => "toggle",
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "na" | "" => Ok(Self::None),
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "toggle" => Ok(Self::Toggle),
            other => Err(Error::Parse(format!(
                "unknown action '{}', expected one of none, on, off, toggle",
                other
            ))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert_eq!("on".parse::<Action>().unwrap(), Action::On);
        assert_eq!(" Toggle ".parse::<Action>().unwrap(), Action::Toggle);
        assert_eq!("na".parse::<Action>().unwrap(), Action::None);
        assert!("dim".parse::<Action>().is_err());
    }

    #[test]
    fn test_is_bound() {
        assert!(!Action::None.is_bound());
        assert!(Action::Off.is_bound());
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Action::Toggle).unwrap(), "\"toggle\"");
        assert_eq!(serde_json::from_str::<Action>("\"na\"").unwrap(), Action::None);
    }
}
