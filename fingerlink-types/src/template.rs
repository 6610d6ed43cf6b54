//! Template metadata

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::{Error, Result};

/// Index of one template location in the sensor library
pub type Slot = u16;

/// Human metadata for one occupied slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub slot: Slot,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub action: Action,

    /// When the template was enrolled through this host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrolled_at: Option<DateTime<Utc>>,
}

impl TemplateRecord {
    /// Longest accepted template name, in characters
    pub const MAX_NAME_LEN: usize = 64;

    /// Record for a slot the host knows nothing about
    pub fn unnamed(slot: Slot) -> Self {
        Self {
            slot,
            name: None,
            action: Action::None,
            enrolled_at: None,
        }
    }

    /// Record for a freshly enrolled template
    pub fn enrolled(slot: Slot, name: Option<String>) -> Self {
        Self {
            slot,
            name,
            action: Action::None,
            enrolled_at: Some(Utc::now()),
        }
    }

    /// Normalize a user-supplied name
    ///
    /// Surrounding whitespace is trimmed and a blank name clears it.
    ///
    /// # Examples
    ///
    /// ```
    /// use fingerlink_types::TemplateRecord;
    ///
    /// assert_eq!(TemplateRecord::normalize_name("  Alice ").unwrap(), Some("Alice".into()));
    /// assert_eq!(TemplateRecord::normalize_name("   ").unwrap(), None);
    /// ```
    pub fn normalize_name(name: &str) -> Result<Option<String>> {
        let name = name.trim();

        if name.is_empty() {
            return Ok(None);
        }

        if name.chars().count() > Self::MAX_NAME_LEN {
            return Err(Error::Validation(format!(
                "name longer than {} characters",
                Self::MAX_NAME_LEN
            )));
        }

        Ok(Some(name.to_string()))
    }

    /// Name for messages
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("slot {}", self.slot),
        }
    }
}

impl fmt::Display for TemplateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Template[slot: {}, name: {}, action: {}]",
            self.slot,
            self.name.as_deref().unwrap_or("-"),
            self.action
        )
    }
}
