//! Template registry
//!
//! Slot-keyed metadata (name, bound action) persisted as one JSON object:
//!
//! ```json
//! { "0": { "name": "Alice", "action": "toggle" }, "3": { "action": "none" } }
//! ```
//!
//! Every mutation rewrites the file through a temporary sibling and a
//! rename. The in-memory map is replaced only after the file is on disk,
//! so readers never see a state that failed to persist.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use fingerlink_types::{Action, Slot, TemplateRecord};

use crate::error::{Error, Result};

/// On-disk shape of one entry; the slot is the object key
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,

    #[serde(default)]
    action: Action,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    enrolled_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    fn into_record(self, slot: Slot) -> TemplateRecord {
        TemplateRecord {
            slot,
            name: self.name,
            action: self.action,
            enrolled_at: self.enrolled_at,
        }
    }
}

impl From<&TemplateRecord> for StoredEntry {
    fn from(record: &TemplateRecord) -> Self {
        Self {
            name: record.name.clone(),
            action: record.action,
            enrolled_at: record.enrolled_at,
        }
    }
}

type Records = BTreeMap<Slot, TemplateRecord>;

pub struct TemplateRegistry {
    path: Option<PathBuf>,
    records: RwLock<Records>,
}

impl TemplateRegistry {
    /// Load the registry stored at `path`
    ///
    /// A missing file is an empty registry. An unreadable or corrupt one is
    /// also treated as empty, with a warning; the sensor stays the source of
    /// truth for occupancy and [`crate::SessionController::reconcile`] can
    /// rebuild the entries.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let records = match Self::load(&path) {
            Ok(records) => {
                info!(path = %path.display(), templates = records.len(), "Registry loaded");
                records
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Registry unreadable, starting empty");
                Records::new()
            }
        };

        Self {
            path: Some(path),
            records: RwLock::new(records),
        }
    }

    /// Registry that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: RwLock::new(Records::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, slot: Slot) -> Option<TemplateRecord> {
        self.records.read().get(&slot).cloned()
    }

    pub fn contains(&self, slot: Slot) -> bool {
        self.records.read().contains_key(&slot)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// All records, by slot ascending
    pub fn list(&self) -> Vec<TemplateRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Insert or replace the record for `record.slot`
    pub fn put(&self, record: TemplateRecord) -> Result<()> {
        self.mutate(|records| {
            records.insert(record.slot, record);
        })
    }

    pub fn remove(&self, slot: Slot) -> Result<Option<TemplateRecord>> {
        if !self.contains(slot) {
            return Ok(None);
        }

        self.mutate(|records| records.remove(&slot))
    }

    /// Drop every record in one replace
    pub fn remove_all(&self) -> Result<usize> {
        self.mutate(|records| {
            let removed = records.len();
            records.clear();
            removed
        })
    }

    /// Rename the template at `slot`; a blank name clears it
    pub fn rename(&self, slot: Slot, name: &str) -> Result<TemplateRecord> {
        let name = TemplateRecord::normalize_name(name)?;

        self.update(slot, |record| record.name = name)
    }

    pub fn set_action(&self, slot: Slot, action: Action) -> Result<TemplateRecord> {
        self.update(slot, |record| record.action = action)
    }

    /// Drop records outside `[0, capacity)`
    pub fn retain_below(&self, capacity: u16) -> Result<Vec<Slot>> {
        let stale: Vec<Slot> = self
            .records
            .read()
            .range(capacity..)
            .map(|(slot, _)| *slot)
            .collect();

        if stale.is_empty() {
            return Ok(stale);
        }

        warn!(capacity, ?stale, "Dropping records beyond sensor capacity");
        self.mutate(|records| records.retain(|slot, _| *slot < capacity))?;

        Ok(stale)
    }

    /// Make the records match the sensor's occupancy table
    ///
    /// Occupied slots without a record get an unnamed one; records for empty
    /// or out-of-range slots are dropped. Returns `(added, removed)`.
    pub fn reconcile(&self, occupied: &[bool]) -> Result<(Vec<Slot>, Vec<Slot>)> {
        let (added, removed) = {
            let records = self.records.read();

            let added: Vec<Slot> = occupied
                .iter()
                .enumerate()
                .filter(|(slot, used)| **used && !records.contains_key(&(*slot as Slot)))
                .map(|(slot, _)| slot as Slot)
                .collect();

            let removed: Vec<Slot> = records
                .keys()
                .copied()
                .filter(|slot| !occupied.get(usize::from(*slot)).copied().unwrap_or(false))
                .collect();

            (added, removed)
        };

        if added.is_empty() && removed.is_empty() {
            debug!("Registry already matches sensor");
            return Ok((added, removed));
        }

        self.mutate(|records| {
            for slot in &removed {
                records.remove(slot);
            }
            for slot in &added {
                records.insert(*slot, TemplateRecord::unnamed(*slot));
            }
        })?;

        info!(?added, ?removed, "Registry reconciled");
        Ok((added, removed))
    }

    // Helper methods

    fn update<F>(&self, slot: Slot, f: F) -> Result<TemplateRecord>
    where
        F: FnOnce(&mut TemplateRecord),
    {
        if !self.contains(slot) {
            return Err(Error::UnknownSlot(slot));
        }

        self.mutate(move |records| {
            records.get_mut(&slot).map(|record| {
                f(record);
                record.clone()
            })
        })?
        .ok_or(Error::UnknownSlot(slot))
    }

    /// Apply `f` to a copy, persist the copy, then swap it in
    fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Records) -> T,
    {
        let mut records = self.records.write();

        let mut next = records.clone();
        let output = f(&mut next);

        if let Some(path) = &self.path {
            Self::persist(path, &next)?;
        }

        *records = next;
        Ok(output)
    }

    fn load(path: &Path) -> Result<Records> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Records::new()),
            Err(source) => {
                return Err(Error::Storage {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_slice(&data)?;
        let mut records = Records::new();

        for (key, value) in raw {
            let Ok(slot) = key.trim().parse::<Slot>() else {
                warn!(key = %key, "Skipping registry entry with invalid slot");
                continue;
            };

            let entry = serde_json::from_value::<StoredEntry>(value).unwrap_or_else(|e| {
                warn!(slot, error = %e, "Malformed registry entry, keeping it unnamed");
                StoredEntry::default()
            });

            records.insert(slot, entry.into_record(slot));
        }

        Ok(records)
    }

    fn persist(path: &Path, records: &Records) -> Result<()> {
        let document: BTreeMap<String, StoredEntry> = records
            .iter()
            .map(|(slot, record)| (slot.to_string(), StoredEntry::from(record)))
            .collect();
        let data = serde_json::to_vec_pretty(&document)?;

        let storage = |source: std::io::Error| Error::Storage {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(storage)?;
        }

        let temp_path = path.with_extension("json.tmp");

        let mut file = File::create(&temp_path).map_err(storage)?;
        file.write_all(&data).map_err(storage)?;
        file.sync_all().map_err(storage)?;
        fs::rename(&temp_path, path).map_err(storage)?;

        debug!(path = %path.display(), templates = records.len(), "Registry saved");
        Ok(())
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}
