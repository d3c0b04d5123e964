//! Explicit run-scoped store replacing the scripting host's process-wide
//! collection variables. Exactly one logical caller owns it at a time; the
//! sequential-batch assumption is expressed through `&mut` access rather
//! than a lock.

use crate::{data::ReportEntry, error::Error};
use indexmap::IndexMap;
use tracing::warn;

pub const REPORT_KEY_PREFIX: &str = "report_data_";

#[derive(Debug, Default)]
pub struct RunContext {
    values: IndexMap<String, String>,
    serial: u32,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set<S1: Into<String>, S2: Into<String>>(&mut self, key: S1, value: S2) {
        self.values.insert(key.into(), value.into());
    }

    pub fn unset(&mut self, key: &str) {
        self.values.shift_remove(key);
    }

    pub fn keys(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    /// Assigns the next serial number, strictly increasing within a run.
    pub fn next_serial(&mut self) -> u32 {
        self.serial += 1;
        self.serial
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Stores one entry under its zero-padded serial key. Duplicated serials
    /// are a caller bug; last write wins, with a warning.
    pub fn record(&mut self, entry: &ReportEntry) -> Result<(), Error> {
        let key = format!("{}{:03}", REPORT_KEY_PREFIX, entry.serial_number);

        if self.values.contains_key(&key) {
            warn!(serial = entry.serial_number, "duplicate report serial, overwriting");
        }

        let encoded = serde_json::to_string(entry)?;
        self.values.insert(key, encoded);

        Ok(())
    }

    /// All stored entries in serial order. Entries that fail to decode are
    /// skipped with a warning rather than failing the export.
    pub fn entries(&self) -> Vec<ReportEntry> {
        let mut entries: Vec<ReportEntry> = self
            .values
            .iter()
            .filter(|(key, _)| key.starts_with(REPORT_KEY_PREFIX))
            .filter_map(|(key, value)| match serde_json::from_str(value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping undecodable report entry");
                    None
                }
            })
            .collect();

        entries.sort_by_key(|entry: &ReportEntry| entry.serial_number);
        entries
    }

    pub fn entry_count(&self) -> usize {
        self.values
            .keys()
            .filter(|key| key.starts_with(REPORT_KEY_PREFIX))
            .count()
    }

    /// Clears all report entries, transient values and the serial counter.
    /// Keys named in `preserve` keep their values across the reset. The only
    /// supported teardown; always explicit, never implicit.
    pub fn reset(&mut self, preserve: &[String]) {
        self.values
            .retain(|key, _| preserve.iter().any(|kept| kept == key));
        self.serial = 0;
    }
}
