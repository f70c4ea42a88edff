//! In-process lock table.
//!
//! The mutex stands in for the per-key linearizability a remote store
//! provides. Only useful when every contender lives in one process.

use super::LockStore;
use crate::error::Result;
use crate::lock::LockRecord;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, LockRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, BTreeMap<String, LockRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl LockStore for MemoryStore {
    fn put_if_absent_or_expired(&self, record: &LockRecord, now: DateTime<Utc>) -> Result<bool> {
        let mut records = self.records();
        if let Some(existing) = records.get(&record.name)
            && !existing.is_expired(now)
        {
            return Ok(false);
        }
        records.insert(record.name.clone(), record.clone());
        Ok(true)
    }

    fn delete_if_owner(&self, name: &str, owner: &str) -> Result<bool> {
        let mut records = self.records();
        match records.get(name) {
            Some(existing) if existing.owner == owner => {
                records.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn update_if_owner(
        &self,
        name: &str,
        owner: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut records = self.records();
        match records.get_mut(name) {
            Some(existing) if existing.owner == owner && existing.expires_at < new_expires_at => {
                existing.expires_at = new_expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn get(&self, name: &str) -> Result<Option<LockRecord>> {
        Ok(self.records().get(name).cloned())
    }

    fn list(&self) -> Result<Vec<LockRecord>> {
        Ok(self.records().values().cloned().collect())
    }

    fn delete(&self, name: &str) -> Result<Option<LockRecord>> {
        Ok(self.records().remove(name))
    }
}
