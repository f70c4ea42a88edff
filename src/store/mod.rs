//! Backing stores for lock records.
//!
//! A store is the single point of serialization for a lock: every mutating
//! call is one atomic conditional write. `Ok(false)` means the condition did
//! not hold; `Err` means the store itself failed.

pub mod dynamodb;
pub mod file;
pub mod memory;

pub use dynamodb::{DynamoDbSettings, DynamoDbStore};
pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::lock::LockRecord;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Conditional-write key-value table holding lock records keyed by name.
pub trait LockStore: Send + Sync {
    /// Write `record` if no record exists for its name, or the existing one
    /// has `expires_at <= now`.
    fn put_if_absent_or_expired(&self, record: &LockRecord, now: DateTime<Utc>) -> Result<bool>;

    /// Delete the record for `name` if it is owned by `owner`.
    fn delete_if_owner(&self, name: &str, owner: &str) -> Result<bool>;

    /// Set `expires_at` to `new_expires_at` if the record is owned by `owner`
    /// and its current expiry is strictly earlier.
    fn update_if_owner(
        &self,
        name: &str,
        owner: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Read the record for `name`.
    fn get(&self, name: &str) -> Result<Option<LockRecord>>;

    /// Read every record.
    fn list(&self) -> Result<Vec<LockRecord>>;

    /// Unconditionally delete the record for `name`, returning what was removed.
    fn delete(&self, name: &str) -> Result<Option<LockRecord>>;
}

impl<S: LockStore + ?Sized> LockStore for Box<S> {
    fn put_if_absent_or_expired(&self, record: &LockRecord, now: DateTime<Utc>) -> Result<bool> {
        (**self).put_if_absent_or_expired(record, now)
    }

    fn delete_if_owner(&self, name: &str, owner: &str) -> Result<bool> {
        (**self).delete_if_owner(name, owner)
    }

    fn update_if_owner(
        &self,
        name: &str,
        owner: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        (**self).update_if_owner(name, owner, new_expires_at)
    }

    fn get(&self, name: &str) -> Result<Option<LockRecord>> {
        (**self).get(name)
    }

    fn list(&self) -> Result<Vec<LockRecord>> {
        (**self).list()
    }

    fn delete(&self, name: &str) -> Result<Option<LockRecord>> {
        (**self).delete(name)
    }
}

impl<S: LockStore + ?Sized> LockStore for Arc<S> {
    fn put_if_absent_or_expired(&self, record: &LockRecord, now: DateTime<Utc>) -> Result<bool> {
        (**self).put_if_absent_or_expired(record, now)
    }

    fn delete_if_owner(&self, name: &str, owner: &str) -> Result<bool> {
        (**self).delete_if_owner(name, owner)
    }

    fn update_if_owner(
        &self,
        name: &str,
        owner: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        (**self).update_if_owner(name, owner, new_expires_at)
    }

    fn get(&self, name: &str) -> Result<Option<LockRecord>> {
        (**self).get(name)
    }

    fn list(&self) -> Result<Vec<LockRecord>> {
        (**self).list()
    }

    fn delete(&self, name: &str) -> Result<Option<LockRecord>> {
        (**self).delete(name)
    }
}
