//! Distributed lock arbitrated by a conditional-write table.
//!
//! # Protocol
//!
//! - **acquire**: write `{owner, expires_at = now + ttl}` if no record exists
//!   for the name or the existing record has expired. One conditional write,
//!   no retries.
//! - **release**: delete the record if `owner` still matches.
//! - **renew**: move `expires_at` to `now + ttl` if `owner` still matches and
//!   the new expiry is later than the stored one.
//!
//! Exclusion is decided entirely by the store. A holder that crashes is
//! reclaimed once its TTL lapses; there is no heartbeat.
//!
//! # RAII Guards
//!
//! [`DistributedLock::hold`] wraps an acquisition in a [`LockGuard`] that
//! releases on drop. If that release fails a warning is logged but nothing
//! panics; the TTL eventually frees the lock.

use crate::clock::{Clock, SystemClock};
use crate::error::{LockError, Result};
use crate::store::LockStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One row of the lock table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Name of the protected resource.
    pub name: String,

    /// Identity of the holder.
    pub owner: String,

    /// Instant after which the lock is abandoned.
    pub expires_at: DateTime<Utc>,

    /// When the current owner acquired the lock.
    pub acquired_at: DateTime<Utc>,

    /// What the holder is doing, if it said.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl LockRecord {
    /// Build a record expiring `ttl` after `now`, at millisecond precision.
    ///
    /// Fails with `UserError` if the expiry is past the representable range.
    pub fn new(name: &str, owner: &str, now: DateTime<Utc>, ttl: Duration) -> Result<Self> {
        let now = truncate_millis(now);
        Ok(Self {
            name: name.to_string(),
            owner: owner.to_string(),
            expires_at: expiry_after(now, ttl)?,
            acquired_at: now,
            operation: None,
        })
    }

    /// Attach an operation description.
    pub fn with_operation(mut self, operation: Option<String>) -> Self {
        self.operation = operation;
        self
    }

    /// A record is expired from its `expires_at` instant onward.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Time left before expiry, clamped at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// A record together with its expiry state at the time it was read.
#[derive(Debug, Clone)]
pub struct LockStatus {
    pub record: LockRecord,
    pub expired: bool,
    pub remaining: Duration,
}

impl LockStatus {
    fn at(record: LockRecord, now: DateTime<Utc>) -> Self {
        Self {
            expired: record.is_expired(now),
            remaining: record.remaining(now),
            record,
        }
    }

    /// Format the remaining TTL as a human-readable string.
    pub fn remaining_string(&self) -> String {
        format_duration(self.remaining)
    }
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (owner: {}, expires: {}{})",
            self.record.name,
            self.record.owner,
            self.record.expires_at.format("%Y-%m-%d %H:%M:%S%.3f UTC"),
            if self.expired {
                ", EXPIRED".to_string()
            } else {
                format!(", {} left", self.remaining_string())
            }
        )
    }
}

/// Named locks over a shared [`LockStore`].
#[derive(Debug)]
pub struct DistributedLock<S, C = SystemClock> {
    store: S,
    clock: C,
}

impl<S: LockStore> DistributedLock<S, SystemClock> {
    /// Create a lock manager that reads the system clock.
    pub fn with_system_clock(store: S) -> Self {
        Self::new(store, SystemClock)
    }
}

impl<S: LockStore, C: Clock> DistributedLock<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Try once to take `name` for `owner` for `ttl`.
    ///
    /// # Returns
    ///
    /// * `Ok(LockRecord)` - the record now stored
    /// * `Err(LockError::LockContention)` - a live record belongs to someone else
    /// * `Err(LockError::StoreUnavailable)` - the store call failed
    pub fn acquire(
        &self,
        name: &str,
        owner: &str,
        ttl: std::time::Duration,
    ) -> Result<LockRecord> {
        self.acquire_with_operation(name, owner, ttl, None)
    }

    /// Like [`acquire`](Self::acquire), recording what the holder is doing.
    pub fn acquire_with_operation(
        &self,
        name: &str,
        owner: &str,
        ttl: std::time::Duration,
        operation: Option<String>,
    ) -> Result<LockRecord> {
        validate_name(name)?;
        let ttl = to_chrono_ttl(ttl)?;
        let now = self.clock.now();
        let record = LockRecord::new(name, owner, now, ttl)?.with_operation(operation);

        if self.store.put_if_absent_or_expired(&record, now)? {
            tracing::info!(lock = name, owner, expires_at = %record.expires_at, "lock acquired");
            return Ok(record);
        }

        // Only for the error message; the write above already decided.
        let holder = match self.store.get(name) {
            Ok(Some(existing)) => existing.owner,
            Ok(None) => "an owner that has since released it".to_string(),
            Err(e) => {
                tracing::debug!(lock = name, error = %e, "could not read current holder");
                "unknown".to_string()
            }
        };
        tracing::warn!(lock = name, owner, holder = %holder, "lock contention");
        Err(LockError::LockContention {
            name: name.to_string(),
            holder,
        })
    }

    /// Release `name` if `owner` holds it.
    ///
    /// A caller that no longer owns the record (never did, or its TTL lapsed
    /// and someone else took over) gets `LockNotHeld` and the record is left
    /// untouched.
    pub fn release(&self, name: &str, owner: &str) -> Result<()> {
        validate_name(name)?;
        if self.store.delete_if_owner(name, owner)? {
            tracing::info!(lock = name, owner, "lock released");
            Ok(())
        } else {
            tracing::warn!(lock = name, owner, "release refused: lock not held");
            Err(LockError::LockNotHeld {
                name: name.to_string(),
                owner: owner.to_string(),
            })
        }
    }

    /// Push the expiry of `name` to `now + ttl` if `owner` still holds it.
    ///
    /// An owner may renew its own record even after it has expired, as long
    /// as nobody has taken the lock over in the meantime.
    pub fn renew(&self, name: &str, owner: &str, ttl: std::time::Duration) -> Result<LockRecord> {
        validate_name(name)?;
        let ttl = to_chrono_ttl(ttl)?;
        let new_expires_at = expiry_after(truncate_millis(self.clock.now()), ttl)?;
        let before = self.store.get(name)?;

        if self.store.update_if_owner(name, owner, new_expires_at)? {
            tracing::debug!(lock = name, owner, expires_at = %new_expires_at, "lock renewed");
            return match before {
                Some(mut record) if record.owner == owner => {
                    record.expires_at = new_expires_at;
                    Ok(record)
                }
                // Released and re-acquired by the same owner between the read
                // and the update.
                _ => self.store.get(name)?.ok_or_else(|| LockError::LockNotHeld {
                    name: name.to_string(),
                    owner: owner.to_string(),
                }),
            };
        }

        // Tell a lost lock apart from a renewal that would not move forward.
        match self.store.get(name)? {
            Some(existing) if existing.owner == owner => {
                tracing::warn!(lock = name, owner, "renewal would not extend expiry");
                Err(LockError::RenewalRejected {
                    name: name.to_string(),
                })
            }
            _ => {
                tracing::warn!(lock = name, owner, "renew refused: lock not held");
                Err(LockError::LockNotHeld {
                    name: name.to_string(),
                    owner: owner.to_string(),
                })
            }
        }
    }

    /// Current state of `name`, if a record exists.
    pub fn status(&self, name: &str) -> Result<Option<LockStatus>> {
        validate_name(name)?;
        let now = self.clock.now();
        Ok(self.store.get(name)?.map(|r| LockStatus::at(r, now)))
    }

    /// Every record in the table, sorted by name.
    pub fn list(&self) -> Result<Vec<LockStatus>> {
        let now = self.clock.now();
        let mut locks: Vec<LockStatus> = self
            .store
            .list()?
            .into_iter()
            .map(|r| LockStatus::at(r, now))
            .collect();
        locks.sort_by(|a, b| a.record.name.cmp(&b.record.name));
        Ok(locks)
    }

    /// Remove `name` regardless of owner.
    ///
    /// Only for recovery when a holder is known to be gone but its TTL is
    /// long. The caller decides whether that is safe.
    pub fn force_clear(&self, name: &str) -> Result<Option<LockRecord>> {
        validate_name(name)?;
        let removed = self.store.delete(name)?;
        if let Some(record) = &removed {
            tracing::warn!(lock = name, owner = %record.owner, "lock force-cleared");
        }
        Ok(removed)
    }

    /// Acquire `name` and return a guard that releases it on drop.
    pub fn hold(
        &self,
        name: &str,
        owner: &str,
        ttl: std::time::Duration,
    ) -> Result<LockGuard<'_, S, C>> {
        let record = self.acquire(name, owner, ttl)?;
        Ok(LockGuard {
            lock: self,
            record,
            released: false,
        })
    }
}

/// RAII guard for a held lock.
///
/// When dropped, the lock is released if the guard still believes it owns
/// it. A failed release is logged, never panicked on.
#[derive(Debug)]
pub struct LockGuard<'a, S: LockStore, C: Clock> {
    lock: &'a DistributedLock<S, C>,
    record: LockRecord,
    released: bool,
}

impl<S: LockStore, C: Clock> LockGuard<'_, S, C> {
    /// The record as of the last acquire or renew.
    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    /// Extend the lock. On `LockNotHeld` the guard stops trying to release.
    pub fn renew(&mut self, ttl: std::time::Duration) -> Result<&LockRecord> {
        match self.lock.renew(&self.record.name, &self.record.owner, ttl) {
            Ok(record) => {
                self.record = record;
                Ok(&self.record)
            }
            Err(e) => {
                if e.is_lost_lock() {
                    self.released = true;
                }
                Err(e)
            }
        }
    }

    /// Release now and see the result.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.lock.release(&self.record.name, &self.record.owner)
    }
}

impl<S: LockStore, C: Clock> Drop for LockGuard<'_, S, C> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.lock.release(&self.record.name, &self.record.owner)
        {
            tracing::warn!(lock = %self.record.name, error = %e, "failed to release lock on drop");
        }
    }
}

/// Lock names are table keys and file names; keep them to a safe alphabet.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LockError::UserError("lock name must not be empty".to_string()));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(LockError::UserError(format!(
            "invalid character '{}' in lock name '{}' (allowed: A-Z a-z 0-9 . _ -)",
            c, name
        )));
    }
    if name.starts_with('.') {
        return Err(LockError::UserError(format!(
            "lock name '{}' must not start with '.'",
            name
        )));
    }
    Ok(())
}

fn to_chrono_ttl(ttl: std::time::Duration) -> Result<Duration> {
    if ttl.is_zero() {
        return Err(LockError::UserError("ttl must be greater than 0".to_string()));
    }
    Duration::from_std(ttl).map_err(|_| LockError::UserError(format!("ttl {:?} is too large", ttl)))
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(ttl).ok_or_else(|| {
        LockError::UserError(format!(
            "ttl of {}s is too large: expiry would be past the latest representable date",
            ttl.num_seconds()
        ))
    })
}

/// Drop sub-millisecond precision so every backend stores the same instant.
pub(crate) fn truncate_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

fn format_duration(d: Duration) -> String {
    let seconds = d.num_seconds();
    let minutes = d.num_minutes();
    let hours = d.num_hours();

    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests;
