//! Tests for the lock protocol.

use super::*;
use crate::clock::ManualClock;
use crate::store::MemoryStore;
use chrono::TimeZone;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

const THIRTY_SECONDS: StdDuration = StdDuration::from_secs(30);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn manual_lock() -> (DistributedLock<Arc<MemoryStore>, Arc<ManualClock>>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let lock = DistributedLock::new(Arc::new(MemoryStore::new()), clock.clone());
    (lock, clock)
}

#[test]
fn test_acquire_sets_owner_and_expiry() {
    let (lock, _clock) = manual_lock();

    let record = lock.acquire("migration", "A", THIRTY_SECONDS).unwrap();

    assert_eq!(record.name, "migration");
    assert_eq!(record.owner, "A");
    assert_eq!(record.acquired_at, t0());
    assert_eq!(record.expires_at, t0() + Duration::seconds(30));
    assert_eq!(lock.store().get("migration").unwrap(), Some(record));
}

#[test]
fn test_contention_then_takeover_after_expiry() {
    let (lock, clock) = manual_lock();

    lock.acquire("migration", "A", THIRTY_SECONDS).unwrap();

    clock.advance(Duration::seconds(5));
    let err = lock.acquire("migration", "B", THIRTY_SECONDS).unwrap_err();
    match err {
        LockError::LockContention { name, holder } => {
            assert_eq!(name, "migration");
            assert_eq!(holder, "A");
        }
        other => panic!("expected contention, got {other:?}"),
    }

    clock.set(t0() + Duration::seconds(31));
    let record = lock.acquire("migration", "B", THIRTY_SECONDS).unwrap();
    assert_eq!(record.owner, "B");
    assert_eq!(lock.store().get("migration").unwrap().unwrap().owner, "B");
}

#[test]
fn test_lock_is_takeable_exactly_at_expiry() {
    let (lock, clock) = manual_lock();

    lock.acquire("job", "A", THIRTY_SECONDS).unwrap();
    clock.advance(Duration::seconds(30));

    assert!(lock.acquire("job", "B", THIRTY_SECONDS).is_ok());
}

#[test]
fn test_release_then_immediate_acquire() {
    let (lock, _clock) = manual_lock();

    lock.acquire("migration", "A", THIRTY_SECONDS).unwrap();
    lock.release("migration", "A").unwrap();
    assert!(lock.store().get("migration").unwrap().is_none());

    let record = lock.acquire("migration", "B", THIRTY_SECONDS).unwrap();
    assert_eq!(record.owner, "B");
}

#[test]
fn test_release_by_non_owner_keeps_record() {
    let (lock, _clock) = manual_lock();

    let original = lock.acquire("migration", "A", THIRTY_SECONDS).unwrap();

    let err = lock.release("migration", "B").unwrap_err();
    assert!(matches!(err, LockError::LockNotHeld { .. }));
    assert_eq!(lock.store().get("migration").unwrap(), Some(original));
}

#[test]
fn test_release_missing_lock_is_not_held() {
    let (lock, _clock) = manual_lock();

    let err = lock.release("nothing-here", "A").unwrap_err();
    assert!(matches!(err, LockError::LockNotHeld { .. }));
}

#[test]
fn test_release_after_takeover_leaves_new_owner() {
    let (lock, clock) = manual_lock();

    lock.acquire("migration", "A", THIRTY_SECONDS).unwrap();
    clock.advance(Duration::seconds(40));
    lock.acquire("migration", "B", THIRTY_SECONDS).unwrap();

    // A's TTL lapsed; its late release must not remove B's lock.
    assert!(lock.release("migration", "A").is_err());
    assert_eq!(lock.store().get("migration").unwrap().unwrap().owner, "B");
}

#[test]
fn test_renew_moves_expiry_forward() {
    let (lock, clock) = manual_lock();

    let acquired = lock.acquire("migration", "A", THIRTY_SECONDS).unwrap();
    clock.advance(Duration::seconds(10));

    let renewed = lock.renew("migration", "A", THIRTY_SECONDS).unwrap();
    assert!(renewed.expires_at > acquired.expires_at);
    assert_eq!(renewed.expires_at, t0() + Duration::seconds(40));
    assert_eq!(renewed.acquired_at, acquired.acquired_at);

    // Renewal keeps B out past the original expiry.
    clock.set(t0() + Duration::seconds(35));
    assert!(lock.acquire("migration", "B", THIRTY_SECONDS).is_err());
}

#[test]
fn test_renew_by_other_owner_fails_and_leaves_record() {
    let (lock, clock) = manual_lock();

    let original = lock.acquire("migration", "A", THIRTY_SECONDS).unwrap();
    clock.advance(Duration::seconds(10));

    let err = lock.renew("migration", "B", THIRTY_SECONDS).unwrap_err();
    assert!(matches!(err, LockError::LockNotHeld { .. }));
    assert_eq!(lock.store().get("migration").unwrap(), Some(original));
}

#[test]
fn test_renew_that_does_not_extend_is_rejected() {
    let (lock, _clock) = manual_lock();

    let original = lock.acquire("migration", "A", THIRTY_SECONDS).unwrap();

    // Same instant, same TTL: expiry would not move.
    let err = lock.renew("migration", "A", THIRTY_SECONDS).unwrap_err();
    assert!(matches!(err, LockError::RenewalRejected { .. }));

    let err = lock
        .renew("migration", "A", StdDuration::from_secs(5))
        .unwrap_err();
    assert!(matches!(err, LockError::RenewalRejected { .. }));
    assert_eq!(lock.store().get("migration").unwrap(), Some(original));
}

#[test]
fn test_renew_missing_lock_is_not_held() {
    let (lock, _clock) = manual_lock();

    let err = lock.renew("gone", "A", THIRTY_SECONDS).unwrap_err();
    assert!(matches!(err, LockError::LockNotHeld { .. }));
}

#[test]
fn test_zero_ttl_is_rejected() {
    let (lock, _clock) = manual_lock();

    let err = lock.acquire("job", "A", StdDuration::ZERO).unwrap_err();
    assert!(matches!(err, LockError::UserError(_)));
    assert!(lock.store().get("job").unwrap().is_none());
}

#[test]
fn test_invalid_names_are_rejected() {
    assert!(validate_name("migration").is_ok());
    assert!(validate_name("db.schema-v2_final").is_ok());
    assert!(validate_name("").is_err());
    assert!(validate_name("../etc/passwd").is_err());
    assert!(validate_name("has space").is_err());
    assert!(validate_name(".hidden").is_err());
}

#[test]
fn test_concurrent_acquires_have_single_winner() {
    let clock = Arc::new(ManualClock::new(t0()));
    let lock = DistributedLock::new(Arc::new(MemoryStore::new()), clock);

    let results: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let lock = &lock;
                scope.spawn(move || {
                    lock.acquire("shared", &format!("worker-{i}"), THIRTY_SECONDS)
                        .is_ok()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|won| **won).count(), 1);
}

#[test]
fn test_status_reports_expiry() {
    let (lock, clock) = manual_lock();

    assert!(lock.status("job").unwrap().is_none());

    lock.acquire("job", "A", THIRTY_SECONDS).unwrap();
    clock.advance(Duration::seconds(20));
    let status = lock.status("job").unwrap().unwrap();
    assert!(!status.expired);
    assert_eq!(status.remaining, Duration::seconds(10));
    assert_eq!(status.remaining_string(), "10s");

    clock.advance(Duration::seconds(20));
    let status = lock.status("job").unwrap().unwrap();
    assert!(status.expired);
    assert_eq!(status.remaining, Duration::zero());
    assert!(status.to_string().contains("EXPIRED"));
}

#[test]
fn test_list_is_sorted_by_name() {
    let (lock, _clock) = manual_lock();

    lock.acquire("zeta", "A", THIRTY_SECONDS).unwrap();
    lock.acquire("alpha", "B", THIRTY_SECONDS).unwrap();
    lock.acquire("mid", "C", THIRTY_SECONDS).unwrap();

    let names: Vec<String> = lock
        .list()
        .unwrap()
        .into_iter()
        .map(|s| s.record.name)
        .collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
}

#[test]
fn test_force_clear_ignores_owner() {
    let (lock, _clock) = manual_lock();

    lock.acquire("stuck", "crashed-host", StdDuration::from_secs(3600))
        .unwrap();

    let removed = lock.force_clear("stuck").unwrap().unwrap();
    assert_eq!(removed.owner, "crashed-host");
    assert!(lock.force_clear("stuck").unwrap().is_none());
    assert!(lock.acquire("stuck", "B", THIRTY_SECONDS).is_ok());
}

#[test]
fn test_operation_is_recorded() {
    let (lock, _clock) = manual_lock();

    let record = lock
        .acquire_with_operation("job", "A", THIRTY_SECONDS, Some("reindex".to_string()))
        .unwrap();
    assert_eq!(record.operation.as_deref(), Some("reindex"));
    assert_eq!(
        lock.store().get("job").unwrap().unwrap().operation.as_deref(),
        Some("reindex")
    );
}

#[test]
fn test_guard_releases_on_drop() {
    let (lock, _clock) = manual_lock();

    {
        let guard = lock.hold("job", "A", THIRTY_SECONDS).unwrap();
        assert_eq!(guard.record().owner, "A");
        assert!(lock.acquire("job", "B", THIRTY_SECONDS).is_err());
    }

    assert!(lock.store().get("job").unwrap().is_none());
}

#[test]
fn test_guard_manual_release_and_renew() {
    let (lock, clock) = manual_lock();

    let mut guard = lock.hold("job", "A", THIRTY_SECONDS).unwrap();
    clock.advance(Duration::seconds(10));
    let expires_at = guard.renew(THIRTY_SECONDS).unwrap().expires_at;
    assert_eq!(expires_at, t0() + Duration::seconds(40));

    guard.release().unwrap();
    assert!(lock.store().get("job").unwrap().is_none());
}

#[test]
fn test_guard_that_lost_lock_leaves_new_owner_alone() {
    let (lock, clock) = manual_lock();

    let mut guard = lock.hold("job", "A", THIRTY_SECONDS).unwrap();
    clock.advance(Duration::seconds(31));
    lock.acquire("job", "B", THIRTY_SECONDS).unwrap();

    assert!(matches!(
        guard.renew(THIRTY_SECONDS),
        Err(LockError::LockNotHeld { .. })
    ));
    drop(guard);

    assert_eq!(lock.store().get("job").unwrap().unwrap().owner, "B");
}

#[test]
fn test_record_serialization_omits_missing_operation() {
    let record = LockRecord::new("job", "A", t0(), Duration::seconds(30)).unwrap();
    let json = serde_json::to_string(&record).unwrap();

    assert!(json.contains("\"owner\":\"A\""));
    assert!(!json.contains("operation"));

    let parsed: LockRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, record);
}

#[test]
fn test_record_truncates_to_millis() {
    let now = t0() + Duration::nanoseconds(1_234_567);
    let record = LockRecord::new("job", "A", now, Duration::seconds(1)).unwrap();

    assert_eq!(record.acquired_at, t0() + Duration::milliseconds(1));
}

#[test]
fn test_ttl_past_latest_date_is_user_error() {
    let (lock, _clock) = manual_lock();
    let huge = StdDuration::from_secs(10_000_000_000_000);

    let err = lock.acquire("job", "A", huge).unwrap_err();
    assert!(matches!(err, LockError::UserError(_)));
    assert!(err.to_string().contains("too large"));
    assert!(lock.store().get("job").unwrap().is_none());

    let original = lock.acquire("job", "A", THIRTY_SECONDS).unwrap();
    let err = lock.renew("job", "A", huge).unwrap_err();
    assert!(matches!(err, LockError::UserError(_)));
    assert_eq!(lock.store().get("job").unwrap(), Some(original));
}

#[test]
fn test_owner_can_renew_expired_record_nobody_took() {
    let (lock, clock) = manual_lock();

    lock.acquire("job", "A", THIRTY_SECONDS).unwrap();
    clock.advance(Duration::seconds(45));

    let renewed = lock.renew("job", "A", THIRTY_SECONDS).unwrap();
    assert_eq!(renewed.expires_at, t0() + Duration::seconds(75));
    assert!(lock.acquire("job", "B", THIRTY_SECONDS).is_err());
}

/// Memory store whose reads fail once any renewal has been written.
#[derive(Default)]
struct ReadsFailAfterUpdate {
    inner: MemoryStore,
    updated: AtomicBool,
}

impl LockStore for ReadsFailAfterUpdate {
    fn put_if_absent_or_expired(&self, record: &LockRecord, now: DateTime<Utc>) -> Result<bool> {
        self.inner.put_if_absent_or_expired(record, now)
    }

    fn delete_if_owner(&self, name: &str, owner: &str) -> Result<bool> {
        self.inner.delete_if_owner(name, owner)
    }

    fn update_if_owner(
        &self,
        name: &str,
        owner: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = self.inner.update_if_owner(name, owner, new_expires_at)?;
        self.updated.store(updated, Ordering::SeqCst);
        Ok(updated)
    }

    fn get(&self, name: &str) -> Result<Option<LockRecord>> {
        if self.updated.load(Ordering::SeqCst) {
            return Err(LockError::StoreUnavailable("read timed out".to_string()));
        }
        self.inner.get(name)
    }

    fn list(&self) -> Result<Vec<LockRecord>> {
        self.inner.list()
    }

    fn delete(&self, name: &str) -> Result<Option<LockRecord>> {
        self.inner.delete(name)
    }
}

#[test]
fn test_renewal_that_took_effect_is_reported_as_success() {
    let clock = Arc::new(ManualClock::new(t0()));
    let lock = DistributedLock::new(ReadsFailAfterUpdate::default(), clock.clone());

    let acquired = lock.acquire("job", "A", THIRTY_SECONDS).unwrap();
    clock.advance(Duration::seconds(10));

    let renewed = lock.renew("job", "A", THIRTY_SECONDS).unwrap();
    assert_eq!(renewed.expires_at, t0() + Duration::seconds(40));
    assert_eq!(renewed.acquired_at, acquired.acquired_at);
    assert_eq!(
        lock.store().inner.get("job").unwrap().unwrap().expires_at,
        renewed.expires_at
    );
}

#[test]
fn test_guard_still_releases_after_rejected_renewal() {
    let (lock, _clock) = manual_lock();

    {
        let mut guard = lock.hold("job", "A", THIRTY_SECONDS).unwrap();
        assert!(matches!(
            guard.renew(THIRTY_SECONDS),
            Err(LockError::RenewalRejected { .. })
        ));
    }

    assert!(lock.store().get("job").unwrap().is_none());
}
