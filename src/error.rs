//! Error types for tablelock.
//!
//! Uses thiserror for derive macros. Every failure a caller can react to
//! is a distinct variant; none of them is swallowed inside the library.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// The conditional acquire lost: someone else holds a live lock.
    #[error("lock '{name}' is held by {holder}")]
    LockContention { name: String, holder: String },

    /// Release or renew was attempted by a caller that does not hold the lock.
    #[error("lock '{name}' is not held by {owner}")]
    LockNotHeld { name: String, owner: String },

    /// Renewal would not move the expiry forward.
    #[error("renewal of lock '{name}' would not extend its expiry")]
    RenewalRejected { name: String },

    /// The backing store failed or timed out.
    #[error("lock store unavailable: {0}")]
    StoreUnavailable(String),

    /// Invalid arguments, configuration, or lock name.
    #[error("{0}")]
    UserError(String),
}

impl LockError {
    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            LockError::LockContention { .. } => exit_codes::LOCK_CONTENTION,
            LockError::LockNotHeld { .. } | LockError::RenewalRejected { .. } => {
                exit_codes::LOCK_NOT_HELD
            }
            LockError::StoreUnavailable(_) => exit_codes::STORE_FAILURE,
            LockError::UserError(_) => exit_codes::USER_ERROR,
        }
    }

    /// Whether the caller lost (or never had) ownership.
    ///
    /// A rejected renewal is not a lost lock: the caller still holds it.
    pub fn is_lost_lock(&self) -> bool {
        matches!(self, LockError::LockNotHeld { .. })
    }
}

/// Result type alias for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_has_correct_exit_code() {
        let err = LockError::LockContention {
            name: "migration".to_string(),
            holder: "a@host:1".to_string(),
        };
        assert_eq!(err.exit_code(), exit_codes::LOCK_CONTENTION);
        assert_eq!(err.to_string(), "lock 'migration' is held by a@host:1");
    }

    #[test]
    fn not_held_and_rejected_renewal_share_exit_code() {
        let not_held = LockError::LockNotHeld {
            name: "x".to_string(),
            owner: "b".to_string(),
        };
        let rejected = LockError::RenewalRejected {
            name: "x".to_string(),
        };
        assert_eq!(not_held.exit_code(), exit_codes::LOCK_NOT_HELD);
        assert_eq!(rejected.exit_code(), exit_codes::LOCK_NOT_HELD);
        assert!(not_held.is_lost_lock());
        assert!(!rejected.is_lost_lock());
    }

    #[test]
    fn store_unavailable_has_correct_exit_code() {
        let err = LockError::StoreUnavailable("timeout".to_string());
        assert_eq!(err.exit_code(), exit_codes::STORE_FAILURE);
        assert!(!err.is_lost_lock());
        assert_eq!(err.to_string(), "lock store unavailable: timeout");
    }

    #[test]
    fn user_error_message_is_passed_through() {
        let err = LockError::UserError("ttl must be greater than 0".to_string());
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
        assert_eq!(err.to_string(), "ttl must be greater than 0");
    }
}
