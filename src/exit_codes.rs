//! Exit code constants for the tablelock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config, invalid lock name)
//! - 3: Backing store unavailable
//! - 4: Lock contention (another owner holds the lock)
//! - 5: Lock not held by the caller (release/renew refused)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, or invalid lock name.
pub const USER_ERROR: i32 = 1;

/// The backing store failed or could not be reached.
pub const STORE_FAILURE: i32 = 3;

/// Lock acquisition lost to another owner.
pub const LOCK_CONTENTION: i32 = 4;

/// The caller does not hold the lock it tried to release or renew.
pub const LOCK_NOT_HELD: i32 = 5;
