//! tablelock: named, TTL-bounded distributed locks over a conditional-write table.
//!
//! The library half of the `tablelock` CLI. [`lock::DistributedLock`] drives
//! acquire/release/renew against any [`store::LockStore`]; the stores shipped
//! here are an in-process table, a directory of JSON files, and DynamoDB.

pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod identity;
pub mod lock;
pub mod store;
