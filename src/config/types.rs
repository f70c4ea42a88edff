//! Configuration types and defaults for tablelock.

use serde::{Deserialize, Serialize};

/// Which backing store holds the lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// In-process table; only meaningful for a single process.
    Memory,
    /// One JSON file per lock in `lock_dir`.
    File,
    /// A DynamoDB table (default).
    #[default]
    Dynamodb,
}

impl StoreKind {
    /// Parse a store kind from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "memory" => Some(Self::Memory),
            "file" => Some(Self::File),
            "dynamodb" => Some(Self::Dynamodb),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Dynamodb => "dynamodb",
        }
    }
}

// Default value functions for serde
pub(crate) fn default_table_name() -> String {
    "locks".to_string()
}
pub(crate) fn default_key_attribute() -> String {
    crate::store::dynamodb::DEFAULT_KEY_ATTRIBUTE.to_string()
}
pub(crate) fn default_lock_dir() -> String {
    ".tablelock/locks".to_string()
}
pub(crate) fn default_ttl_seconds() -> u64 {
    30
}
