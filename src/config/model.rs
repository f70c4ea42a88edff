//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for tablelock.
///
/// This struct represents the contents of `tablelock.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Store settings
    // =========================================================================
    /// Backing store for lock records.
    pub store: StoreKind,

    /// DynamoDB table holding the locks (default: "locks").
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Partition key attribute of the table (default: "ResourceId").
    #[serde(default = "default_key_attribute")]
    pub key_attribute: String,

    /// AWS region; falls back to the SDK's normal resolution when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Endpoint override, e.g. DynamoDB Local.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    /// Directory for the file store (default: ".tablelock/locks").
    #[serde(default = "default_lock_dir")]
    pub lock_dir: String,

    // =========================================================================
    // Lock settings
    // =========================================================================
    /// TTL used when a command does not pass one.
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,

    /// Owner identity override; defaults to `user@HOST`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    // =========================================================================
    // Audit settings
    // =========================================================================
    /// NDJSON file receiving lock events. Disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_log: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreKind::default(),
            table_name: default_table_name(),
            key_attribute: default_key_attribute(),
            region: None,
            endpoint_url: None,
            lock_dir: default_lock_dir(),
            default_ttl_seconds: default_ttl_seconds(),
            owner: None,
            events_log: None,
        }
    }
}
