//! Append-only audit log of lock transitions.
//!
//! Events are stored in NDJSON format (one JSON object per line). Each
//! event has:
//! - `ts`: RFC3339 timestamp
//! - `action`: acquire, release, renew, contention, clear
//! - `actor`: `user@HOST` of the process writing the event
//! - `lock`: the lock name
//! - `details`: freeform object with action-specific details
//!
//! ```no_run
//! use tablelock::events::{Event, EventAction, append_event};
//! use serde_json::json;
//! use std::path::Path;
//!
//! let event = Event::new(EventAction::Acquire, "migration")
//!     .with_details(json!({"owner": "deploy@ci-1:4242", "ttl_seconds": 30}));
//! append_event(Path::new("locks.ndjson"), &event)?;
//! # Ok::<(), tablelock::error::LockError>(())
//! ```

use crate::error::{LockError, Result};
use crate::identity::user_at_host;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Acquire,
    Release,
    Renew,
    /// An acquire lost to another holder.
    Contention,
    /// Lock removed with `clear --force`.
    Clear,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::Acquire => write!(f, "acquire"),
            EventAction::Release => write!(f, "release"),
            EventAction::Renew => write!(f, "renew"),
            EventAction::Contention => write!(f, "contention"),
            EventAction::Clear => write!(f, "clear"),
        }
    }
}

/// An event record for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: DateTime<Utc>,
    pub action: EventAction,
    pub actor: String,
    pub lock: String,
    pub details: Value,
}

impl Event {
    /// Create an event stamped with the current time and actor.
    pub fn new(action: EventAction, lock: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: user_at_host(),
            lock: lock.into(),
            details: Value::Object(serde_json::Map::new()),
        }
    }

    /// Set the details object for this event.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| LockError::UserError(format!("failed to serialize event to JSON: {}", e)))
    }
}

/// Append an event as one line to `path`, creating the file and its parent
/// directory if needed.
pub fn append_event(path: &Path, event: &Event) -> Result<()> {
    let json_line = event.to_ndjson_line()?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            LockError::UserError(format!(
                "failed to create events directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            LockError::UserError(format!(
                "failed to open events file '{}': {}",
                path.display(),
                e
            ))
        })?;

    writeln!(file, "{}", json_line).map_err(|e| {
        LockError::UserError(format!(
            "failed to write event to '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.sync_all().map_err(|e| {
        LockError::UserError(format!(
            "failed to sync events file '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(())
}

/// Read every event from `path`. A missing file reads as empty.
pub fn read_events(path: &Path) -> Result<Vec<Event>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(LockError::UserError(format!(
                "failed to read events file '{}': {}",
                path.display(),
                e
            )));
        }
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| LockError::UserError(format!("failed to parse event: {}", e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_event_serializes_to_single_line() {
        let event = Event::new(EventAction::Acquire, "migration")
            .with_details(json!({"owner": "A", "ttl_seconds": 30}));
        let line = event.to_ndjson_line().unwrap();

        assert!(!line.contains('\n'));
        assert!(line.contains("\"action\":\"acquire\""));
        assert!(line.contains("\"lock\":\"migration\""));
    }

    #[test]
    fn test_append_creates_file_and_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("audit").join("locks.ndjson");

        append_event(&path, &Event::new(EventAction::Acquire, "job")).unwrap();
        append_event(
            &path,
            &Event::new(EventAction::Release, "job").with_details(json!({"owner": "A"})),
        )
        .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, EventAction::Acquire);
        assert_eq!(events[1].action, EventAction::Release);
        assert_eq!(events[1].details["owner"], "A");
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert!(read_events(&temp_dir.path().join("none.ndjson")).unwrap().is_empty());
    }

    #[test]
    fn test_action_display_matches_serde() {
        for action in [
            EventAction::Acquire,
            EventAction::Release,
            EventAction::Renew,
            EventAction::Contention,
            EventAction::Clear,
        ] {
            let serialized = serde_json::to_string(&action).unwrap();
            assert_eq!(serialized, format!("\"{}\"", action));
        }
    }
}
