//! Owner identities for lock records.
//!
//! The CLI acts as [`user_at_host`] unless `--owner` says otherwise; each
//! command is its own process, so a pid in the identity would make every
//! lock unreleasable from the next invocation.

/// Owner string of the form `user@HOST:pid`, for library callers that hold
/// a lock for the lifetime of one process.
///
/// Two processes run by the same user on the same host still get distinct
/// identities through the pid suffix.
pub fn process_owner() -> String {
    format!("{}:{}", user_at_host(), std::process::id())
}

/// `user@HOST`: the CLI's default owner and the actor recorded in audit events.
pub fn user_at_host() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
