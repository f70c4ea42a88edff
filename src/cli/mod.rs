//! CLI argument parsing for tablelock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use crate::config::StoreKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tablelock: named, TTL-bounded locks shared through a conditional-write table.
///
/// Every command is one request against the lock table:
/// - `acquire` succeeds only if the lock is free or its holder's TTL lapsed
/// - `release` and `renew` only act for the current owner
/// - nothing is retried; exit codes tell contention apart from store failures
#[derive(Parser, Debug)]
#[command(name = "tablelock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a YAML config file (default: ./tablelock.yaml if present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backing store: file or dynamodb.
    #[arg(long, global = true, value_parser = parse_store_kind)]
    pub store: Option<StoreKind>,

    /// DynamoDB table name.
    #[arg(long, global = true)]
    pub table: Option<String>,

    /// AWS region.
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Directory used by the file store.
    #[arg(long, global = true)]
    pub lock_dir: Option<String>,

    /// Owner identity to act as (default: user@HOST).
    #[arg(long, global = true)]
    pub owner: Option<String>,

    /// Log store calls to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Available commands for tablelock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Acquire a lock.
    ///
    /// Fails with exit code 4 if another owner holds a live lock.
    Acquire(AcquireArgs),

    /// Release a lock held by --owner.
    ///
    /// Fails with exit code 5 if the lock is held by someone else or missing.
    Release(NameArgs),

    /// Extend a lock held by --owner.
    Renew(RenewArgs),

    /// Show the current record for a lock.
    Status(NameArgs),

    /// List every lock record.
    List,

    /// Remove a lock regardless of owner.
    ///
    /// Requires --force flag to prevent accidental clearing.
    Clear(ClearArgs),

    /// Lock table management (DynamoDB store only).
    Table(TableCommand),
}

/// Arguments naming a single lock.
#[derive(Parser, Debug)]
pub struct NameArgs {
    /// Lock name.
    pub name: String,
}

/// Arguments for the `acquire` command.
#[derive(Parser, Debug)]
pub struct AcquireArgs {
    /// Lock name.
    pub name: String,

    /// Seconds until the lock expires (default from config).
    #[arg(long)]
    pub ttl: Option<u64>,

    /// What the holder is about to do, stored with the lock.
    #[arg(long)]
    pub operation: Option<String>,
}

/// Arguments for the `renew` command.
#[derive(Parser, Debug)]
pub struct RenewArgs {
    /// Lock name.
    pub name: String,

    /// Seconds from now until the lock expires (default from config).
    #[arg(long)]
    pub ttl: Option<u64>,
}

/// Arguments for the `clear` command.
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Lock name.
    pub name: String,

    /// Force clearing the lock (required for safety).
    #[arg(long)]
    pub force: bool,
}

/// Table subcommand wrapper.
#[derive(Parser, Debug)]
pub struct TableCommand {
    #[command(subcommand)]
    pub action: TableAction,
}

/// Available table actions.
#[derive(Subcommand, Debug)]
pub enum TableAction {
    /// Report whether the lock table exists.
    Status,

    /// Delete the lock table.
    ///
    /// Requires --force flag.
    Delete(TableDeleteArgs),
}

/// Arguments for `table delete`.
#[derive(Parser, Debug)]
pub struct TableDeleteArgs {
    /// Confirm deletion of the table and every lock in it.
    #[arg(long)]
    pub force: bool,
}

fn parse_store_kind(s: &str) -> Result<StoreKind, String> {
    StoreKind::from_str(s)
        .ok_or_else(|| format!("unknown store '{}' (expected file or dynamodb)", s))
}
