//! Command implementations for tablelock.
//!
//! This module resolves configuration (file, then command-line overrides),
//! opens the configured store, and routes each CLI command to its handler.

mod inspect;
mod lock;
mod table;


use crate::cli::{Cli, Command};
use crate::config::{Config, StoreKind};
use crate::error::{LockError, Result};
use crate::events::{Event, append_event};
use crate::lock::DistributedLock;
use crate::store::{DynamoDbStore, FileStore, LockStore};
use std::path::Path;

/// Everything a command handler needs.
pub struct CommandContext {
    pub config: Config,
    pub owner: String,
}

impl CommandContext {
    /// Build the context from the config file and command-line overrides.
    pub fn resolve(cli: &Cli, cwd: &Path) -> Result<Self> {
        let mut config = Config::resolve(cli.config.as_deref(), cwd)?;

        if let Some(store) = cli.store {
            config.store = store;
        }
        if let Some(table) = &cli.table {
            config.table_name = table.clone();
        }
        if let Some(region) = &cli.region {
            config.region = Some(region.clone());
        }
        if let Some(lock_dir) = &cli.lock_dir {
            config.lock_dir = lock_dir.clone();
        }
        if let Some(owner) = &cli.owner {
            config.owner = Some(owner.clone());
        }
        config.validate()?;

        let owner = config.owner();
        Ok(Self { config, owner })
    }

    /// Open the configured store as a lock manager.
    pub fn open_lock(&self) -> Result<DistributedLock<Box<dyn LockStore>>> {
        let store: Box<dyn LockStore> = match self.config.store {
            StoreKind::File => Box::new(FileStore::new(&self.config.lock_dir)),
            StoreKind::Dynamodb => Box::new(self.open_dynamodb()?),
            StoreKind::Memory => {
                return Err(LockError::UserError(
                    "the memory store does not outlive a single command; \
                     use --store file or --store dynamodb"
                        .to_string(),
                ));
            }
        };
        Ok(DistributedLock::with_system_clock(store))
    }

    pub fn open_dynamodb(&self) -> Result<DynamoDbStore> {
        DynamoDbStore::connect(&self.config.dynamodb_settings())
    }

    /// Append to the audit log if one is configured.
    ///
    /// The lock operation has already happened by the time this runs, so a
    /// failed write is reported but does not fail the command.
    pub fn record_event(&self, event: Event) {
        let Some(path) = &self.config.events_log else {
            return;
        };
        if let Err(e) = append_event(Path::new(path), &event) {
            tracing::warn!(error = %e, "failed to append lock event");
            eprintln!("Warning: {}", e);
        }
    }
}

/// Dispatch a command to its implementation.
pub fn dispatch(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir()
        .map_err(|e| LockError::UserError(format!("failed to read current directory: {}", e)))?;
    let ctx = CommandContext::resolve(&cli, &cwd)?;
    run(&ctx, cli.command)
}

/// Run a command against an already resolved context.
pub fn run(ctx: &CommandContext, command: Command) -> Result<()> {
    match command {
        Command::Acquire(args) => lock::cmd_acquire(ctx, args),
        Command::Release(args) => lock::cmd_release(ctx, args),
        Command::Renew(args) => lock::cmd_renew(ctx, args),
        Command::Clear(args) => lock::cmd_clear(ctx, args),
        Command::Status(args) => inspect::cmd_status(ctx, args),
        Command::List => inspect::cmd_list(ctx),
        Command::Table(table_cmd) => table::dispatch_table(ctx, table_cmd),
    }
}
