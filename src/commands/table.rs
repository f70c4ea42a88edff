//! `table status` and `table delete`.

use super::CommandContext;
use crate::cli::{TableAction, TableCommand, TableDeleteArgs};
use crate::config::StoreKind;
use crate::error::{LockError, Result};

pub fn dispatch_table(ctx: &CommandContext, table_cmd: TableCommand) -> Result<()> {
    if ctx.config.store != StoreKind::Dynamodb {
        return Err(LockError::UserError(format!(
            "table commands need the dynamodb store (configured: {})",
            ctx.config.store.as_str()
        )));
    }

    match table_cmd.action {
        TableAction::Status => cmd_table_status(ctx),
        TableAction::Delete(args) => cmd_table_delete(ctx, args),
    }
}

fn cmd_table_status(ctx: &CommandContext) -> Result<()> {
    let store = ctx.open_dynamodb()?;
    if store.exists()? {
        println!("Table '{}' exists.", store.table_name());
    } else {
        println!("Table '{}' does not exist.", store.table_name());
    }
    Ok(())
}

fn cmd_table_delete(ctx: &CommandContext, args: TableDeleteArgs) -> Result<()> {
    if !args.force {
        return Err(LockError::UserError(format!(
            "refusing to delete table '{}' without --force flag.\n\n\
             Deleting the table drops every lock in it.",
            ctx.config.table_name
        )));
    }

    let store = ctx.open_dynamodb()?;
    store.delete_table()?;
    println!("Deleted table '{}'.", store.table_name());
    Ok(())
}
