//! `status` and `list`.

use super::CommandContext;
use crate::cli::NameArgs;
use crate::error::Result;
use crate::lock::LockStatus;

pub fn cmd_status(ctx: &CommandContext, args: NameArgs) -> Result<()> {
    let lock = ctx.open_lock()?;

    match lock.status(&args.name)? {
        Some(status) => print_status(&status),
        None => println!("No lock named '{}'.", args.name),
    }
    Ok(())
}

pub fn cmd_list(ctx: &CommandContext) -> Result<()> {
    let lock = ctx.open_lock()?;
    let locks = lock.list()?;

    if locks.is_empty() {
        println!("No locks.");
        return Ok(());
    }

    println!("Locks ({}):", locks.len());
    println!();
    for status in &locks {
        print_status(status);
    }

    let expired = locks.iter().filter(|s| s.expired).count();
    if expired > 0 {
        println!(
            "Note: {} lock(s) have expired and can be taken by the next acquire.",
            expired
        );
    }
    Ok(())
}

fn print_status(status: &LockStatus) {
    let record = &status.record;
    println!("  {}:", record.name);
    println!("    Owner:      {}", record.owner);
    println!(
        "    Acquired:   {}",
        record.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "    Expires:    {}",
        record.expires_at.format("%Y-%m-%d %H:%M:%S%.3f UTC")
    );
    if let Some(operation) = &record.operation {
        println!("    Operation:  {}", operation);
    }
    if status.expired {
        println!("    Status:     EXPIRED");
    } else {
        println!("    Remaining:  {}", status.remaining_string());
    }
    println!();
}
