//! `acquire`, `release`, `renew` and `clear`.

use super::CommandContext;
use crate::cli::{AcquireArgs, ClearArgs, NameArgs, RenewArgs};
use crate::error::{LockError, Result};
use crate::events::{Event, EventAction};
use serde_json::json;
use std::time::Duration;

pub fn cmd_acquire(ctx: &CommandContext, args: AcquireArgs) -> Result<()> {
    let lock = ctx.open_lock()?;
    let ttl = ttl_or_default(ctx, args.ttl);

    match lock.acquire_with_operation(&args.name, &ctx.owner, ttl, args.operation.clone()) {
        Ok(record) => {
            ctx.record_event(Event::new(EventAction::Acquire, &args.name).with_details(json!({
                "owner": record.owner,
                "expires_at": record.expires_at,
                "ttl_seconds": ttl.as_secs(),
                "operation": record.operation,
            })));
            println!("Acquired lock '{}'", record.name);
            println!("  Owner:    {}", record.owner);
            println!("  Expires:  {}", record.expires_at.format("%Y-%m-%d %H:%M:%S%.3f UTC"));
            Ok(())
        }
        Err(err) => {
            if let LockError::LockContention { holder, .. } = &err {
                ctx.record_event(Event::new(EventAction::Contention, &args.name).with_details(
                    json!({
                        "owner": ctx.owner,
                        "holder": holder,
                    }),
                ));
            }
            Err(err)
        }
    }
}

pub fn cmd_release(ctx: &CommandContext, args: NameArgs) -> Result<()> {
    let lock = ctx.open_lock()?;
    lock.release(&args.name, &ctx.owner)?;

    ctx.record_event(
        Event::new(EventAction::Release, &args.name).with_details(json!({ "owner": ctx.owner })),
    );
    println!("Released lock '{}'", args.name);
    Ok(())
}

pub fn cmd_renew(ctx: &CommandContext, args: RenewArgs) -> Result<()> {
    let lock = ctx.open_lock()?;
    let ttl = ttl_or_default(ctx, args.ttl);
    let record = lock.renew(&args.name, &ctx.owner, ttl)?;

    ctx.record_event(Event::new(EventAction::Renew, &args.name).with_details(json!({
        "owner": record.owner,
        "expires_at": record.expires_at,
        "ttl_seconds": ttl.as_secs(),
    })));
    println!(
        "Renewed lock '{}' until {}",
        record.name,
        record.expires_at.format("%Y-%m-%d %H:%M:%S%.3f UTC")
    );
    Ok(())
}

pub fn cmd_clear(ctx: &CommandContext, args: ClearArgs) -> Result<()> {
    if !args.force {
        return Err(LockError::UserError(format!(
            "refusing to clear lock without --force flag.\n\n\
             Clearing a lock lets another owner in while the current holder may still be working.\n\
             Only clear locks if you are certain the holder has crashed.\n\n\
             To clear the lock, run:\n  tablelock clear {} --force",
            args.name
        )));
    }

    let lock = ctx.open_lock()?;
    match lock.force_clear(&args.name)? {
        Some(record) => {
            ctx.record_event(Event::new(EventAction::Clear, &args.name).with_details(json!({
                "previous_owner": record.owner,
                "expires_at": record.expires_at,
            })));
            println!("Cleared lock '{}' (was held by {})", record.name, record.owner);
        }
        None => println!("No lock named '{}'.", args.name),
    }
    Ok(())
}

fn ttl_or_default(ctx: &CommandContext, seconds: Option<u64>) -> Duration {
    seconds
        .map(Duration::from_secs)
        .unwrap_or_else(|| ctx.config.default_ttl())
}
