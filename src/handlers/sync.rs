use anyhow::{anyhow, bail, Result};
use colored::Colorize;
use std::time::Duration;

use crate::engine::{run_sync_pass, CancelFlag, SyncReport};
use crate::watcher;

use super::Runtime;

/// Run one sync pass and report what changed
pub fn handle_sync() -> Result<()> {
    let runtime = Runtime::load()?;
    let ctx = runtime.context(CancelFlag::new())?;

    println!("{}", "Syncing...".cyan().bold());
    let report = run_sync_pass(&ctx)?;
    print_report(&report);

    // The pass completed and the snapshot reflects what succeeded, but a
    // capacity failure still means the directory is not fully synced
    if let Some(failure) = &report.capacity_failure {
        return Err(anyhow!(
            "volume capacity exceeded storing '{}': {} bytes needed, {} remaining — \
             run 'drive-sync volume-top-up' to continue",
            failure.path,
            failure.needed_bytes,
            failure.remaining_bytes
        ));
    }

    Ok(())
}

/// Watch the directory and sync after each burst of changes
pub fn handle_watch(debounce_secs: Option<u64>) -> Result<()> {
    let runtime = Runtime::load()?;
    let debounce = debounce_secs.unwrap_or(runtime.config.watch_debounce_secs);
    let ctx = runtime.context(CancelFlag::new())?;
    watcher::watch_loop(&ctx, Duration::from_secs(debounce))
}

/// Sync on a fixed interval
pub fn handle_schedule(interval_secs: Option<u64>) -> Result<()> {
    let runtime = Runtime::load()?;
    let interval = interval_secs.unwrap_or(runtime.config.schedule_interval_secs);
    if interval == 0 {
        bail!("no interval configured; pass --interval-secs or set schedule-interval-secs");
    }
    let ctx = runtime.context(CancelFlag::new())?;
    watcher::schedule_loop(&ctx, Duration::from_secs(interval))
}

fn print_report(report: &SyncReport) {
    if report.is_noop() {
        println!("{} no changes detected", "✓".green());
    } else {
        println!("{}", "Sync complete".green().bold());
        for (label, count) in [
            ("added", report.added),
            ("uploaded", report.uploaded),
            ("pulled", report.pulled),
            ("deleted locally", report.deleted_local),
            ("deleted remotely", report.deleted_remote),
        ] {
            if count > 0 {
                println!("  {} {count} {label}", "•".cyan());
            }
        }
    }

    if report.deferred > 0 {
        println!(
            "  {} {} file(s) waiting for capacity",
            "!".yellow(),
            report.deferred
        );
    }
    if let Some(index) = report.published_index {
        println!(
            "  {} published at feed index {index}",
            "•".cyan()
        );
    }
    if let Some(manifest) = &report.manifest {
        println!("  {} manifest: {manifest}", "•".cyan());
    }
}
