//! Watch and schedule modes.
//!
//! Both are thin wrappers that re-run the sync engine: the watcher reacts
//! to file events after a quiet period, the scheduler fires on a fixed
//! interval. Passes never overlap — each loop runs a pass to completion
//! before listening again. Per-pass failures are logged and the loop
//! continues; only startup errors are fatal.

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::engine::{run_sync_pass, SyncContext, SyncReport};
use crate::logger::log_to_file;

/// How often the event loop wakes to check the debounce window and the
/// cancel flag
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Watch the sync directory and run a pass after each burst of changes.
///
/// An initial pass runs before watching starts, so a directory that
/// changed while the tool was down catches up immediately.
pub fn watch_loop(ctx: &SyncContext, debounce: Duration) -> Result<()> {
    log::info!(
        "watching {} for changes (debounce: {}s)",
        ctx.local_dir.display(),
        debounce.as_secs()
    );

    run_logged_pass(ctx, "initial");

    let (tx, rx) = mpsc::channel();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |event: Result<notify::Event, notify::Error>| {
            // Errors are reported through the same channel and logged by
            // the loop; a watch error must not kill the sender thread
            let _ = tx.send(event);
        })
        .context("Failed to create file watcher")?;
    watcher
        .watch(ctx.local_dir, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", ctx.local_dir.display()))?;

    let mut last_event: Option<Instant> = None;

    loop {
        if ctx.cancel.is_cancelled() {
            log::info!("watcher stopping");
            return Ok(());
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(event)) => {
                if relevant_event(ctx, &event) {
                    log::debug!("file event: {:?}", event.kind);
                    last_event = Some(Instant::now());
                }
            }
            Ok(Err(e)) => {
                log::warn!("watcher error: {e}");
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                anyhow::bail!("file watcher channel closed unexpectedly");
            }
        }

        if let Some(instant) = last_event {
            if instant.elapsed() >= debounce {
                last_event = None;
                log::info!("change detected, running sync");
                run_logged_pass(ctx, "watch");
            }
        }
    }
}

/// Run a pass every `interval`, forever (or until cancelled).
pub fn schedule_loop(ctx: &SyncContext, interval: Duration) -> Result<()> {
    log::info!(
        "scheduling sync of {} every {}s",
        ctx.local_dir.display(),
        interval.as_secs()
    );

    run_logged_pass(ctx, "initial");

    loop {
        let deadline = Instant::now() + interval;
        while Instant::now() < deadline {
            if ctx.cancel.is_cancelled() {
                log::info!("scheduler stopping");
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        run_logged_pass(ctx, "scheduled");
    }
}

/// Events below an excluded prefix (the tool's own artifacts) are ignored
fn relevant_event(ctx: &SyncContext, event: &notify::Event) -> bool {
    event
        .paths
        .iter()
        .any(|path| !ctx.excluded.iter().any(|ex| path.starts_with(ex)))
}

/// One pass; failures are logged and swallowed so the loop survives
fn run_logged_pass(ctx: &SyncContext, origin: &str) {
    match run_sync_pass(ctx) {
        Ok(report) => {
            let _ = log_to_file(&format!("{origin} sync: {}", summarize(&report)));
        }
        Err(e) => {
            log::error!("{origin} sync failed: {e:#}");
            let _ = log_to_file(&format!("{origin} sync failed: {e:#}"));
        }
    }
}

fn summarize(report: &SyncReport) -> String {
    if report.is_noop() {
        return "no changes".to_string();
    }
    format!(
        "added {}, uploaded {}, pulled {}, deleted {} local / {} remote, deferred {}",
        report.added,
        report.uploaded,
        report.pulled,
        report.deleted_local,
        report.deleted_remote,
        report.deferred
    )
}
