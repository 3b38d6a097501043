//! # drive-sync
//!
//! A command-line tool that keeps a local directory in sync with a remote
//! content-addressed manifest published through a versioned, append-only
//! feed.
//!
//! ## Overview
//!
//! A manifest is a path → content-reference tree describing a complete
//! snapshot of the synced directory. Each successful sync pass that
//! changes content commits a new immutable manifest version and publishes
//! it at the next feed index, so other clients following the feed always
//! see a consistent version. Between passes the tool persists a small
//! snapshot of what it last observed on both sides, which is what makes
//! deletions distinguishable from additions on the next pass.
//!
//! ## Key Features
//!
//! - **Three-way diffing**: previous snapshot vs. current local listing
//!   vs. current remote listing drives adds, uploads, pulls, and
//!   deletions in both directions
//! - **Conflict resolution**: paths that diverged on both sides are
//!   resolved by modification time against the last sync
//! - **Capacity admission**: uploads are gated against the remaining
//!   storage-volume budget, smallest first; files that do not fit are
//!   deferred, never mistaken for deletions
//! - **Watch and schedule modes**: debounced file watching or
//!   fixed-interval syncing on top of the same engine
//!
//! ## Architecture
//!
//! The engine ([`engine`]) is the core; everything else is thin glue
//! around it ([`handlers`], [`watcher`]) or a collaborator it calls
//! through an explicit seam ([`store`], [`snapshot`]).

/// Platform config-dir management and the persisted tool configuration.
pub mod config;

/// The synchronization engine: diffing, conflict resolution, capacity
/// admission, and the orchestrated sync pass.
pub mod engine;

/// Command handlers: thin glue between the CLI and the engine.
pub mod handlers;

/// Logging setup: console via `RUST_LOG`, plus a rotating log file in the
/// config directory.
pub mod logger;

/// The engine's persisted observation record (what was seen locally and
/// remotely at the last successful sync).
pub mod snapshot;

/// The manifest-store seam and the bundled filesystem backend.
pub mod store;

/// Watch and schedule loops that re-run the engine.
pub mod watcher;
