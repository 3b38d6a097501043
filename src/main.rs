use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use drive_sync::handlers;
use drive_sync::logger;

#[derive(Parser)]
#[command(name = "drive-sync")]
#[command(about = "Sync a local directory with a content-addressed drive manifest", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize drive-sync for a local directory
    Init {
        /// Local folder to keep in sync
        local_dir: PathBuf,

        /// Capacity (bytes) for the storage volume created if none exists
        #[arg(long)]
        capacity: Option<u64>,
    },

    /// Run one synchronization pass
    Sync,

    /// Watch the local folder and sync after each burst of changes
    Watch {
        /// Quiet period in seconds before a sync runs (default from config)
        #[arg(long)]
        debounce_secs: Option<u64>,
    },

    /// Run sync on a fixed interval
    Schedule {
        /// Seconds between passes (default from config)
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Show sync status
    Status,

    /// Print a configuration value
    ConfigGet {
        /// One of: local-dir, store-dir, watch-debounce-secs, schedule-interval-secs
        key: String,
    },

    /// Update a configuration value
    ConfigSet {
        key: String,
        value: String,
    },

    /// Read a feed entry (omit --index for latest)
    FeedGet {
        #[arg(long)]
        index: Option<u64>,
    },

    /// List all files under a manifest version
    ManifestLs {
        /// Manifest version reference
        version: String,
    },

    /// Show the active storage volume
    VolumeShow,

    /// Create a storage volume
    VolumeCreate {
        /// Volume capacity in bytes
        #[arg(long)]
        capacity: u64,
    },

    /// Raise the active volume's capacity
    VolumeTopUp {
        /// Additional capacity in bytes
        #[arg(long)]
        extra: u64,
    },
}

fn main() -> Result<()> {
    logger::init_logger()?;
    logger::rotate_log_if_needed()?;

    if !atty::is(atty::Stream::Stdout) {
        colored::control::set_override(false);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { local_dir, capacity } => {
            handlers::handle_init(&local_dir, capacity)?;
        }
        Commands::Sync => {
            handlers::handle_sync()?;
        }
        Commands::Watch { debounce_secs } => {
            handlers::handle_watch(debounce_secs)?;
        }
        Commands::Schedule { interval_secs } => {
            handlers::handle_schedule(interval_secs)?;
        }
        Commands::Status => {
            handlers::handle_status()?;
        }
        Commands::ConfigGet { key } => {
            handlers::handle_config_get(&key)?;
        }
        Commands::ConfigSet { key, value } => {
            handlers::handle_config_set(&key, &value)?;
        }
        Commands::FeedGet { index } => {
            handlers::handle_feed_get(index)?;
        }
        Commands::ManifestLs { version } => {
            handlers::handle_manifest_ls(&version)?;
        }
        Commands::VolumeShow => {
            handlers::handle_volume_show()?;
        }
        Commands::VolumeCreate { capacity } => {
            handlers::handle_volume_create(capacity)?;
        }
        Commands::VolumeTopUp { extra } => {
            handlers::handle_volume_top_up(extra)?;
        }
    }

    Ok(())
}
