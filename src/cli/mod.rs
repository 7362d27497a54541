use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::DiffConfig;
use crate::native::{NativeDiff, RecordedDiff, ZfsDiff};
use crate::storage::DirBackend;
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Print the change list of a layer against its parent.
    #[command(alias = "c")]
    Changes {
        #[command(flatten)]
        layer: LayerArgs,

        /// Print a JSON array instead of one `<kind> <path>` line per change.
        #[arg(long)]
        json: bool,
    },

    /// Write the layer diff as a tar archive.
    #[command(alias = "x")]
    Export {
        #[command(flatten)]
        layer: LayerArgs,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Selects the layer pair and the diff facility.
#[derive(ClapArgs, Clone, Debug)]
pub struct LayerArgs {
    /// Directory holding one subdirectory per layer id.
    #[arg(long)]
    pub store: PathBuf,

    /// Layer to diff.
    #[arg(required = true)]
    pub layer: String,

    /// Parent layer. If omitted, every entry of the layer is reported as added.
    #[arg(long, default_value = "")]
    pub parent: String,

    /// Replay recorded `zfs diff -F -H` output instead of running zfs.
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Dataset prefix used to name origin snapshots (e.g. tank/docker).
    #[arg(long)]
    pub dataset: Option<String>,

    /// zfs binary. Overrides LAYERDIFF_ZFS_BIN.
    #[arg(long)]
    pub zfs_bin: Option<PathBuf>,
}

impl LayerArgs {
    /// Config from the environment with command-line overrides applied.
    pub fn config(&self) -> DiffConfig {
        let mut config = DiffConfig::from_env();
        if let Some(bin) = &self.zfs_bin {
            config.zfs_bin = bin.clone();
        }
        config
    }

    pub fn backend(&self) -> DirBackend {
        let backend = DirBackend::new(&self.store);
        match &self.dataset {
            Some(dataset) => backend.with_dataset(dataset),
            None => backend,
        }
    }

    pub fn native_diff(&self, config: &DiffConfig) -> Result<Box<dyn NativeDiff>> {
        Ok(match &self.events {
            Some(path) => Box::new(RecordedDiff::from_file(path)?),
            None => Box::new(ZfsDiff::new(config)),
        })
    }
}

/// Installs the stderr subscriber used by the binary.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "layerdiff=debug" } else { "layerdiff=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parses command-line arguments using `clap`.
pub fn run() -> std::result::Result<Args, Box<dyn std::error::Error>> {
    Ok(Args::try_parse()?)
}
