use clap::Args;
use std::path::PathBuf;

/// Options every integration accepts. Flatten into the binary's own parser.
///
/// The host agent passes configuration through environment variables, so
/// each option can also be set that way.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct DefaultArgs {
    /// Print more information to logs
    #[arg(short, long, env = "VERBOSE")]
    pub verbose: bool,

    /// Print pretty formatted JSON
    #[arg(short, long, env = "PRETTY")]
    pub pretty: bool,

    /// Publish metrics data
    #[arg(long, env = "METRICS")]
    pub metrics: bool,

    /// Publish inventory data
    #[arg(long, env = "INVENTORY")]
    pub inventory: bool,

    /// Publish all kinds of data (metrics, inventory)
    #[arg(long, env = "ALL")]
    pub all: bool,

    /// Rate cache file (defaults to a per-integration file in the temp directory)
    #[arg(long, env = "CACHE_PATH")]
    pub cache_path: Option<PathBuf>,
}

impl DefaultArgs {
    /// With neither `--metrics` nor `--inventory` given, everything is collected.
    fn collect_all(&self) -> bool {
        self.all || (!self.metrics && !self.inventory)
    }

    pub fn collect_metrics(&self) -> bool {
        self.collect_all() || self.metrics
    }

    pub fn collect_inventory(&self) -> bool {
        self.collect_all() || self.inventory
    }
}
