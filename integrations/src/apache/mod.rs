//! Apache HTTP server: `mod_status` metrics and `httpd` inventory.

mod inventory;
mod metrics;

pub use inventory::{collect_inventory, parse_modules, parse_version};
pub use metrics::{definitions, fetch_status, parse_status};

use crate::common::{http_client, CommandRunner, ProcessRunner, DEFAULT_TIMEOUT};
use anyhow::Result;
use clap::Args;
use integration_sdk::{populate_metrics, DefaultArgs, Integration};
use std::time::Duration;
use tracing::info;

pub const NAME: &str = "apache";
pub const VERSION: &str = "1.0.0";
pub const EVENT_TYPE: &str = "LoadBalancerSample";
pub const PROVIDER: &str = "Apache";

#[derive(Args, Debug, Clone)]
pub struct ApacheArgs {
    /// Apache status-server URL
    #[arg(long, env = "STATUS_URL", default_value = "http://127.0.0.1/server-status?auto")]
    pub status_url: String,

    /// Apache binary used to list modules and the server version
    #[arg(long, env = "BINARY_PATH", default_value = "/usr/sbin/httpd")]
    pub binary_path: String,

    /// Status request timeout (e.g. 500ms, 2s)
    #[arg(long, env = "TIMEOUT", default_value = DEFAULT_TIMEOUT, value_parser = humantime::parse_duration)]
    pub timeout: Duration,
}

pub async fn run(integration: &mut Integration, defaults: &DefaultArgs, args: &ApacheArgs) -> Result<()> {
    run_with(integration, defaults, args, &ProcessRunner).await
}

pub async fn run_with(
    integration: &mut Integration,
    defaults: &DefaultArgs,
    args: &ApacheArgs,
    runner: &dyn CommandRunner,
) -> Result<()> {
    if defaults.collect_inventory() {
        info!("Getting data for '{}-inventory' plugin", NAME);
        collect_inventory(runner, &args.binary_path, integration.inventory_mut()).await?;
    }

    if defaults.collect_metrics() {
        info!("Getting data for '{}-metrics' plugin", NAME);
        let definitions = definitions()?;
        let client = http_client(args.timeout)?;
        let raw = fetch_status(&client, &args.status_url).await?;

        let mut set = integration.new_metric_set(EVENT_TYPE);
        set.provider(PROVIDER);
        populate_metrics(&mut set, &raw, &definitions);
    }

    Ok(())
}
