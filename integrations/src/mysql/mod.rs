//! MySQL: server status counters, global variables and replication role.

mod definitions;

pub use definitions::{default_definitions, extended_definitions, innodb_definitions, myisam_definitions};

use crate::common::{CommandRunner, Invocation, ProcessRunner};
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use integration_sdk::{coerce, populate_metrics, DefaultArgs, Integration, Inventory, RawBag};
use tracing::{debug, info, warn};

pub const NAME: &str = "mysql";
pub const VERSION: &str = "0.2.0";
pub const EVENT_TYPE: &str = "DatastoreSample";
pub const PROVIDER: &str = "MySQL";

const INVENTORY_QUERY: &str = "SHOW GLOBAL VARIABLES";
const METRICS_QUERY: &str = "SHOW /*!50002 GLOBAL */ STATUS";
const REPLICA_QUERY: &str = "SHOW SLAVE STATUS";

/// Variables that derived metrics and attributes read alongside the status counters.
const VARIABLES_FOR_METRICS: [&str; 4] = [
    "key_cache_block_size",
    "key_buffer_size",
    "version_comment",
    "version",
];

#[derive(Args, Debug, Clone)]
pub struct MysqlArgs {
    /// Hostname or IP where MySQL is running
    #[arg(long, env = "HOSTNAME", default_value = "localhost")]
    pub hostname: String,

    /// Port on which MySQL server is listening
    #[arg(long, env = "PORT", default_value_t = 3306)]
    pub port: u16,

    /// Username for accessing the database
    #[arg(long, env = "USERNAME", default_value = "")]
    pub username: String,

    /// Password for the given user
    #[arg(long, env = "PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Database name
    #[arg(long, env = "DATABASE", default_value = "")]
    pub database: String,

    /// Enable extended metrics
    #[arg(long, env = "EXTENDED_METRICS")]
    pub extended_metrics: bool,

    /// Enable InnoDB extended metrics
    #[arg(long, env = "EXTENDED_INNODB_METRICS")]
    pub extended_innodb_metrics: bool,

    /// Enable MyISAM extended metrics
    #[arg(long, env = "EXTENDED_MYISAM_METRICS")]
    pub extended_myisam_metrics: bool,

    /// MySQL command-line client used to run the queries
    #[arg(long, env = "CLIENT_PATH", default_value = "mysql")]
    pub client_path: String,
}

/// Runs a query returning `name, value` rows and collects them into a raw bag.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn query(&self, sql: &str) -> Result<RawBag>;
}

/// Data source backed by the `mysql` command-line client in batch mode.
pub struct MysqlClient<R = ProcessRunner> {
    runner: R,
    args: MysqlArgs,
}

impl MysqlClient {
    pub fn new(args: MysqlArgs) -> Self {
        Self::with_runner(ProcessRunner, args)
    }
}

impl<R: CommandRunner> MysqlClient<R> {
    pub fn with_runner(runner: R, args: MysqlArgs) -> Self {
        Self { runner, args }
    }

    fn invocation(&self, sql: &str) -> Invocation {
        let mut invocation = Invocation::new(&self.args.client_path)
            .arg(format!("--host={}", self.args.hostname))
            .arg(format!("--port={}", self.args.port));

        if !self.args.username.is_empty() {
            invocation = invocation.arg(format!("--user={}", self.args.username));
        }
        if !self.args.database.is_empty() {
            invocation = invocation.arg(format!("--database={}", self.args.database));
        }
        if !self.args.password.is_empty() {
            invocation = invocation.env("MYSQL_PWD", &self.args.password);
        }

        invocation.arg("-B").arg("-N").arg("-e").arg(sql)
    }
}

#[async_trait]
impl<R: CommandRunner> DataSource for MysqlClient<R> {
    async fn query(&self, sql: &str) -> Result<RawBag> {
        debug!("Running query '{}'", sql);
        let output = self
            .runner
            .run(&self.invocation(sql))
            .await
            .with_context(|| format!("Query '{}' failed", sql))?;

        Ok(parse_rows(&output))
    }
}

/// Parses batch-mode output: one `name<TAB>value` row per line. Extra columns
/// are ignored.
pub fn parse_rows(output: &str) -> RawBag {
    output
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .map(|(name, rest)| {
            let value = rest.split('\t').next().unwrap_or_default();
            (unescape(name), coerce(&unescape(value)))
        })
        .collect()
}

/// Reverses the escaping batch mode applies to column values.
fn unescape(column: &str) -> String {
    let mut unescaped = String::with_capacity(column.len());
    let mut chars = column.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => unescaped.push('\t'),
            Some('n') => unescaped.push('\n'),
            Some('0') => unescaped.push('\0'),
            Some(other) => unescaped.push(other),
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

/// Returns the variables (inventory) and the status counters (metrics).
pub async fn get_raw_data(db: &dyn DataSource) -> Result<(RawBag, RawBag)> {
    let inventory = db.query(INVENTORY_QUERY).await?;
    let mut metrics = db.query(METRICS_QUERY).await?;

    match db.query(REPLICA_QUERY).await {
        Ok(replication) if replication.is_empty() => {
            metrics.insert("node_type", "master");
        }
        Ok(_) => {
            metrics.insert("node_type", "slave");
        }
        Err(e) => {
            warn!(
                "Can't get node type, not enough privileges (must grant REPLICATION CLIENT): {:#}",
                e
            );
        }
    }

    for name in VARIABLES_FOR_METRICS {
        if let Some(value) = inventory.get(name) {
            metrics.insert(name, value.clone());
        }
    }

    Ok((inventory, metrics))
}

pub fn populate_variables(inventory: &mut Inventory, raw: &RawBag) {
    for (name, value) in raw {
        inventory.set_item(name.as_str(), "value", value.clone());
    }
}

pub async fn run(integration: &mut Integration, defaults: &DefaultArgs, args: &MysqlArgs) -> Result<()> {
    let db = MysqlClient::new(args.clone());
    run_with(integration, defaults, args, &db).await
}

pub async fn run_with(
    integration: &mut Integration,
    defaults: &DefaultArgs,
    args: &MysqlArgs,
    db: &dyn DataSource,
) -> Result<()> {
    let (raw_inventory, raw_metrics) = get_raw_data(db).await?;

    if defaults.collect_inventory() {
        info!("Getting data for '{}-inventory' plugin", NAME);
        populate_variables(integration.inventory_mut(), &raw_inventory);
    }

    if defaults.collect_metrics() {
        info!("Getting data for '{}-metrics' plugin", NAME);
        let mut tables = vec![default_definitions()?];
        if args.extended_metrics {
            tables.push(extended_definitions()?);
        }
        if args.extended_innodb_metrics {
            tables.push(innodb_definitions()?);
        }
        if args.extended_myisam_metrics {
            tables.push(myisam_definitions()?);
        }

        let mut set = integration.new_metric_set(EVENT_TYPE);
        set.provider(PROVIDER);
        for definitions in &tables {
            populate_metrics(&mut set, &raw_metrics, definitions);
        }
    }

    Ok(())
}
