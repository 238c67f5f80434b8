//! Cassandra: JMX metrics per node and per table, configuration file inventory.

mod definitions;
mod jmx;

pub use definitions::{common_definitions, node_definitions, table_definitions, NODE_PATTERNS, TABLE_PATTERN};
pub use jmx::{group_tables, parse_response, BeanSource, JmxConnection, NrjmxSource};

use crate::common::{CommandRunner, Invocation, ProcessRunner};
use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use integration_sdk::{populate_inventory, populate_metrics, DefaultArgs, Integration, Inventory, RawBag, RawValue};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const NAME: &str = "cassandra";
pub const VERSION: &str = "1.0.0";
pub const EVENT_TYPE: &str = "DatastoreSample";
pub const PROVIDER: &str = "Cassandra";
pub const TABLE_PROVIDER: &str = "CassandraKeyspace";

/// Bound for a single JMX query; the helper needs a JVM start on the first one.
pub const DEFAULT_JMX_TIMEOUT: &str = "10s";

#[derive(Args, Debug, Clone)]
pub struct CassandraArgs {
    /// Hostname or IP where Cassandra is running
    #[arg(long, env = "HOSTNAME", default_value = "localhost")]
    pub hostname: String,

    /// Port on which the JMX server is listening
    #[arg(long, env = "PORT", default_value_t = 7199)]
    pub port: u16,

    /// Username for accessing JMX
    #[arg(long, env = "USERNAME", default_value = "")]
    pub username: String,

    /// Password for the given user
    #[arg(long, env = "PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Cassandra configuration file
    #[arg(long, env = "CONFIG_PATH", default_value = "/etc/cassandra/cassandra.yaml")]
    pub config_path: PathBuf,

    /// nrjmx helper used to query MBeans
    #[arg(long, env = "NRJMX_PATH", default_value = "nrjmx")]
    pub nrjmx_path: String,

    /// nodetool binary used to read the server version
    #[arg(long, env = "NODETOOL_PATH", default_value = "nodetool")]
    pub nodetool_path: String,

    /// Timeout for each JMX query (e.g. 500ms, 10s)
    #[arg(long, env = "TIMEOUT", default_value = DEFAULT_JMX_TIMEOUT, value_parser = humantime::parse_duration)]
    pub timeout: Duration,
}

impl CassandraArgs {
    pub fn jmx_connection(&self) -> JmxConnection {
        JmxConnection {
            nrjmx_path: self.nrjmx_path.clone(),
            hostname: self.hostname.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: self.timeout,
        }
    }
}

/// Raw data for one run: node beans plus `version`, and per-table bags.
#[derive(Debug, Default)]
pub struct RawMetrics {
    pub node: RawBag,
    pub tables: Vec<RawBag>,
}

/// Reads the server version from `nodetool version` (`ReleaseVersion: x.y.z`).
pub async fn get_version(runner: &dyn CommandRunner, args: &CassandraArgs) -> Result<String> {
    let mut invocation = Invocation::new(&args.nodetool_path);
    if !args.username.is_empty() {
        invocation = invocation.arg(format!("--username={}", args.username));
    }
    if !args.password.is_empty() {
        invocation = invocation.arg(format!("--password={}", args.password));
    }
    let invocation = invocation
        .arg(format!("--host={}", args.hostname))
        .arg(format!("--port={}", args.port))
        .arg("version");

    let output = runner.run(&invocation).await.map_err(|e| {
        debug!("nodetool failed: {:#}", e);
        anyhow!("Can't fetch Cassandra version")
    })?;

    parse_version(&output).ok_or_else(|| anyhow!("Can't fetch Cassandra version"))
}

pub fn parse_version(output: &str) -> Option<String> {
    let parts: Vec<&str> = output.split(':').collect();
    if parts.len() != 2 {
        return None;
    }
    Some(parts[1].trim().to_string())
}

pub async fn get_metrics(
    jmx: &mut dyn BeanSource,
    runner: &dyn CommandRunner,
    args: &CassandraArgs,
) -> Result<RawMetrics> {
    let mut node = RawBag::new();
    for pattern in NODE_PATTERNS {
        let beans = jmx.query(pattern).await?;
        node.extend(beans.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let table_beans = jmx.query(TABLE_PATTERN).await?;
    let tables = group_tables(&table_beans).into_values().collect();

    node.insert("version", get_version(runner, args).await?);

    Ok(RawMetrics { node, tables })
}

pub fn collect_metrics(integration: &mut Integration, raw: &RawMetrics) -> Result<()> {
    let node_definitions = node_definitions()?;
    let table_definitions = table_definitions()?;
    let common_definitions = common_definitions()?;

    let mut set = integration.new_metric_set(EVENT_TYPE);
    set.provider(PROVIDER);
    populate_metrics(&mut set, &raw.node, &node_definitions);
    populate_metrics(&mut set, &raw.node, &common_definitions);

    for table in &raw.tables {
        let mut set = integration.new_metric_set(EVENT_TYPE);
        set.provider(TABLE_PROVIDER);
        if let Some(name) = table.get_str("keyspaceAndTable") {
            set.entity(name);
        }
        populate_metrics(&mut set, table, &table_definitions);
        populate_metrics(&mut set, &raw.node, &common_definitions);
    }

    Ok(())
}

/// Converts a YAML document into raw values. `null` entries are dropped and
/// non-string mapping keys are rendered as strings.
fn yaml_to_raw(value: &serde_yaml::Value) -> Option<RawValue> {
    match value {
        serde_yaml::Value::Null => None,
        serde_yaml::Value::Bool(b) => Some(RawValue::Bool(*b)),
        serde_yaml::Value::Number(n) => match n.as_i64() {
            Some(i) => Some(RawValue::Int(i)),
            None => n.as_f64().map(|f| {
                if f.is_finite() {
                    RawValue::Float(f)
                } else {
                    RawValue::String(f.to_string())
                }
            }),
        },
        serde_yaml::Value::String(s) => Some(RawValue::String(s.clone())),
        serde_yaml::Value::Sequence(items) => Some(RawValue::List(items.iter().filter_map(yaml_to_raw).collect())),
        serde_yaml::Value::Mapping(mapping) => Some(RawValue::Map(yaml_mapping(mapping))),
        serde_yaml::Value::Tagged(tagged) => yaml_to_raw(&tagged.value),
    }
}

fn yaml_key(key: &serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn yaml_mapping(mapping: &serde_yaml::Mapping) -> RawBag {
    mapping
        .iter()
        .filter_map(|(key, value)| Some((yaml_key(key)?, yaml_to_raw(value)?)))
        .collect()
}

pub fn parse_config(content: &str) -> Result<RawBag> {
    let document: serde_yaml::Value = serde_yaml::from_str(content).context("Invalid Cassandra configuration")?;

    match document {
        serde_yaml::Value::Null => Ok(RawBag::new()),
        serde_yaml::Value::Mapping(mapping) => Ok(yaml_mapping(&mapping)),
        _ => bail!("Cassandra configuration is not a mapping"),
    }
}

pub fn collect_inventory(inventory: &mut Inventory, config_path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    let raw = parse_config(&content)?;
    populate_inventory(inventory, &raw);
    Ok(())
}

pub async fn run(integration: &mut Integration, defaults: &DefaultArgs, args: &CassandraArgs) -> Result<()> {
    if defaults.collect_metrics() {
        info!("Getting data for '{}-metrics' plugin", NAME);
        let mut jmx = NrjmxSource::spawn(&args.jmx_connection())?;
        let raw = get_metrics(&mut jmx, &ProcessRunner, args).await;
        jmx.close().await;
        collect_metrics(integration, &raw?)?;
    }

    if defaults.collect_inventory() {
        info!("Getting data for '{}-inventory' plugin", NAME);
        collect_inventory(integration.inventory_mut(), &args.config_path)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassandra::jmx::MockBeanSource;
    use crate::common::MockCommandRunner;
    use integration_sdk::{MemoryRateStore, MetricValue, REDACTED};
    use std::io::Write;

    const CONFIG: &str = r#"
cluster_name: 'Test Cluster'
num_tokens: 256
hinted_handoff_enabled: true
seed_provider:
    - class_name: org.apache.cassandra.locator.SimpleSeedProvider
      parameters:
          - seeds: "127.0.0.1"
client_encryption_options:
    enabled: false
    keystore: conf/.keystore
    keystore_password: cassandra
initial_token:
"#;

    fn args() -> CassandraArgs {
        CassandraArgs {
            hostname: "cassandra.local".to_string(),
            port: 7199,
            username: "admin".to_string(),
            password: "secret".to_string(),
            config_path: PathBuf::from("/etc/cassandra/cassandra.yaml"),
            nrjmx_path: "nrjmx".to_string(),
            nodetool_path: "nodetool".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    fn nodetool(output: &'static str) -> MockCommandRunner {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|invocation| {
                invocation.program == "nodetool"
                    && invocation.args.last().map(String::as_str) == Some("version")
            })
            .returning(move |_| Ok(output.to_string()));
        runner
    }

    fn beans() -> MockBeanSource {
        let mut jmx = MockBeanSource::new();
        jmx.expect_query().returning(|pattern| {
            let response = match pattern {
                "org.apache.cassandra.metrics:type=ClientRequest,scope=*,name=Latency" => r#"{
                    "org.apache.cassandra.metrics:type=ClientRequest,scope=Read,name=Latency,attr=OneMinuteRate": 12.5,
                    "org.apache.cassandra.metrics:type=ClientRequest,scope=Read,name=Latency,attr=99thPercentile": 1500.0
                }"#,
                "org.apache.cassandra.metrics:type=CommitLog,name=*" => r#"{
                    "org.apache.cassandra.metrics:type=CommitLog,name=PendingTasks,attr=Value": 3,
                    "org.apache.cassandra.metrics:type=CommitLog,name=CompletedTasks,attr=Value": 1000
                }"#,
                TABLE_PATTERN => r#"{
                    "org.apache.cassandra.metrics:type=Table,keyspace=shop,scope=orders,name=LiveSSTableCount,attr=Value": 4,
                    "org.apache.cassandra.metrics:type=Table,keyspace=shop,scope=orders,name=ReadLatency,attr=50thPercentile": 250.0,
                    "org.apache.cassandra.metrics:type=Table,keyspace=system,scope=peers,name=LiveSSTableCount,attr=Value": 1
                }"#,
                _ => "{}",
            };
            parse_response(response)
        });
        jmx
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("ReleaseVersion: 3.11.1\n"), Some("3.11.1".to_string()));
        assert_eq!(parse_version("nodetool: Failed to connect to '127.0.0.1:7199'"), None);
        assert_eq!(parse_version(""), None);
    }

    #[tokio::test]
    async fn test_get_version_invocation() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|invocation| {
                invocation.args
                    == [
                        "--username=admin",
                        "--password=secret",
                        "--host=cassandra.local",
                        "--port=7199",
                        "version",
                    ]
            })
            .returning(|_| Ok("ReleaseVersion: 3.11.1\n".to_string()));

        assert_eq!(get_version(&runner, &args()).await.unwrap(), "3.11.1");
    }

    #[tokio::test]
    async fn test_get_version_failure() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Err(anyhow!("nodetool exited with exit status: 1")));

        let error = get_version(&runner, &args()).await.unwrap_err();
        assert_eq!(error.to_string(), "Can't fetch Cassandra version");
    }

    #[tokio::test]
    async fn test_get_metrics() {
        let mut jmx = beans();
        let runner = nodetool("ReleaseVersion: 3.11.1\n");

        let raw = get_metrics(&mut jmx, &runner, &args()).await.unwrap();

        assert_eq!(raw.node.get_str("version"), Some("3.11.1"));
        assert_eq!(
            raw.node.get_int("org.apache.cassandra.metrics:type=CommitLog,name=PendingTasks,attr=Value"),
            Some(3)
        );
        assert_eq!(raw.tables.len(), 1);
    }

    #[tokio::test]
    async fn test_get_metrics_fails_when_a_query_fails() {
        let mut jmx = MockBeanSource::new();
        jmx.expect_query().returning(|_| Err(anyhow!("connection refused")));
        let runner = MockCommandRunner::new();

        assert!(get_metrics(&mut jmx, &runner, &args()).await.is_err());
    }

    #[tokio::test]
    async fn test_collect_metrics() {
        let mut jmx = beans();
        let runner = nodetool("ReleaseVersion: 3.11.1\n");
        let raw = get_metrics(&mut jmx, &runner, &args()).await.unwrap();
        let mut integration = Integration::with_rate_store(NAME, VERSION, false, Box::new(MemoryRateStore::new()));

        collect_metrics(&mut integration, &raw).unwrap();

        let sets = integration.metrics();
        assert_eq!(sets.len(), 2);

        let node = &sets[0];
        assert_eq!(node.provider(), Some(PROVIDER));
        assert_eq!(node.get("provider.readLatencyPerSecond"), Some(&MetricValue::Float(12.5)));
        assert_eq!(node.get("provider.readLatency99thPercentile"), Some(&MetricValue::Float(1.5)));
        assert_eq!(node.get("provider.commitLogPendingTasks"), Some(&MetricValue::Int(3)));
        assert!(!node.contains("provider.commitLogCompletedTasksPerSecond"));
        assert_eq!(
            node.get("software.version"),
            Some(&MetricValue::String("3.11.1".to_string()))
        );

        let table = &sets[1];
        assert_eq!(table.provider(), Some(TABLE_PROVIDER));
        assert_eq!(table.entity(), Some("shop.orders"));
        assert_eq!(table.get("provider.tableLiveSSTableCount"), Some(&MetricValue::Int(4)));
        assert_eq!(
            table.get("provider.tableReadLatency50thPercentile"),
            Some(&MetricValue::Float(0.25))
        );
        assert_eq!(
            table.get("provider.keyspace"),
            Some(&MetricValue::String("shop".to_string()))
        );
        assert_eq!(
            table.get("software.version"),
            Some(&MetricValue::String("3.11.1".to_string()))
        );
    }

    #[test]
    fn test_parse_config() {
        let raw = parse_config(CONFIG).unwrap();

        assert_eq!(raw.get_str("cluster_name"), Some("Test Cluster"));
        assert_eq!(raw.get_int("num_tokens"), Some(256));
        assert!(matches!(raw.get("seed_provider"), Some(RawValue::List(_))));
        assert!(!raw.contains_key("initial_token"));
    }

    #[test]
    fn test_parse_config_edge_cases() {
        assert!(parse_config("").unwrap().is_empty());
        assert!(parse_config("- a\n- b\n").is_err());
        assert!(parse_config("key: [unclosed").is_err());
    }

    #[test]
    fn test_parse_config_keeps_non_finite_numbers_as_text() {
        let raw = parse_config("phi_convict_threshold: .nan\nmax_value_size_in_mb: .inf\nratio: 0.5\n").unwrap();

        assert_eq!(raw.get_str("phi_convict_threshold"), Some("NaN"));
        assert_eq!(raw.get_str("max_value_size_in_mb"), Some("inf"));
        assert_eq!(raw.get_float("ratio"), Some(0.5));
    }

    #[test]
    fn test_collect_inventory() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let mut inventory = Inventory::new();

        collect_inventory(&mut inventory, file.path()).unwrap();

        assert_eq!(
            inventory.get("cluster_name", "value"),
            Some(&RawValue::from("Test Cluster"))
        );
        assert_eq!(
            inventory.get("client_encryption_options", "enabled"),
            Some(&RawValue::Bool(false))
        );
        assert_eq!(
            inventory.get("client_encryption_options", "keystore_password"),
            Some(&RawValue::from(REDACTED))
        );
        assert!(inventory.item("seed_provider").is_none());
    }

    #[test]
    fn test_collect_inventory_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut inventory = Inventory::new();

        let result = collect_inventory(&mut inventory, &dir.path().join("cassandra.yaml"));

        assert!(result.is_err());
        assert!(inventory.is_empty());
    }
}
