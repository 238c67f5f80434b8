use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use integration_sdk::RawBag;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

const SYSTEM_KEYSPACES: [&str; 6] = [
    "OpsCenter",
    "system",
    "system_auth",
    "system_distributed",
    "system_schema",
    "system_traces",
];

/// Answers MBean queries. Each result maps `<bean name>,attr=<attribute>` to
/// the attribute value.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BeanSource: Send {
    async fn query(&mut self, pattern: &str) -> Result<RawBag>;
}

/// Connection parameters for the `nrjmx` helper.
#[derive(Debug, Clone)]
pub struct JmxConnection {
    pub nrjmx_path: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// Bean source backed by a long-running `nrjmx` process: one query pattern
/// per input line, one JSON object per output line.
pub struct NrjmxSource {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    timeout: Duration,
}

impl NrjmxSource {
    pub fn spawn(connection: &JmxConnection) -> Result<Self> {
        debug!(
            "Starting {} for {}:{}",
            connection.nrjmx_path, connection.hostname, connection.port
        );

        let mut command = Command::new(&connection.nrjmx_path);
        command
            .arg("-hostname")
            .arg(&connection.hostname)
            .arg("-port")
            .arg(connection.port.to_string());
        if !connection.username.is_empty() {
            command.arg("-username").arg(&connection.username);
        }
        if !connection.password.is_empty() {
            command.arg("-password").arg(&connection.password);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", connection.nrjmx_path))?;

        let stdin = child.stdin.take().context("nrjmx stdin is not piped")?;
        let stdout = child.stdout.take().context("nrjmx stdout is not piped")?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            timeout: connection.timeout,
        })
    }

    /// Closes the query stream and waits for the helper to exit.
    pub async fn close(mut self) {
        drop(self.stdin);
        if tokio::time::timeout(self.timeout, self.child.wait()).await.is_err() {
            debug!("nrjmx did not exit in time, killing it");
            let _ = self.child.kill().await;
        }
    }
}

#[async_trait]
impl BeanSource for NrjmxSource {
    async fn query(&mut self, pattern: &str) -> Result<RawBag> {
        debug!("Querying JMX beans '{}'", pattern);
        self.stdin
            .write_all(format!("{}\n", pattern).as_bytes())
            .await
            .context("Failed to send JMX query")?;
        self.stdin.flush().await.context("Failed to send JMX query")?;

        let line = tokio::time::timeout(self.timeout, self.stdout.next_line())
            .await
            .with_context(|| format!("Timeout waiting for JMX query '{}'", pattern))?
            .context("Failed to read JMX response")?
            .context("nrjmx closed its output")?;

        parse_response(&line)
    }
}

pub fn parse_response(line: &str) -> Result<RawBag> {
    let value: serde_json::Value =
        serde_json::from_str(line).context("Failed to decode JMX response")?;

    match value {
        serde_json::Value::Object(map) => Ok(RawBag::from_json_object(&map)),
        other => bail!("Unexpected JMX response: {}", other),
    }
}

/// Splits a bean key such as
/// `org.apache.cassandra.metrics:type=Table,keyspace=ks,scope=t,name=N,attr=A`
/// into its properties.
fn bean_properties(key: &str) -> Option<BTreeMap<&str, &str>> {
    let (_, properties) = key.split_once(':')?;
    properties
        .split(',')
        .map(|property| property.split_once('='))
        .collect()
}

/// Groups `type=Table` bean values by `(keyspace, table)`. Each group holds
/// `<name>.<attr>` keys plus `keyspace`, `table` and `keyspaceAndTable`.
/// System keyspaces are skipped.
pub fn group_tables(raw: &RawBag) -> BTreeMap<(String, String), RawBag> {
    let mut tables: BTreeMap<(String, String), RawBag> = BTreeMap::new();

    for (key, value) in raw {
        let Some(properties) = bean_properties(key) else {
            continue;
        };
        let (Some(keyspace), Some(table), Some(name), Some(attr)) = (
            properties.get("keyspace"),
            properties.get("scope"),
            properties.get("name"),
            properties.get("attr"),
        ) else {
            continue;
        };
        if SYSTEM_KEYSPACES.contains(keyspace) {
            continue;
        }

        let bag = tables
            .entry((keyspace.to_string(), table.to_string()))
            .or_insert_with(|| {
                let mut bag = RawBag::new();
                bag.insert("keyspace", *keyspace);
                bag.insert("table", *table);
                bag.insert("keyspaceAndTable", format!("{}.{}", keyspace, table));
                bag
            });
        bag.insert(format!("{}.{}", name, attr), value.clone());
    }

    tables
}
