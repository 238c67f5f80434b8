//! NGINX: `stub_status` (open source) and the JSON status API (NGINX Plus)
//! for metrics, the main configuration file for inventory.

use crate::common::{fetch, http_client, DEFAULT_TIMEOUT};
use anyhow::{bail, Context, Result};
use clap::Args;
use integration_sdk::{populate_metrics, DefaultArgs, Integration, Inventory, MetricDefinitions, MetricKind, RawBag};
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, SERVER};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const NAME: &str = "nginx";
pub const VERSION: &str = "0.2.0";
pub const EVENT_TYPE: &str = "LoadBalancerSample";
pub const PROVIDER: &str = "NGINX";

#[derive(Args, Debug, Clone)]
pub struct NginxArgs {
    /// NGINX status URL
    #[arg(long, env = "STATUS_URL", default_value = "http://127.0.0.1/status")]
    pub status_url: String,

    /// Status request timeout (e.g. 500ms, 2s)
    #[arg(long, env = "TIMEOUT", default_value = DEFAULT_TIMEOUT, value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// NGINX configuration file
    #[arg(long, env = "CONFIG_PATH", default_value = "/etc/nginx/nginx.conf")]
    pub config_path: PathBuf,
}

/// Which status module answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edition {
    Plus,
    OpenSource,
}

pub fn plus_definitions() -> integration_sdk::Result<MetricDefinitions> {
    MetricDefinitions::builder()
        .key("provider.connectionsActive", "connections.active", MetricKind::Gauge)
        .key("provider.connectionsIdle", "connections.idle", MetricKind::Gauge)
        .key("provider.connectionsAcceptedPerSecond", "connections.accepted", MetricKind::Rate)
        .key("provider.connectionsDroppedPerSecond", "connections.dropped", MetricKind::Rate)
        .key("provider.requestsPerSecond", "requests.total", MetricKind::Rate)
        .key("software.edition", "edition", MetricKind::Attribute)
        .key("software.version", "version", MetricKind::Attribute)
        .build()
}

pub fn standard_definitions() -> integration_sdk::Result<MetricDefinitions> {
    MetricDefinitions::builder()
        .key("provider.connectionsActive", "active", MetricKind::Gauge)
        .key("provider.reading", "reading", MetricKind::Gauge)
        .key("provider.waiting", "waiting", MetricKind::Gauge)
        .key("provider.writing", "writing", MetricKind::Gauge)
        .key("provider.requestsPerSecond", "requests", MetricKind::Rate)
        .key("provider.connectionsAcceptedPerSecond", "accepted", MetricKind::Rate)
        .derived(
            "provider.connectionsDroppedPerSecond",
            connections_dropped,
            MetricKind::Rate,
        )
        .key("software.edition", "edition", MetricKind::Attribute)
        .key("software.version", "version", MetricKind::Attribute)
        .build()
}

fn connections_dropped(raw: &RawBag) -> Option<f64> {
    let accepted = raw.get_int("accepted")?;
    let handled = raw.get_int("handled")?;
    Some((accepted - handled) as f64)
}

/// Parses the four-line `stub_status` page. The second line is a header.
pub fn parse_standard(body: &str) -> Result<RawBag> {
    let expressions = [
        Some(Regex::new(r"Active connections:\s+(?P<active>\d+)")?),
        None,
        Some(Regex::new(r"\s*(?P<accepted>\d+)\s+(?P<handled>\d+)\s+(?P<requests>\d+)")?),
        Some(Regex::new(
            r"Reading: (?P<reading>\d+)\s+Writing: (?P<writing>\d+)\s+Waiting: (?P<waiting>\d+)",
        )?),
    ];

    let mut raw = RawBag::new();
    let mut lines = body.lines();
    for (line_no, expression) in expressions.iter().enumerate() {
        let Some(line) = lines.next() else {
            break;
        };
        let Some(expression) = expression else {
            continue;
        };

        let Some(captures) = expression.captures(line) else {
            bail!("Line {} of status doesn't match", line_no);
        };

        for name in expression.capture_names().flatten() {
            let value = &captures[name];
            match value.parse::<i64>() {
                Ok(value) => {
                    raw.insert(name, value);
                }
                Err(_) => warn!("Can't cast value '{}'", value),
            }
        }
    }

    raw.insert("version", "");
    raw.insert("edition", "open source");
    Ok(raw)
}

/// Parses the NGINX Plus JSON status document.
pub fn parse_plus(body: &str) -> Result<RawBag> {
    let status: serde_json::Value =
        serde_json::from_str(body).context("Invalid NGINX Plus status document")?;

    let mut raw = RawBag::new();
    for root in ["connections", "requests"] {
        let Some(node) = status.get(root).and_then(|node| node.as_object()) else {
            warn!("Can't read '{}' from the status document", root);
            continue;
        };

        for (key, value) in node {
            match value.as_f64() {
                Some(number) => {
                    raw.insert(format!("{}.{}", root, key), number as i64);
                }
                None => warn!("Can't cast value '{}' of {}.{}", value, root, key),
            }
        }
    }

    if let Some(version) = status.get("nginx_version").and_then(|v| v.as_str()) {
        raw.insert("version", version);
    }
    raw.insert("edition", "plus");
    Ok(raw)
}

/// Fetches the status page and parses it according to its content type.
pub async fn fetch_status(client: &reqwest::Client, url: &str) -> Result<(Edition, RawBag)> {
    let response = fetch(client, url).await?;
    let headers = response.headers().clone();
    let body = response.text().await?;

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/json"))
        .unwrap_or(false);

    if is_json {
        return Ok((Edition::Plus, parse_plus(&body)?));
    }

    let mut raw = parse_standard(&body)?;
    let server = headers
        .get(SERVER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    raw.insert("version", server.replace("nginx/", ""));
    Ok((Edition::OpenSource, raw))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    End,
    Open,
    Close,
}

fn tokenize(content: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut word: Option<String> = None;
    let mut chars = content.chars();

    while let Some(c) = chars.next() {
        match c {
            '#' if word.is_none() => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '"' | '\'' => {
                let text = word.get_or_insert_with(String::new);
                let mut closed = false;
                while let Some(next) = chars.next() {
                    match next {
                        '\\' => text.extend(chars.next()),
                        next if next == c => {
                            closed = true;
                            break;
                        }
                        next => text.push(next),
                    }
                }
                if !closed {
                    bail!("Unterminated quoted string in configuration");
                }
            }
            ';' | '{' | '}' => {
                tokens.extend(word.take().map(Token::Word));
                tokens.push(match c {
                    ';' => Token::End,
                    '{' => Token::Open,
                    _ => Token::Close,
                });
            }
            c if c.is_whitespace() => tokens.extend(word.take().map(Token::Word)),
            c => word.get_or_insert_with(String::new).push(c),
        }
    }

    tokens.extend(word.take().map(Token::Word));
    Ok(tokens)
}

/// Parses an NGINX configuration into one entry per directive. The key is
/// the path of enclosing blocks plus the directive name, e.g.
/// `http/server/location /api/proxy_pass`; the value is its arguments joined
/// by spaces. A directive repeated within a block keeps its last value.
pub fn parse_config(content: &str) -> Result<BTreeMap<String, String>> {
    let mut directives = BTreeMap::new();
    let mut blocks: Vec<String> = Vec::new();
    let mut words: Vec<String> = Vec::new();

    for token in tokenize(content)? {
        match token {
            Token::Word(word) => words.push(word),
            Token::End => {
                if let Some((name, arguments)) = words.split_first() {
                    let key = blocks
                        .iter()
                        .chain(std::iter::once(name))
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join("/");
                    directives.insert(key, arguments.join(" "));
                }
                words.clear();
            }
            Token::Open => {
                if words.is_empty() {
                    bail!("Configuration block without a name");
                }
                blocks.push(words.join(" "));
                words.clear();
            }
            Token::Close => {
                if let Some(name) = words.first() {
                    bail!("Directive '{}' is missing ';'", name);
                }
                if blocks.pop().is_none() {
                    bail!("Unexpected '}}' in configuration");
                }
            }
        }
    }

    if let Some(name) = words.first() {
        bail!("Directive '{}' is missing ';'", name);
    }
    if let Some(block) = blocks.last() {
        bail!("Block '{}' is not closed", block);
    }

    Ok(directives)
}

pub fn collect_inventory(inventory: &mut Inventory, config_path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    let directives = parse_config(&content)
        .with_context(|| format!("Invalid NGINX configuration {}", config_path.display()))?;

    for (key, value) in directives {
        inventory.set_item(key, "value", value);
    }
    Ok(())
}

pub async fn run(integration: &mut Integration, defaults: &DefaultArgs, args: &NginxArgs) -> Result<()> {
    if defaults.collect_inventory() {
        info!("Getting data for '{}-inventory' plugin", NAME);
        collect_inventory(integration.inventory_mut(), &args.config_path)?;
    }

    if !defaults.collect_metrics() {
        return Ok(());
    }

    info!("Getting data for '{}-metrics' plugin", NAME);
    let client = http_client(args.timeout)?;
    let (edition, raw) = fetch_status(&client, &args.status_url).await?;
    let definitions = match edition {
        Edition::Plus => plus_definitions()?,
        Edition::OpenSource => standard_definitions()?,
    };

    let mut set = integration.new_metric_set(EVENT_TYPE);
    set.provider(PROVIDER);
    populate_metrics(&mut set, &raw, &definitions);
    Ok(())
}
