use crate::common::fetch;
use anyhow::{bail, Result};
use integration_sdk::{coerce, MetricDefinitions, MetricKind, RawBag};

/// Scoreboard characters and the worker metric each one is counted into.
const WORKER_STATES: [(char, &str); 9] = [
    ('W', "provider.writingWorkers"),
    ('L', "provider.loggingWorkers"),
    ('G', "provider.gracefulWorkers"),
    ('R', "provider.readingWorkers"),
    ('C', "provider.closingWorkers"),
    ('K', "provider.keepaliveWorkers"),
    ('D', "provider.DNSLookupWorkers"),
    ('I', "provider.idleCleanupWorkers"),
    ('S', "provider.startingWorkers"),
];

pub fn definitions() -> integration_sdk::Result<MetricDefinitions> {
    let mut builder = MetricDefinitions::builder()
        .key("provider.requestsPerSecond", "Total Accesses", MetricKind::Rate)
        .derived("provider.bytesPerSecond", total_bytes, MetricKind::Rate)
        .key("provider.idleWorkers", "IdleWorkers", MetricKind::Gauge)
        .key("provider.busyWorkers", "BusyWorkers", MetricKind::Gauge);

    for (status, name) in WORKER_STATES {
        builder = builder.derived(name, worker_status(status), MetricKind::Gauge);
    }

    builder
        .derived("provider.totalWorkers", total_workers, MetricKind::Gauge)
        .build()
}

/// Number of workers in `status`, counted from the scoreboard.
fn worker_status(status: char) -> impl Fn(&RawBag) -> Option<f64> + Send + Sync + 'static {
    move |raw| {
        raw.get_str("Scoreboard")
            .map(|scoreboard| scoreboard.matches(status).count() as f64)
    }
}

fn total_workers(raw: &RawBag) -> Option<f64> {
    raw.get_str("Scoreboard")
        .map(|scoreboard| scoreboard.chars().count() as f64)
}

fn total_bytes(raw: &RawBag) -> Option<f64> {
    let kbytes = raw.get_int("Total kBytes")?;
    kbytes.checked_mul(1024).map(|bytes| bytes as f64)
}

/// Parses the machine-readable (`?auto`) status page.
pub fn parse_status(body: &str) -> Result<RawBag> {
    if body.is_empty() {
        bail!("Empty result");
    }

    let mut raw = RawBag::new();
    for line in body.lines() {
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() != 2 {
            continue;
        }
        raw.insert(parts[0], coerce(parts[1].trim()));
    }

    if raw.is_empty() {
        bail!("Empty result");
    }
    Ok(raw)
}

pub async fn fetch_status(client: &reqwest::Client, url: &str) -> Result<RawBag> {
    let body = fetch(client, url).await?.text().await?;
    parse_status(&body)
}
