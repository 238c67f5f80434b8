use crate::args::DefaultArgs;
use crate::cache::{FileRateStore, RateStore};
use crate::error::Result;
use crate::inventory::Inventory;
use crate::metric::{MetricSet, MetricSetWriter};
use crate::value::RawValue;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::collections::BTreeMap;
use std::io::{self, Write};
use tracing::debug;

pub const PROTOCOL_VERSION: &str = "1";

/// A single-shot event attached to the output document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Event {
    fields: BTreeMap<String, RawValue>,
}

impl Event {
    pub fn new(summary: impl Into<String>, category: impl Into<String>) -> Self {
        Self::default()
            .set("summary", RawValue::String(summary.into()))
            .set("category", RawValue::String(category.into()))
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.fields.get(key)
    }
}

#[derive(Serialize)]
struct Document<'a> {
    name: &'a str,
    protocol_version: &'a str,
    integration_version: &'a str,
    metrics: &'a [MetricSet],
    inventory: &'a Inventory,
    events: &'a [Event],
}

/// Owns the output document of one integration run.
pub struct Integration {
    name: String,
    integration_version: String,
    metrics: Vec<MetricSet>,
    inventory: Inventory,
    events: Vec<Event>,
    pretty: bool,
    rates: Box<dyn RateStore>,
}

impl Integration {
    /// Creates the integration with its rate cache on disk. A cache that
    /// exists but cannot be loaded is an error.
    pub fn new(name: &str, version: &str, args: &DefaultArgs) -> Result<Self> {
        let path = args
            .cache_path
            .clone()
            .unwrap_or_else(|| FileRateStore::default_path(name));
        let rates = FileRateStore::open(path)?;

        Ok(Self::with_rate_store(name, version, args.pretty, Box::new(rates)))
    }

    pub fn with_rate_store(name: &str, version: &str, pretty: bool, rates: Box<dyn RateStore>) -> Self {
        Self {
            name: name.to_string(),
            integration_version: version.to_string(),
            metrics: Vec::new(),
            inventory: Inventory::new(),
            events: Vec::new(),
            pretty,
            rates,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends an empty metric set and returns a writer for it.
    pub fn new_metric_set(&mut self, event_type: &str) -> MetricSetWriter<'_> {
        self.metrics.push(MetricSet::new(event_type));
        let index = self.metrics.len() - 1;
        MetricSetWriter::new(&mut self.metrics[index], self.rates.as_mut())
    }

    pub fn metrics(&self) -> &[MetricSet] {
        &self.metrics
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }

    pub fn add_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    fn document(&self) -> Document<'_> {
        Document {
            name: &self.name,
            protocol_version: PROTOCOL_VERSION,
            integration_version: &self.integration_version,
            metrics: &self.metrics,
            inventory: &self.inventory,
            events: &self.events,
        }
    }

    /// Serializes the document, tab-indented when pretty output was requested.
    pub fn to_json(&self) -> Result<String> {
        let document = self.document();
        if !self.pretty {
            return Ok(serde_json::to_string(&document)?);
        }

        let mut buffer = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"\t"));
        document.serialize(&mut serializer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Flushes the rate cache, prints the document to stdout and clears it.
    pub fn publish(&mut self) -> Result<()> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        self.publish_to(&mut handle)
    }

    /// Like [`Integration::publish`], writing to `out`. Nothing is written if
    /// the cache cannot be saved or the document cannot be serialized.
    pub fn publish_to<W: Write>(&mut self, out: &mut W) -> Result<()> {
        self.rates.save()?;
        let json = self.to_json()?;

        out.write_all(format!("{}\n", json).as_bytes())?;
        out.flush()?;

        debug!(
            "Published {} metric sets, {} inventory items, {} events",
            self.metrics.len(),
            self.inventory.len(),
            self.events.len()
        );
        self.clear();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.metrics.clear();
        self.inventory.clear();
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryRateStore, MockRateStore};
    use crate::definition::MetricKind;
    use crate::error::SdkError;

    fn integration(pretty: bool) -> Integration {
        Integration::with_rate_store("test", "0.0.1", pretty, Box::new(MemoryRateStore::new()))
    }

    fn published(integration: &mut Integration) -> String {
        let mut out = Vec::new();
        integration.publish_to(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_empty_document_has_no_nulls() {
        let output = published(&mut integration(false));

        assert_eq!(
            output,
            "{\"name\":\"test\",\"protocol_version\":\"1\",\"integration_version\":\"0.0.1\",\
             \"metrics\":[],\"inventory\":{},\"events\":[]}\n"
        );
    }

    #[test]
    fn test_publish_clears_collections() {
        let mut integration = integration(false);
        integration
            .new_metric_set("LoadBalancerSample")
            .set_metric("provider.busyWorkers", RawValue::Int(1), MetricKind::Gauge)
            .unwrap();
        integration.inventory_mut().set_item("version", "value", "2.4.25");
        integration.add_event(Event::new("restarted", "notifications"));

        let output = published(&mut integration);
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["metrics"][0]["provider.busyWorkers"], 1);
        assert_eq!(json["inventory"]["version"]["value"], "2.4.25");
        assert_eq!(json["events"][0]["summary"], "restarted");

        assert!(integration.metrics().is_empty());
        assert!(integration.inventory().is_empty());
        assert!(integration.events().is_empty());
    }

    #[test]
    fn test_pretty_output_is_tab_indented() {
        let mut integration = integration(true);
        integration.inventory_mut().set_item("version", "value", "1.0");

        let output = published(&mut integration);

        assert!(output.contains("\n\t\"name\": \"test\""));
        assert!(output.contains("\n\t\t\"version\": {"));
        assert!(!output.contains("  "));
    }

    #[test]
    fn test_compact_output_is_one_line() {
        let mut integration = integration(false);
        integration.inventory_mut().set_item("version", "value", "1.0");

        let output = published(&mut integration);

        assert_eq!(output.lines().count(), 1);
        assert!(output.ends_with('\n'));
    }

    #[test]
    fn test_failed_cache_save_writes_nothing() {
        let mut rates = MockRateStore::new();
        rates
            .expect_save()
            .times(1)
            .returning(|| Err(SdkError::Cache("disk full".to_string())));
        let mut integration = Integration::with_rate_store("test", "0.0.1", false, Box::new(rates));
        integration.inventory_mut().set_item("version", "value", "1.0");

        let mut out = Vec::new();
        let err = integration.publish_to(&mut out).unwrap_err();

        assert!(matches!(err, SdkError::Cache(_)));
        assert!(out.is_empty());
        assert_eq!(integration.inventory().len(), 1);
    }

    #[test]
    fn test_rates_survive_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let args = DefaultArgs {
            cache_path: Some(dir.path().join("apache.json")),
            ..Default::default()
        };

        let mut first = Integration::new("apache", "1.0.0", &args).unwrap();
        let err = first
            .new_metric_set("LoadBalancerSample")
            .set_metric("provider.requestsPerSecond", RawValue::Int(66), MetricKind::Rate)
            .unwrap_err();
        assert!(matches!(err, SdkError::NoPreviousSample(_)));
        published(&mut first);

        let second = Integration::new("apache", "1.0.0", &args).unwrap();
        assert!(second
            .rates
            .previous("LoadBalancerSample///provider.requestsPerSecond")
            .is_some());
    }

    #[test]
    fn test_corrupt_cache_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.json");
        std::fs::write(&path, "][").unwrap();
        let args = DefaultArgs {
            cache_path: Some(path),
            ..Default::default()
        };

        assert!(Integration::new("apache", "1.0.0", &args).is_err());
    }

    #[test]
    fn test_event_fields() {
        let event = Event::new("config changed", "notifications").set("severity", 2i64);

        assert_eq!(event.get("category"), Some(&RawValue::from("notifications")));
        assert_eq!(event.get("severity"), Some(&RawValue::Int(2)));
    }
}
