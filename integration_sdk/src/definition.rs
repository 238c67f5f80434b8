use crate::error::{Result, SdkError};
use crate::value::RawBag;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// How the consumer should interpret a metric value over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Point-in-time numeric value.
    Gauge,
    /// Per-second change since the previous sample.
    Rate,
    /// Absolute change since the previous sample.
    Delta,
    /// Textual label.
    Attribute,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Rate => "rate",
            MetricKind::Delta => "delta",
            MetricKind::Attribute => "attribute",
        };
        f.write_str(name)
    }
}

pub type DeriveFn = Arc<dyn Fn(&RawBag) -> Option<f64> + Send + Sync>;

/// Where a metric value comes from.
#[derive(Clone)]
pub enum Source {
    /// Read a raw key verbatim.
    Key(String),
    /// Compute the value from the whole raw bag.
    Derived(DeriveFn),
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Key(key) => f.debug_tuple("Key").field(key).finish(),
            Source::Derived(_) => f.write_str("Derived(<fn>)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricDefinition {
    pub name: String,
    pub source: Source,
    pub kind: MetricKind,
}

/// An ordered, duplicate-free metric definition table.
#[derive(Debug, Clone, Default)]
pub struct MetricDefinitions {
    definitions: Vec<MetricDefinition>,
}

impl MetricDefinitions {
    pub fn builder() -> MetricDefinitionsBuilder {
        MetricDefinitionsBuilder::default()
    }

    pub fn new(definitions: Vec<MetricDefinition>) -> Result<Self> {
        let mut seen = HashSet::new();
        for definition in &definitions {
            if !seen.insert(definition.name.as_str()) {
                return Err(SdkError::DuplicateDefinition(definition.name.clone()));
            }
        }

        Ok(Self { definitions })
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.definitions.iter()
    }

    pub fn get(&self, name: &str) -> Option<&MetricDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[derive(Default)]
pub struct MetricDefinitionsBuilder {
    definitions: Vec<MetricDefinition>,
}

impl MetricDefinitionsBuilder {
    pub fn key(mut self, name: impl Into<String>, key: impl Into<String>, kind: MetricKind) -> Self {
        self.definitions.push(MetricDefinition {
            name: name.into(),
            source: Source::Key(key.into()),
            kind,
        });
        self
    }

    pub fn derived<F>(mut self, name: impl Into<String>, derive: F, kind: MetricKind) -> Self
    where
        F: Fn(&RawBag) -> Option<f64> + Send + Sync + 'static,
    {
        self.definitions.push(MetricDefinition {
            name: name.into(),
            source: Source::Derived(Arc::new(derive)),
            kind,
        });
        self
    }

    pub fn build(self) -> Result<MetricDefinitions> {
        MetricDefinitions::new(self.definitions)
    }
}
