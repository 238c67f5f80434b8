use crate::cache::{CachedSample, RateStore};
use crate::definition::MetricKind;
use crate::error::{Result, SdkError};
use crate::value::RawValue;
use chrono::Utc;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// A resolved, typed metric value as it appears in the output document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    String(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Int(i) => Some(*i as f64),
            MetricValue::Float(f) => Some(*f),
            MetricValue::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// One logical sample: metric name to value, tagged with an event type.
///
/// Serialized as a single flat object holding `event_type`, `provider` (when
/// set) and every metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSet {
    event_type: String,
    provider: Option<String>,
    entity: Option<String>,
    metrics: BTreeMap<String, MetricValue>,
}

impl MetricSet {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            provider: None,
            entity: None,
            metrics: BTreeMap::new(),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricValue)> {
        self.metrics.iter()
    }

    /// Stores `value` under `name`, replacing any previous value.
    ///
    /// Rate and delta metrics are computed against the previous sample held in
    /// `rates`; the current sample is recorded even when no value can be
    /// produced yet.
    pub fn set_metric(
        &mut self,
        name: &str,
        value: RawValue,
        kind: MetricKind,
        rates: &mut dyn RateStore,
    ) -> Result<()> {
        let resolved = match kind {
            MetricKind::Gauge => match value {
                RawValue::Int(i) => MetricValue::Int(i),
                RawValue::Float(f) if !f.is_finite() => {
                    return Err(mismatch(name, kind, &RawValue::Float(f)))
                }
                RawValue::Float(f) => MetricValue::Float(f),
                other => return Err(mismatch(name, kind, &other)),
            },
            MetricKind::Attribute => match value {
                RawValue::String(s) => MetricValue::String(s),
                scalar @ (RawValue::Int(_) | RawValue::Float(_) | RawValue::Bool(_)) => {
                    MetricValue::String(scalar.to_string())
                }
                other => return Err(mismatch(name, kind, &other)),
            },
            MetricKind::Rate | MetricKind::Delta => {
                let current = value
                    .as_f64()
                    .filter(|current| current.is_finite())
                    .ok_or_else(|| mismatch(name, kind, &value))?;
                MetricValue::Float(self.change_since_previous(name, current, kind, rates)?)
            }
        };

        self.metrics.insert(name.to_string(), resolved);
        Ok(())
    }

    fn rate_key(&self, name: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.event_type,
            self.provider.as_deref().unwrap_or_default(),
            self.entity.as_deref().unwrap_or_default(),
            name
        )
    }

    fn change_since_previous(
        &self,
        name: &str,
        current: f64,
        kind: MetricKind,
        rates: &mut dyn RateStore,
    ) -> Result<f64> {
        let key = self.rate_key(name);
        let now = Utc::now();
        let previous = rates.previous(&key);
        rates.record(&key, CachedSample::new(current, now));

        let previous = previous.ok_or_else(|| SdkError::NoPreviousSample(name.to_string()))?;
        let change = current - previous.value;
        if change < 0.0 {
            return Err(SdkError::CounterReset(name.to_string()));
        }

        if kind == MetricKind::Delta {
            return Ok(change);
        }

        let elapsed = (now - previous.timestamp).num_milliseconds() as f64 / 1000.0;
        if elapsed <= 0.0 {
            return Err(SdkError::NoElapsedTime(name.to_string()));
        }

        Ok(change / elapsed)
    }
}

fn mismatch(name: &str, kind: MetricKind, value: &RawValue) -> SdkError {
    SdkError::KindMismatch {
        name: name.to_string(),
        kind: kind.to_string(),
        value: value.to_string(),
    }
}

impl Serialize for MetricSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let extra = if self.provider.is_some() { 2 } else { 1 };
        let mut map = serializer.serialize_map(Some(self.metrics.len() + extra))?;
        map.serialize_entry("event_type", &self.event_type)?;
        if let Some(provider) = &self.provider {
            map.serialize_entry("provider", provider)?;
        }
        for (name, value) in &self.metrics {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Mutable access to a metric set that already belongs to an integration,
/// together with the rate store it computes rates against.
pub struct MetricSetWriter<'a> {
    set: &'a mut MetricSet,
    rates: &'a mut dyn RateStore,
}

impl<'a> MetricSetWriter<'a> {
    pub fn new(set: &'a mut MetricSet, rates: &'a mut dyn RateStore) -> Self {
        Self { set, rates }
    }

    /// Older-schema provider label, e.g. `Apache`.
    pub fn provider(&mut self, provider: impl Into<String>) -> &mut Self {
        self.set.provider = Some(provider.into());
        self
    }

    /// Identity used to keep rate state apart for sets sharing an event type.
    pub fn entity(&mut self, entity: impl Into<String>) -> &mut Self {
        self.set.entity = Some(entity.into());
        self
    }

    pub fn set_metric(&mut self, name: &str, value: RawValue, kind: MetricKind) -> Result<()> {
        self.set.set_metric(name, value, kind, &mut *self.rates)
    }

    pub fn metric_set(&self) -> &MetricSet {
        self.set
    }
}
