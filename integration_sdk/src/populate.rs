use crate::definition::{MetricDefinitions, Source};
use crate::error::SdkError;
use crate::metric::MetricSetWriter;
use crate::value::{RawBag, RawValue};
use tracing::{debug, warn};

/// Writes every definition of `definitions` that resolves against `raw` into
/// the metric set. Missing sources and rejected values are logged and skipped.
pub fn populate_metrics(set: &mut MetricSetWriter<'_>, raw: &RawBag, definitions: &MetricDefinitions) {
    for definition in definitions.iter() {
        let value = match &definition.source {
            Source::Key(key) => match raw.get(key) {
                Some(value) if is_percentile_key(key) => to_milliseconds(value),
                Some(value) => value.clone(),
                None => {
                    debug!("Can't find raw metric '{}' for {}", key, definition.name);
                    continue;
                }
            },
            Source::Derived(derive) => match derive(raw) {
                Some(value) => RawValue::Float(value),
                None => {
                    debug!("Can't compute raw metric for {}", definition.name);
                    continue;
                }
            },
        };

        match set.set_metric(&definition.name, value, definition.kind) {
            Ok(()) => {}
            Err(e @ SdkError::NoPreviousSample(_)) => debug!("{}", e),
            Err(e) => warn!("Error setting value for {}: {}", definition.name, e),
        }
    }
}

fn is_percentile_key(key: &str) -> bool {
    key.to_ascii_lowercase().contains("percentile")
}

// Percentile sources report microseconds.
fn to_milliseconds(value: &RawValue) -> RawValue {
    match value.as_f64() {
        Some(micros) => RawValue::Float(micros / 1000.0),
        None => value.clone(),
    }
}
