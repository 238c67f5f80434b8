pub mod args;
pub mod cache;
pub mod definition;
pub mod error;
pub mod integration;
pub mod inventory;
pub mod logging;
pub mod metric;
pub mod populate;
pub mod value;

pub use args::DefaultArgs;
pub use cache::{CachedSample, FileRateStore, MemoryRateStore, RateStore};
pub use definition::{MetricDefinition, MetricDefinitions, MetricDefinitionsBuilder, MetricKind, Source};
pub use error::{Result, SdkError};
pub use integration::{Event, Integration};
pub use inventory::{populate_inventory, should_redact, Inventory, REDACTED};
pub use metric::{MetricSet, MetricSetWriter, MetricValue};
pub use populate::populate_metrics;
pub use value::{coerce, RawBag, RawValue};
