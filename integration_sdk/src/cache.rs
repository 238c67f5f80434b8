use crate::error::{Result, SdkError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Samples older than this many hours are dropped when the cache is loaded.
pub const MAX_SAMPLE_AGE_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedSample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl CachedSample {
    pub fn new(value: f64, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }

    pub fn now(value: f64) -> Self {
        Self::new(value, Utc::now())
    }
}

/// Storage for the previous sample of every rate and delta metric.
#[cfg_attr(test, mockall::automock)]
pub trait RateStore: Send {
    /// The sample recorded under `key` by this or an earlier run.
    fn previous(&self, key: &str) -> Option<CachedSample>;

    /// Replace the sample stored under `key`.
    fn record(&mut self, key: &str, sample: CachedSample);

    /// Persist recorded samples so the next run can compute rates.
    fn save(&mut self) -> Result<()>;
}

/// Rate store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    samples: HashMap<String, CachedSample>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateStore for MemoryRateStore {
    fn previous(&self, key: &str) -> Option<CachedSample> {
        self.samples.get(key).copied()
    }

    fn record(&mut self, key: &str, sample: CachedSample) {
        self.samples.insert(key.to_string(), sample);
    }

    fn save(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Rate store backed by a JSON file, one file per integration.
#[derive(Debug)]
pub struct FileRateStore {
    path: PathBuf,
    samples: BTreeMap<String, CachedSample>,
    dirty: bool,
}

impl FileRateStore {
    /// Loads the cache at `path`. A missing file is an empty cache; a file that
    /// cannot be read or parsed is an error. Samples older than
    /// [`MAX_SAMPLE_AGE_HOURS`] are discarded.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let mut samples: BTreeMap<String, CachedSample> = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                SdkError::Cache(format!("corrupt cache file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No cache file at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                return Err(SdkError::Cache(format!(
                    "unable to read cache file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let loaded = samples.len();
        let cutoff = Utc::now() - Duration::hours(MAX_SAMPLE_AGE_HOURS);
        samples.retain(|_, sample| sample.timestamp >= cutoff);
        let pruned = loaded - samples.len();
        if pruned > 0 {
            debug!("Dropped {} stale cached samples from {}", pruned, path.display());
        }

        Ok(Self {
            path,
            samples,
            dirty: pruned > 0,
        })
    }

    pub fn default_path(integration_name: &str) -> PathBuf {
        std::env::temp_dir()
            .join("nr-integrations")
            .join(format!("{}.json", integration_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl RateStore for FileRateStore {
    fn previous(&self, key: &str) -> Option<CachedSample> {
        self.samples.get(key).copied()
    }

    fn record(&mut self, key: &str, sample: CachedSample) {
        self.samples.insert(key.to_string(), sample);
        self.dirty = true;
    }

    fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(&self.samples)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)?;

        debug!("Saved {} cached samples to {}", self.samples.len(), self.path.display());
        self.dirty = false;
        Ok(())
    }
}
