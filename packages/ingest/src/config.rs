//! Optional user configuration file.
//!
//! Overrides the data directory and any quota parameter of the embedded
//! service definitions:
//!
//! ```toml
//! data_dir = "/var/lib/cville-crime"
//!
//! [quota.google]
//! daily_limit = 40000
//! batch_size = 2000
//! concurrent_requests = 4
//! on_exhausted = "pause"
//! ```
//!
//! Command-line flags take precedence over this file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cville_crime_geocoder::quota::{ExhaustionPolicy, QuotaConfig};
use cville_crime_geocoder::service_registry::GeocodingService;
use serde::Deserialize;

use crate::IngestError;

/// Per-field quota overrides. Unset fields keep the service default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaOverride {
    /// Requests allowed per UTC day.
    pub daily_limit: Option<u64>,
    /// Addresses per batch.
    pub batch_size: Option<usize>,
    /// Requests in flight at once.
    pub concurrent_requests: Option<usize>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Minimum delay between request launches in milliseconds.
    pub min_interval_ms: Option<u64>,
    /// Behavior once the budget is spent.
    pub on_exhausted: Option<ExhaustionPolicy>,
}

impl QuotaOverride {
    /// Returns `base` with every set field replaced.
    #[must_use]
    pub fn apply(&self, base: QuotaConfig) -> QuotaConfig {
        QuotaConfig {
            daily_limit: self.daily_limit.unwrap_or(base.daily_limit),
            batch_size: self.batch_size.unwrap_or(base.batch_size),
            concurrent_requests: self
                .concurrent_requests
                .unwrap_or(base.concurrent_requests),
            timeout_secs: self.timeout_secs.unwrap_or(base.timeout_secs),
            min_interval_ms: self.min_interval_ms.unwrap_or(base.min_interval_ms),
            on_exhausted: self.on_exhausted.unwrap_or(base.on_exhausted),
        }
    }
}

/// Contents of a `--config` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    /// Directory for the cache, ledgers, snapshots, and output.
    pub data_dir: Option<PathBuf>,
    /// Quota overrides keyed by service id.
    #[serde(default)]
    pub quota: BTreeMap<String, QuotaOverride>,
}

impl UserConfig {
    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the file cannot be read or is not valid
    /// configuration.
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] if the TOML is malformed or has
    /// unknown keys.
    pub fn parse(contents: &str) -> Result<Self, IngestError> {
        toml::de::from_str(contents).map_err(|e| IngestError::Config {
            message: e.to_string(),
        })
    }

    /// Loads `path` if given, otherwise returns the empty configuration.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if a given file cannot be loaded.
    pub fn load_optional(path: Option<&Path>) -> Result<Self, IngestError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Effective quota for `service` after overrides.
    #[must_use]
    pub fn quota_for(&self, service: &GeocodingService) -> QuotaConfig {
        self.quota.get(&service.id).map_or_else(
            || service.quota.clone(),
            |o| o.apply(service.quota.clone()),
        )
    }
}
