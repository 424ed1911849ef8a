//! Daily request budget.
//!
//! Commercial geocoders cap free requests per day and bill every request
//! beyond the cap. [`QuotaLedger`] counts requests sent during the current
//! UTC day and is persisted as JSON so that separate runs on the same day
//! draw from one budget.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::GeocodeError;

/// What to do once the daily budget is spent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Sleep until the budget resets at the next UTC midnight.
    Pause,
    /// Stop with [`GeocodeError::QuotaExhausted`].
    #[default]
    FailFast,
}

/// Request budget and pacing for one geocoding service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuotaConfig {
    /// Requests allowed per UTC day.
    pub daily_limit: u64,
    /// Addresses submitted per batch.
    pub batch_size: usize,
    /// Requests in flight at once within a batch.
    #[serde(default = "default_concurrent")]
    pub concurrent_requests: usize,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum delay between request launches in milliseconds.
    #[serde(default)]
    pub min_interval_ms: u64,
    /// Behavior once `daily_limit` is reached.
    #[serde(default)]
    pub on_exhausted: ExhaustionPolicy,
}

const fn default_concurrent() -> usize {
    1
}

const fn default_timeout_secs() -> u64 {
    10
}

impl QuotaConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay between request launches.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// Requests used on one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLedger {
    /// Day the count applies to.
    pub date: NaiveDate,
    /// Requests sent (or reserved) on `date`.
    pub used: u64,
}

impl QuotaLedger {
    /// An empty ledger for `date`.
    #[must_use]
    pub const fn new(date: NaiveDate) -> Self {
        Self { date, used: 0 }
    }

    /// Reads the ledger at `path`, starting a fresh one for `today` if the
    /// file does not exist or belongs to an earlier day.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the file exists but cannot be read or
    /// parsed.
    pub fn load(path: &Path, today: NaiveDate) -> Result<Self, GeocodeError> {
        if !path.exists() {
            return Ok(Self::new(today));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut ledger: Self = serde_json::from_str(&contents)?;
        ledger.roll_over(today);
        Ok(ledger)
    }

    /// Writes the ledger to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), GeocodeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Resets the count if `today` is a later day than the ledger's.
    pub fn roll_over(&mut self, today: NaiveDate) {
        if today > self.date {
            *self = Self::new(today);
        }
    }

    /// Requests still available under `limit`.
    #[must_use]
    pub const fn remaining(&self, limit: u64) -> u64 {
        limit.saturating_sub(self.used)
    }

    /// Reserves up to `wanted` requests and returns how many were granted.
    ///
    /// The grant never exceeds the remaining budget.
    pub fn reserve(&mut self, wanted: usize, limit: u64) -> usize {
        let remaining = usize::try_from(self.remaining(limit)).unwrap_or(usize::MAX);
        let granted = wanted.min(remaining);
        self.used += granted as u64;
        granted
    }

    /// Marks the budget as spent for the rest of the day.
    pub const fn exhaust(&mut self, limit: u64) {
        if self.used < limit {
            self.used = limit;
        }
    }
}

/// Source of the current time for day rollover and reset waits.
pub trait Clock: Send + Sync {
    /// The current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Time left until the next UTC midnight.
#[must_use]
pub fn until_reset(now: DateTime<Utc>) -> Duration {
    let tomorrow = now
        .date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());

    tomorrow
        .and_then(|t| (t - now).to_std().ok())
        .unwrap_or(Duration::from_secs(24 * 60 * 60))
}
