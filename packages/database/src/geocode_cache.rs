//! Address → geocode cache stored as an append-only CSV.
//!
//! Keyed by the exact address string sent to the geocoder. Both hits and
//! misses are cached. Rows are only ever appended; when a key appears more
//! than once, the last row wins on load, except that a non-final row never
//! replaces a final one. Only final outcomes ([`LookupOutcome::is_final`])
//! keep an address out of the next run.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use cville_crime_models::{GeocodeResult, LookupOutcome};
use serde::{Deserialize, Serialize};

use crate::DbError;

/// One line of the cache file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRow {
    /// Address string sent to the geocoder.
    pub query: String,
    /// Classified outcome.
    pub outcome: LookupOutcome,
    /// Service status string.
    pub status: Option<String>,
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
    /// Canonical address returned by the service.
    pub formatted_address: Option<String>,
    /// Precision classification.
    pub location_type: Option<String>,
    /// When the lookup was made.
    pub fetched_at: DateTime<Utc>,
}

impl CacheRow {
    /// Stamps a result with `fetched_at`.
    #[must_use]
    pub fn new(result: &GeocodeResult, fetched_at: DateTime<Utc>) -> Self {
        Self {
            query: result.query.clone(),
            outcome: result.outcome,
            status: result.status.clone(),
            latitude: result.latitude,
            longitude: result.longitude,
            formatted_address: result.formatted_address.clone(),
            location_type: result.location_type.clone(),
            fetched_at,
        }
    }

    /// Drops the timestamp.
    #[must_use]
    pub fn into_result(self) -> GeocodeResult {
        GeocodeResult {
            query: self.query,
            outcome: self.outcome,
            status: self.status,
            latitude: self.latitude,
            longitude: self.longitude,
            formatted_address: self.formatted_address,
            location_type: self.location_type,
        }
    }
}

/// The latest cached result per address.
#[derive(Debug, Clone, Default)]
pub struct GeocodeCache {
    entries: BTreeMap<String, GeocodeResult>,
}

impl GeocodeCache {
    /// Loads the cache file at `path`. A missing file is an empty cache.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the file exists but cannot be read or a row
    /// cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, DbError> {
        if !path.exists() {
            log::debug!("No geocode cache at {}", path.display());
            return Ok(Self::default());
        }

        let mut reader = csv::Reader::from_path(path)?;
        let mut cache = Self::default();
        let mut rows = 0usize;
        for row in reader.deserialize::<CacheRow>() {
            cache.insert(row?.into_result());
            rows += 1;
        }

        log::info!(
            "Loaded {} cached addresses ({rows} rows) from {}",
            cache.len(),
            path.display()
        );
        Ok(cache)
    }

    /// Records `result`, replacing any earlier entry for the same address
    /// unless that entry is final and `result` is not.
    pub fn insert(&mut self, result: GeocodeResult) {
        if !result.outcome.is_final() && self.is_resolved(&result.query) {
            log::debug!(
                "Keeping resolved cache entry for '{}' over {} row",
                result.query,
                result.outcome
            );
            return;
        }
        self.entries.insert(result.query.clone(), result);
    }

    /// Returns the cached result for `address`.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&GeocodeResult> {
        self.entries.get(address)
    }

    /// Whether `address` has a final cached outcome.
    #[must_use]
    pub fn is_resolved(&self, address: &str) -> bool {
        self.get(address).is_some_and(|r| r.outcome.is_final())
    }

    /// Number of cached addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no addresses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counts cached addresses per outcome.
    #[must_use]
    pub fn outcome_counts(&self) -> BTreeMap<LookupOutcome, usize> {
        let mut counts = BTreeMap::new();
        for result in self.entries.values() {
            *counts.entry(result.outcome).or_insert(0) += 1;
        }
        counts
    }
}

/// Appends rows to the cache file, flushing after each one.
pub struct CacheWriter {
    writer: csv::Writer<std::fs::File>,
}

impl CacheWriter {
    /// Opens `path` for appending, writing the header if the file is new
    /// or empty.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let needs_header = file.metadata()?.len() == 0;
        let writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);

        Ok(Self { writer })
    }

    /// Appends one result stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the row cannot be written or flushed.
    pub fn append(&mut self, result: &GeocodeResult) -> Result<(), DbError> {
        self.append_row(&CacheRow::new(result, Utc::now()))
    }

    /// Appends one pre-stamped row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the row cannot be written or flushed.
    pub fn append_row(&mut self, row: &CacheRow) -> Result<(), DbError> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and closes the underlying file.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the final flush fails.
    pub fn finish(mut self) -> Result<(), DbError> {
        self.writer.flush()?;
        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| DbError::Conversion {
                message: format!("failed to finish geocode cache: {e}"),
            })?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("cville_crime_cache_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        dir.join("geocode_cache.csv")
    }

    fn ok(query: &str, lat: f64) -> GeocodeResult {
        GeocodeResult {
            query: query.to_string(),
            outcome: LookupOutcome::Ok,
            status: Some("OK".to_string()),
            latitude: Some(lat),
            longitude: Some(-78.48),
            formatted_address: Some("Main St, Charlottesville, VA 22902, USA".to_string()),
            location_type: Some("GEOMETRIC_CENTER".to_string()),
        }
    }

    #[test]
    fn missing_file_is_empty_cache() {
        let cache = GeocodeCache::load(&temp_path("missing")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn append_then_reload_keeps_last_entry_per_key() {
        let path = temp_path("reload");

        let mut writer = CacheWriter::open(&path).unwrap();
        writer
            .append(&GeocodeResult::placeholder(
                "100 MAIN ST Charlottesville VA".to_string(),
                LookupOutcome::TimedOut,
            ))
            .unwrap();
        writer
            .append(&ok("200 PARK ST Charlottesville VA", 38.04))
            .unwrap();
        writer.finish().unwrap();

        // A second writer must not repeat the header.
        let mut writer = CacheWriter::open(&path).unwrap();
        writer
            .append(&ok("100 MAIN ST Charlottesville VA", 38.03))
            .unwrap();
        writer.finish().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("query,outcome").count(), 1);

        let cache = GeocodeCache::load(&path).unwrap();
        assert_eq!(cache.len(), 2);
        let main = cache.get("100 MAIN ST Charlottesville VA").unwrap();
        assert_eq!(main.outcome, LookupOutcome::Ok);
        assert_eq!(main.coordinates(), Some((38.03, -78.48)));
        assert_eq!(main, &ok("100 MAIN ST Charlottesville VA", 38.03));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn placeholders_round_trip_with_empty_fields() {
        let path = temp_path("placeholder");
        let miss = GeocodeResult::placeholder(
            "1 NOWHERE Charlottesville VA".to_string(),
            LookupOutcome::ZeroResults,
        );

        let mut writer = CacheWriter::open(&path).unwrap();
        writer.append(&miss).unwrap();
        writer.finish().unwrap();

        let cache = GeocodeCache::load(&path).unwrap();
        assert_eq!(cache.get(&miss.query), Some(&miss));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn only_final_outcomes_resolve() {
        let mut cache = GeocodeCache::default();
        cache.insert(ok("a", 38.0));
        cache.insert(GeocodeResult::placeholder(
            "b".to_string(),
            LookupOutcome::ZeroResults,
        ));
        for (key, outcome) in [
            ("c", LookupOutcome::Rejected),
            ("d", LookupOutcome::Malformed),
            ("e", LookupOutcome::TimedOut),
        ] {
            cache.insert(GeocodeResult::placeholder(key.to_string(), outcome));
        }

        assert!(cache.is_resolved("a"));
        assert!(cache.is_resolved("b"));
        assert!(!cache.is_resolved("c"));
        assert!(!cache.is_resolved("d"));
        assert!(!cache.is_resolved("e"));
        assert!(!cache.is_resolved("f"));

        let counts = cache.outcome_counts();
        assert_eq!(counts.get(&LookupOutcome::Ok), Some(&1));
        assert_eq!(counts.values().sum::<usize>(), 5);
    }

    #[test]
    fn later_failures_do_not_replace_a_resolved_entry() {
        let path = temp_path("keep_resolved");
        let main = "100 MAIN ST Charlottesville VA";

        let mut writer = CacheWriter::open(&path).unwrap();
        writer.append(&ok(main, 38.03)).unwrap();
        for outcome in [
            LookupOutcome::TimedOut,
            LookupOutcome::Rejected,
            LookupOutcome::Malformed,
        ] {
            writer
                .append(&GeocodeResult::placeholder(main.to_string(), outcome))
                .unwrap();
        }
        writer.finish().unwrap();

        let cache = GeocodeCache::load(&path).unwrap();
        assert!(cache.is_resolved(main));
        assert_eq!(cache.get(main), Some(&ok(main, 38.03)));

        // A later final answer still replaces an earlier one.
        let mut cache = cache;
        cache.insert(GeocodeResult::placeholder(
            main.to_string(),
            LookupOutcome::ZeroResults,
        ));
        assert_eq!(cache.get(main).map(|r| r.outcome), Some(LookupOutcome::ZeroResults));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
