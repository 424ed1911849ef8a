#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetches Charlottesville crime records, geocodes their block addresses,
//! and joins the coordinates back onto the records.
//!
//! The pipeline is a chain of stages that each take the previous stage's
//! output and return a new value:
//!
//! 1. fetch raw records ([`cville_crime_source::fetch`])
//! 2. normalize block number and street name, build the address
//!    ([`cville_crime_source::normalize`])
//! 3. reduce to distinct addresses ([`dedupe`])
//! 4. drop addresses already resolved in the cache ([`pending_addresses`])
//! 5. geocode the rest under the daily quota
//!    ([`cville_crime_geocoder::scheduler`]), appending each row to the cache
//! 6. join results onto records ([`merge`]) and write the output CSV

pub mod config;
pub mod dedupe;
pub mod merge;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use cville_crime_database::DbError;
use cville_crime_database::geocode_cache::{CacheWriter, GeocodeCache};
use cville_crime_database::{output, paths};
use cville_crime_geocoder::progress::ProgressCallback;
use cville_crime_geocoder::quota::{QuotaConfig, QuotaLedger};
use cville_crime_geocoder::scheduler::{ResultSink, Scheduler};
use cville_crime_geocoder::service_registry::{self, GeocodingService};
use cville_crime_geocoder::{GeocodeError, Geocoder, OutputDetail};
use cville_crime_models::{GeocodeResult, RawCrimeRecord};
use cville_crime_source::source_def::SourceDefinition;
use cville_crime_source::{FetchOptions, SourceError, fetch, normalize, registry};

use crate::config::UserConfig;
use crate::merge::MergeReport;

/// Errors that can occur while running the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Fetching or parsing source data failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Geocoding failed or the quota ran out.
    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    /// Reading or writing the cache or output failed.
    #[error(transparent)]
    Database(#[from] DbError),

    /// I/O error (config file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid user configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

/// Inputs for a full pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Source id; the default source when `None`.
    pub source: Option<String>,
    /// Geocoding service id; the highest-priority enabled one when `None`.
    pub service: Option<String>,
    /// Previously downloaded `GeoJSON` to read instead of downloading.
    pub input: Option<PathBuf>,
    /// Maximum number of records to process.
    pub limit: Option<u64>,
    /// Re-query addresses even if the cache has a final result.
    pub refresh: bool,
    /// Directory for the cache, ledgers, snapshots, and output.
    pub data_dir: PathBuf,
    /// User configuration overrides.
    pub config: UserConfig,
}

/// What a pipeline run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Records fetched.
    pub records: usize,
    /// Distinct addresses among them.
    pub distinct_addresses: usize,
    /// Addresses sent to the geocoder this run.
    pub queried: usize,
    /// Addresses answered from the cache.
    pub cached: usize,
    /// Join counts.
    pub report: MergeReport,
    /// Where the geocoded records were written.
    pub output_path: PathBuf,
}

/// Chooses the data directory: the flag, else the config file, else the
/// project's `data/`.
#[must_use]
pub fn resolve_data_dir(flag: Option<PathBuf>, config: &UserConfig) -> PathBuf {
    flag.or_else(|| config.data_dir.clone())
        .unwrap_or_else(paths::default_data_dir)
}

/// Returns the addresses in `distinct` that still need a lookup.
///
/// An address is skipped when the cache holds a final outcome for it,
/// unless `refresh` is set.
#[must_use]
pub fn pending_addresses(distinct: &[String], cache: &GeocodeCache, refresh: bool) -> Vec<String> {
    if refresh {
        return distinct.to_vec();
    }
    distinct
        .iter()
        .filter(|address| !cache.is_resolved(address))
        .cloned()
        .collect()
}

/// Cached rows for the addresses in `distinct` that `fresh` does not
/// settle.
///
/// A fresh row settles its address when its outcome is final or the cache
/// has nothing final to offer instead. A non-final fresh row (a timeout on
/// `--refresh`, say) leaves a resolved cached row in place; merge the
/// returned rows ahead of `fresh` so they win.
#[must_use]
pub fn cached_results(
    distinct: &[String],
    cache: &GeocodeCache,
    fresh: &[GeocodeResult],
) -> Vec<GeocodeResult> {
    let settled: BTreeSet<&str> = fresh
        .iter()
        .filter(|r| r.outcome.is_final() || !cache.is_resolved(&r.query))
        .map(|r| r.query.as_str())
        .collect();
    distinct
        .iter()
        .filter(|address| !settled.contains(address.as_str()))
        .filter_map(|address| cache.get(address).cloned())
        .collect()
}

/// Appends every scheduler row to the cache file and keeps a copy for the
/// merge.
struct CacheSink {
    writer: CacheWriter,
    rows: Vec<GeocodeResult>,
}

impl ResultSink for CacheSink {
    fn record(&mut self, result: &GeocodeResult) -> Result<(), GeocodeError> {
        self.writer
            .append(result)
            .map_err(|e| GeocodeError::Sink {
                message: e.to_string(),
            })?;
        self.rows.push(result.clone());
        Ok(())
    }
}

/// Rows from one geocoding pass, and the quota stop that cut it short.
struct Geocoded {
    rows: Vec<GeocodeResult>,
    stopped: Option<GeocodeError>,
}

/// Stages from normalized records through the output file, bound to one
/// source and one geocoder.
pub struct Pipeline<'a> {
    source: &'a SourceDefinition,
    geocoder: &'a dyn Geocoder,
    quota: QuotaConfig,
    data_dir: PathBuf,
    refresh: bool,
    progress: Arc<dyn ProgressCallback>,
}

impl<'a> Pipeline<'a> {
    /// Creates a pipeline writing under `data_dir`.
    #[must_use]
    pub fn new(
        source: &'a SourceDefinition,
        geocoder: &'a dyn Geocoder,
        quota: QuotaConfig,
        data_dir: &Path,
    ) -> Self {
        Self {
            source,
            geocoder,
            quota,
            data_dir: data_dir.to_path_buf(),
            refresh: false,
            progress: cville_crime_geocoder::progress::null_progress(),
        }
    }

    /// Ignores final cache entries when choosing what to query.
    #[must_use]
    pub const fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Reports geocoding progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs every stage after fetching on `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the cache, ledger, or output cannot be
    /// accessed, a transport error occurs, or the quota runs out under the
    /// fail-fast policy. Rows geocoded before the error stay in the cache.
    /// On a quota stop the output file is still written from every row
    /// available, then the quota error is returned.
    pub async fn process(&self, raw: &[RawCrimeRecord]) -> Result<RunSummary, IngestError> {
        let records = normalize::normalize_records(raw, self.source);
        let distinct = dedupe::distinct_addresses(&records);

        let cache_path = paths::geocode_cache_path(&self.data_dir);
        let cache = GeocodeCache::load(&cache_path)?;
        let pending = pending_addresses(&distinct, &cache, self.refresh);
        log::info!(
            "{} of {} distinct addresses need a lookup ({} resolved in cache)",
            pending.len(),
            distinct.len(),
            distinct.len() - pending.len(),
        );

        let Geocoded {
            rows: fresh,
            stopped,
        } = self.geocode(&pending, &cache_path).await?;
        let cached = cached_results(&distinct, &cache, &fresh);

        let merged = merge::merge(&records, &distinct, &[&cached, &fresh]);
        merged.report.log();

        let output_path = paths::output_path(&self.data_dir);
        output::write_geocoded(&output_path, &merged.records)?;

        if let Some(e) = stopped {
            log::warn!(
                "Wrote {} geocoded records to {} before stopping: {e}",
                merged.report.kept_records,
                output_path.display(),
            );
            return Err(e.into());
        }

        Ok(RunSummary {
            records: records.len(),
            distinct_addresses: distinct.len(),
            queried: fresh.len(),
            cached: cached.len(),
            report: merged.report,
            output_path,
        })
    }

    async fn geocode(
        &self,
        addresses: &[String],
        cache_path: &Path,
    ) -> Result<Geocoded, IngestError> {
        if addresses.is_empty() {
            return Ok(Geocoded {
                rows: Vec::new(),
                stopped: None,
            });
        }

        let ledger_path = paths::quota_ledger_path(&self.data_dir, self.geocoder.id());
        let mut ledger = QuotaLedger::load(&ledger_path, Utc::now().date_naive())?;
        log::info!(
            "{}: {} of {} daily requests remaining",
            self.geocoder.id(),
            ledger.remaining(self.quota.daily_limit),
            self.quota.daily_limit,
        );

        let mut sink = CacheSink {
            writer: CacheWriter::open(cache_path)?,
            rows: Vec::with_capacity(addresses.len()),
        };

        let outcome = Scheduler::new(self.geocoder, self.quota.clone())
            .with_ledger_path(ledger_path)
            .with_progress(self.progress.clone())
            .run(addresses, &mut ledger, &mut sink)
            .await;

        sink.writer.finish()?;
        match outcome {
            Ok(rows) => Ok(Geocoded {
                rows,
                stopped: None,
            }),
            Err(e @ GeocodeError::QuotaExhausted { .. }) => Ok(Geocoded {
                rows: sink.rows,
                stopped: Some(e),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Fetches the source's records, from `options.input` if set, otherwise
/// by downloading and keeping a snapshot under the data directory.
///
/// # Errors
///
/// Returns [`IngestError::Source`] if the records cannot be read or
/// downloaded.
pub async fn load_raw_records(
    client: &reqwest::Client,
    source: &SourceDefinition,
    options: &RunOptions,
) -> Result<Vec<RawCrimeRecord>, IngestError> {
    let records = match &options.input {
        Some(path) => {
            log::info!("{}: reading {}", source.name(), path.display());
            fetch::load_records(path, options.limit)?
        }
        None => {
            let fetch_options = FetchOptions {
                limit: options.limit,
                snapshot_path: Some(paths::snapshot_path(&options.data_dir, source.id())),
                ..FetchOptions::default()
            };
            fetch::fetch_records(client, source, &fetch_options).await?
        }
    };
    Ok(records)
}

/// Builds the geocoder for `service` with full output detail.
///
/// # Errors
///
/// Returns [`IngestError::Geocode`] if the service's API key is missing.
pub fn build_geocoder(
    service: &GeocodingService,
    client: reqwest::Client,
) -> Result<Box<dyn Geocoder>, IngestError> {
    Ok(service_registry::build_geocoder(
        service,
        client,
        OutputDetail::All,
    )?)
}

/// Runs the full pipeline: fetch, normalize, geocode, merge, write.
///
/// # Errors
///
/// Returns [`IngestError`] from any stage; see [`Pipeline::process`].
pub async fn run(
    options: &RunOptions,
    progress: Arc<dyn ProgressCallback>,
) -> Result<RunSummary, IngestError> {
    let source = registry::find_source(options.source.as_deref())?;
    let service = service_registry::find_service(options.service.as_deref())?;
    let quota = options.config.quota_for(&service);
    log::info!(
        "Source: {} | Geocoder: {} ({} requests/day, batches of {})",
        source.name(),
        service.name,
        quota.daily_limit,
        quota.batch_size,
    );

    let client = reqwest::Client::builder()
        .build()
        .map_err(SourceError::from)?;
    let geocoder = build_geocoder(&service, client.clone())?;
    let raw = load_raw_records(&client, &source, options).await?;

    Pipeline::new(&source, geocoder.as_ref(), quota, &options.data_dir)
        .with_refresh(options.refresh)
        .with_progress(progress)
        .process(&raw)
        .await
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use cville_crime_geocoder::quota::ExhaustionPolicy;
    use cville_crime_geocoder::{GeocodeMatch, GeocodeResponse};
    use cville_crime_models::LookupOutcome;
    use serde_json::json;

    use super::*;

    const MAIN: &str = "100 MAIN ST Charlottesville VA";
    const PARK: &str = "200 PARK ST Charlottesville VA";

    #[derive(Default)]
    struct FakeGeocoder {
        responses: BTreeMap<String, GeocodeResponse>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeGeocoder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        fn id(&self) -> &str {
            "fake"
        }

        async fn geocode(&self, address: &str) -> Result<GeocodeResponse, GeocodeError> {
            self.calls.lock().unwrap().push(address.to_string());
            Ok(self
                .responses
                .get(address)
                .cloned()
                .unwrap_or(GeocodeResponse::ZeroResults))
        }
    }

    fn hit(lat: f64, lng: f64) -> GeocodeResponse {
        GeocodeResponse::Success(GeocodeMatch {
            status: Some("OK".to_string()),
            latitude: lat,
            longitude: lng,
            formatted_address: Some("Charlottesville, VA, USA".to_string()),
            location_type: Some("RANGE_INTERPOLATED".to_string()),
            distinct_results: 1,
        })
    }

    fn raw(block: serde_json::Value, street: &str, offense: &str) -> RawCrimeRecord {
        let properties = json!({
            "BlockNumber": block,
            "StreetName": street,
            "Offense": offense,
        });
        RawCrimeRecord::new(properties.as_object().cloned().unwrap_or_default())
    }

    fn scenario() -> Vec<RawCrimeRecord> {
        vec![
            raw(json!("0"), " MAIN ST ", "Larceny"),
            raw(json!(null), "MAIN ST", "Assault"),
            raw(json!(200), "PARK ST", "Vandalism"),
        ]
    }

    fn quota() -> QuotaConfig {
        QuotaConfig {
            daily_limit: 100,
            batch_size: 1,
            concurrent_requests: 1,
            timeout_secs: 5,
            min_interval_ms: 0,
            on_exhausted: ExhaustionPolicy::FailFast,
        }
    }

    fn temp_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cville_crime_ingest_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        dir
    }

    fn geocoder() -> FakeGeocoder {
        let mut responses = BTreeMap::new();
        responses.insert(MAIN.to_string(), hit(38.03, -78.48));
        responses.insert(PARK.to_string(), hit(38.04, -78.49));
        FakeGeocoder {
            responses,
            ..FakeGeocoder::default()
        }
    }

    #[tokio::test]
    async fn end_to_end_geocodes_every_record() {
        let data_dir = temp_data_dir("end_to_end");
        let source = registry::find_source(None).unwrap();
        let geocoder = geocoder();

        let summary = Pipeline::new(&source, &geocoder, quota(), &data_dir)
            .process(&scenario())
            .await
            .unwrap();

        assert_eq!(summary.records, 3);
        assert_eq!(summary.distinct_addresses, 2);
        assert_eq!(summary.queried, 2);
        assert_eq!(summary.cached, 0);
        assert_eq!(summary.report.kept_records, 3);
        assert_eq!(summary.report.dropped_records, 0);
        assert_eq!(geocoder.calls().len(), 2);

        let output = std::fs::read_to_string(&summary.output_path).unwrap();
        assert_eq!(output.lines().count(), 4);
        assert_eq!(output.matches("38.03,-78.48").count(), 2);

        let ledger =
            QuotaLedger::load(&paths::quota_ledger_path(&data_dir, "fake"), Utc::now().date_naive())
                .unwrap();
        assert_eq!(ledger.used, 2);

        std::fs::remove_dir_all(&data_dir).ok();
    }

    #[tokio::test]
    async fn second_run_is_answered_from_the_cache() {
        let data_dir = temp_data_dir("second_run");
        let source = registry::find_source(None).unwrap();

        let first = geocoder();
        let summary = Pipeline::new(&source, &first, quota(), &data_dir)
            .process(&scenario())
            .await
            .unwrap();
        let output = std::fs::read_to_string(&summary.output_path).unwrap();

        let second = geocoder();
        let again = Pipeline::new(&source, &second, quota(), &data_dir)
            .process(&scenario())
            .await
            .unwrap();

        assert!(second.calls().is_empty());
        assert_eq!(again.queried, 0);
        assert_eq!(again.cached, 2);
        assert_eq!(again.report, summary.report);
        assert_eq!(
            std::fs::read_to_string(&again.output_path).unwrap(),
            output
        );

        std::fs::remove_dir_all(&data_dir).ok();
    }

    #[tokio::test]
    async fn non_final_cache_entries_are_requeried() {
        let data_dir = temp_data_dir("requery");
        let source = registry::find_source(None).unwrap();

        let mut writer = CacheWriter::open(&paths::geocode_cache_path(&data_dir)).unwrap();
        writer
            .append(&GeocodeResult::placeholder(
                MAIN.to_string(),
                LookupOutcome::TimedOut,
            ))
            .unwrap();
        writer
            .append(&GeocodeResult::placeholder(
                PARK.to_string(),
                LookupOutcome::ZeroResults,
            ))
            .unwrap();
        writer.finish().unwrap();

        let fake = geocoder();
        let summary = Pipeline::new(&source, &fake, quota(), &data_dir)
            .process(&scenario())
            .await
            .unwrap();

        assert_eq!(fake.calls(), vec![MAIN.to_string()]);
        assert_eq!(summary.report.kept_records, 2);
        assert_eq!(summary.report.failed_addresses, 1);
        assert_eq!(summary.report.dropped_records, 1);

        let refreshed = geocoder();
        Pipeline::new(&source, &refreshed, quota(), &data_dir)
            .with_refresh(true)
            .process(&scenario())
            .await
            .unwrap();
        assert_eq!(refreshed.calls().len(), 2);

        std::fs::remove_dir_all(&data_dir).ok();
    }

    #[tokio::test]
    async fn quota_exhaustion_keeps_completed_rows() {
        let data_dir = temp_data_dir("quota");
        let source = registry::find_source(None).unwrap();
        let geocoder = geocoder();
        let mut limited = quota();
        limited.daily_limit = 1;

        let result = Pipeline::new(&source, &geocoder, limited, &data_dir)
            .process(&scenario())
            .await;

        assert!(matches!(
            result,
            Err(IngestError::Geocode(GeocodeError::QuotaExhausted {
                limit: 1,
                pending: 1
            }))
        ));
        let cache = GeocodeCache::load(&paths::geocode_cache_path(&data_dir)).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.is_resolved(MAIN));

        // The two MAIN ST records geocoded before the stop are written.
        let output = std::fs::read_to_string(paths::output_path(&data_dir)).unwrap();
        assert_eq!(output.lines().count(), 3);
        assert_eq!(output.matches("38.03,-78.48").count(), 2);
        assert!(!output.contains("PARK ST"));

        std::fs::remove_dir_all(&data_dir).ok();
    }

    #[tokio::test]
    async fn refresh_keeps_resolved_rows_when_lookups_time_out() {
        let data_dir = temp_data_dir("refresh_timeout");
        let source = registry::find_source(None).unwrap();

        let first = Pipeline::new(&source, &geocoder(), quota(), &data_dir)
            .process(&scenario())
            .await
            .unwrap();
        assert_eq!(first.report.kept_records, 3);

        let timing_out = FakeGeocoder {
            responses: [MAIN, PARK]
                .into_iter()
                .map(|a| (a.to_string(), GeocodeResponse::TimedOut))
                .collect(),
            ..FakeGeocoder::default()
        };
        let second = Pipeline::new(&source, &timing_out, quota(), &data_dir)
            .with_refresh(true)
            .process(&scenario())
            .await
            .unwrap();

        assert_eq!(timing_out.calls().len(), 2);
        assert_eq!(second.report.kept_records, 3);
        assert_eq!(second.report.dropped_records, 0);
        assert_eq!(second.cached, 2);

        let cache = GeocodeCache::load(&paths::geocode_cache_path(&data_dir)).unwrap();
        assert!(cache.is_resolved(MAIN));
        assert_eq!(cache.get(MAIN).map(|r| r.outcome), Some(LookupOutcome::Ok));

        std::fs::remove_dir_all(&data_dir).ok();
    }

    #[test]
    fn fresh_failures_defer_to_resolved_cache_rows() {
        let mut cache = GeocodeCache::default();
        cache.insert(GeocodeResult {
            query: "a".to_string(),
            outcome: LookupOutcome::Ok,
            status: Some("OK".to_string()),
            latitude: Some(38.0),
            longitude: Some(-78.5),
            formatted_address: None,
            location_type: None,
        });
        cache.insert(GeocodeResult::placeholder(
            "b".to_string(),
            LookupOutcome::ZeroResults,
        ));
        let distinct = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let fresh = vec![
            GeocodeResult::placeholder("a".to_string(), LookupOutcome::TimedOut),
            GeocodeResult::placeholder("b".to_string(), LookupOutcome::ZeroResults),
            GeocodeResult::placeholder("c".to_string(), LookupOutcome::Rejected),
        ];

        let cached = cached_results(&distinct, &cache, &fresh);

        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].query, "a");
        assert_eq!(cached[0].outcome, LookupOutcome::Ok);
    }

    #[test]
    fn pending_skips_only_final_entries() {
        let mut cache = GeocodeCache::default();
        cache.insert(GeocodeResult::placeholder(
            "a".to_string(),
            LookupOutcome::ZeroResults,
        ));
        cache.insert(GeocodeResult::placeholder(
            "b".to_string(),
            LookupOutcome::Rejected,
        ));
        let distinct = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        assert_eq!(pending_addresses(&distinct, &cache, false), vec!["b", "c"]);
        assert_eq!(pending_addresses(&distinct, &cache, true), distinct);
    }

    #[test]
    fn data_dir_precedence() {
        let config = UserConfig {
            data_dir: Some(PathBuf::from("/from/config")),
            ..UserConfig::default()
        };
        assert_eq!(
            resolve_data_dir(Some(PathBuf::from("/from/flag")), &config),
            PathBuf::from("/from/flag")
        );
        assert_eq!(resolve_data_dir(None, &config), PathBuf::from("/from/config"));
        assert_eq!(
            resolve_data_dir(None, &UserConfig::default()),
            paths::default_data_dir()
        );
    }
}
