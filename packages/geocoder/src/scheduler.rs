//! Quota-aware batch scheduler.
//!
//! Splits the address list into batches of `batch_size`, reserves each
//! batch against the daily [`QuotaLedger`] before sending it, and runs the
//! requests of a batch with up to `concurrent_requests` in flight. Every
//! row is handed to a [`ResultSink`] as soon as it is parsed, so results
//! survive a later transport error or quota stop.
//!
//! When the budget is spent the scheduler either sleeps until the next
//! UTC midnight or stops with [`GeocodeError::QuotaExhausted`], per
//! [`ExhaustionPolicy`]. An `OVER_QUERY_LIMIT` answer from the service
//! marks the ledger exhausted and stops launching requests. Requests
//! already in flight are still recorded; only the addresses the service
//! refused or that were never sent go back in the queue.

use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cville_crime_models::GeocodeResult;
use futures::stream::{self, StreamExt as _};

use crate::parse;
use crate::progress::{ProgressCallback, null_progress};
use crate::quota::{Clock, ExhaustionPolicy, QuotaConfig, QuotaLedger, SystemClock, until_reset};
use crate::{GeocodeError, GeocodeResponse, Geocoder};

/// Destination for result rows as they are produced.
pub trait ResultSink {
    /// Persists one row.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Sink`] if the row cannot be stored.
    fn record(&mut self, result: &GeocodeResult) -> Result<(), GeocodeError>;
}

impl ResultSink for Vec<GeocodeResult> {
    fn record(&mut self, result: &GeocodeResult) -> Result<(), GeocodeError> {
        self.push(result.clone());
        Ok(())
    }
}

/// How a batch ended.
enum BatchEnd {
    /// Every address got a row.
    Complete,
    /// The service reported its quota spent; these addresses got no row.
    OverLimit(Vec<String>),
}

/// Runs geocoding requests against a daily budget.
pub struct Scheduler<'a> {
    geocoder: &'a dyn Geocoder,
    quota: QuotaConfig,
    ledger_path: Option<PathBuf>,
    progress: Arc<dyn ProgressCallback>,
    clock: Arc<dyn Clock>,
}

impl<'a> Scheduler<'a> {
    /// Creates a scheduler for `geocoder` with the given budget.
    #[must_use]
    pub fn new(geocoder: &'a dyn Geocoder, quota: QuotaConfig) -> Self {
        Self {
            geocoder,
            quota,
            ledger_path: None,
            progress: null_progress(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Persists the ledger to `path` after every change.
    #[must_use]
    pub fn with_ledger_path(mut self, path: PathBuf) -> Self {
        self.ledger_path = Some(path);
        self
    }

    /// Reports per-address progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Reads the current day and reset time from `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Geocodes every address once and returns one row per address.
    ///
    /// Row order follows completion order, not input order.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::QuotaExhausted`] when the budget runs out
    /// under [`ExhaustionPolicy::FailFast`], transport errors from the
    /// geocoder, and sink or ledger write failures. Rows produced before
    /// the error have already been passed to `sink`.
    pub async fn run(
        &self,
        addresses: &[String],
        ledger: &mut QuotaLedger,
        sink: &mut dyn ResultSink,
    ) -> Result<Vec<GeocodeResult>, GeocodeError> {
        let limit = self.quota.daily_limit;
        let batch_size = self.quota.batch_size.max(1);
        let mut pending: VecDeque<String> = addresses.iter().cloned().collect();
        let mut results = Vec::with_capacity(addresses.len());
        let mut batch_no = 0usize;

        self.progress.set_total(addresses.len() as u64);

        while !pending.is_empty() {
            ledger.roll_over(self.clock.now().date_naive());
            let granted = ledger.reserve(batch_size.min(pending.len()), limit);
            self.save_ledger(ledger)?;

            if granted == 0 {
                match self.quota.on_exhausted {
                    ExhaustionPolicy::FailFast => {
                        log::error!(
                            "{}: daily limit of {limit} requests reached, {} addresses left",
                            self.geocoder.id(),
                            pending.len()
                        );
                        return Err(GeocodeError::QuotaExhausted {
                            limit,
                            pending: pending.len(),
                        });
                    }
                    ExhaustionPolicy::Pause => {
                        let wait = until_reset(self.clock.now());
                        log::warn!(
                            "{}: daily limit of {limit} requests reached, pausing {}s until reset",
                            self.geocoder.id(),
                            wait.as_secs()
                        );
                        self.progress
                            .set_message(format!("quota exhausted, waiting {}s", wait.as_secs()));
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                }
            }

            batch_no += 1;
            let batch: Vec<String> = pending.drain(..granted).collect();
            log::info!(
                "{}: batch {batch_no}: {} addresses ({}/{limit} daily requests used)",
                self.geocoder.id(),
                batch.len(),
                ledger.used,
            );
            self.progress
                .set_message(format!("{} batch {batch_no}", self.geocoder.id()));

            match self.run_batch(&batch, sink, &mut results).await? {
                BatchEnd::Complete => {}
                BatchEnd::OverLimit(leftover) => {
                    log::warn!(
                        "{}: service reported quota exhausted, {} addresses in batch {batch_no} unanswered",
                        self.geocoder.id(),
                        leftover.len()
                    );
                    ledger.exhaust(limit);
                    self.save_ledger(ledger)?;
                    for address in leftover.into_iter().rev() {
                        pending.push_front(address);
                    }
                }
            }
        }

        self.progress.finish(format!(
            "{}: {} addresses in {batch_no} batches",
            self.geocoder.id(),
            results.len()
        ));

        Ok(results)
    }

    /// Sends one batch and records each row as it arrives.
    ///
    /// After an `OVER_QUERY_LIMIT` answer no further request is launched,
    /// but responses already in flight are drained and recorded.
    async fn run_batch(
        &self,
        batch: &[String],
        sink: &mut dyn ResultSink,
        results: &mut Vec<GeocodeResult>,
    ) -> Result<BatchEnd, GeocodeError> {
        let geocoder = self.geocoder;
        let timeout = self.quota.timeout();
        let interval = self.quota.min_interval();
        let concurrency = self.quota.concurrent_requests.max(1);
        let stopped = AtomicBool::new(false);
        let stopped = &stopped;

        let responses = stream::iter(batch.iter().enumerate())
            .then(|(i, address)| async move {
                if i > 0 && !interval.is_zero() && !stopped.load(Ordering::Relaxed) {
                    tokio::time::sleep(interval).await;
                }
                address
            })
            .map(|address| async move {
                if stopped.load(Ordering::Relaxed) {
                    return (address, None);
                }
                let response = tokio::time::timeout(timeout, geocoder.geocode(address))
                    .await
                    .unwrap_or(Ok(GeocodeResponse::TimedOut));
                (address, Some(response))
            })
            .buffer_unordered(concurrency);
        let mut responses = pin!(responses);

        let mut answered: BTreeSet<&String> = BTreeSet::new();

        while let Some((address, response)) = responses.next().await {
            let Some(response) = response else {
                continue;
            };
            let response = response?;

            if response.is_over_query_limit() {
                stopped.store(true, Ordering::Relaxed);
                continue;
            }

            match &response {
                GeocodeResponse::Success(m) if m.distinct_results > 1 => {
                    log::debug!(
                        "'{address}': {} distinct results, keeping the first",
                        m.distinct_results
                    );
                }
                GeocodeResponse::Malformed { reason } => {
                    log::warn!("'{address}': malformed response ({reason})");
                }
                GeocodeResponse::TimedOut => {
                    log::warn!("'{address}': timed out after {}s", timeout.as_secs());
                }
                _ => {}
            }

            let row = parse::to_row(address, &response);
            sink.record(&row)?;
            results.push(row);
            answered.insert(address);
            self.progress.inc(1);
        }

        if stopped.load(Ordering::Relaxed) {
            let leftover = batch
                .iter()
                .filter(|a| !answered.contains(a))
                .cloned()
                .collect();
            return Ok(BatchEnd::OverLimit(leftover));
        }

        Ok(BatchEnd::Complete)
    }

    fn save_ledger(&self, ledger: &QuotaLedger) -> Result<(), GeocodeError> {
        if let Some(path) = &self.ledger_path {
            ledger.save(path)?;
        }
        Ok(())
    }
}
