//! Joining geocode results back onto crime records.
//!
//! Three steps, each producing a new value:
//!
//! 1. Concatenate the result batches. When an address appears in more than
//!    one row, the first row wins.
//! 2. Left-join the distinct addresses against those rows, giving every
//!    address an optional result.
//! 3. Inner-join that mapping onto the full record set. Records whose
//!    address has no result with coordinates are dropped.
//!
//! [`MergeReport`] counts what each step discarded.

use std::collections::{BTreeMap, BTreeSet};

use cville_crime_models::{CrimeRecord, GeocodeResult, GeocodedCrimeRecord, LookupOutcome};

/// One distinct address and the result it joined to, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressGeocode {
    /// The distinct address.
    pub address: String,
    /// Its result row, or `None` when no batch contained it.
    pub result: Option<GeocodeResult>,
}

/// Counts from one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Distinct addresses joined against.
    pub distinct_addresses: usize,
    /// Result rows across all batches.
    pub result_rows: usize,
    /// Rows ignored because an earlier row had the same address.
    pub duplicate_results: usize,
    /// Result addresses that are not among the distinct addresses.
    pub orphan_results: usize,
    /// Distinct addresses with no result row.
    pub unmatched_addresses: usize,
    /// Distinct addresses whose result is not [`LookupOutcome::Ok`].
    pub failed_addresses: usize,
    /// Records going into the final join.
    pub input_records: usize,
    /// Records that survived the final join.
    pub kept_records: usize,
    /// Records dropped by the final join.
    pub dropped_records: usize,
}

impl MergeReport {
    /// Fraction of distinct addresses that geocoded successfully, or
    /// `None` when there were no addresses.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_ratio(&self) -> Option<f64> {
        if self.distinct_addresses == 0 {
            return None;
        }
        let ok = self.distinct_addresses - self.unmatched_addresses - self.failed_addresses;
        Some(ok as f64 / self.distinct_addresses as f64)
    }

    /// Logs the report at `info`, with a warning for anything dropped.
    pub fn log(&self) {
        log::info!(
            "Merge: {} result rows for {} distinct addresses ({} duplicate, {} orphan)",
            self.result_rows,
            self.distinct_addresses,
            self.duplicate_results,
            self.orphan_results,
        );
        log::info!(
            "Merge: {} addresses without a result, {} with a failed lookup, success ratio {}",
            self.unmatched_addresses,
            self.failed_addresses,
            self.success_ratio()
                .map_or_else(|| "n/a".to_string(), |r| format!("{:.1}%", r * 100.0)),
        );
        log::info!(
            "Merge: kept {} of {} records",
            self.kept_records,
            self.input_records,
        );
        if self.dropped_records > 0 {
            log::warn!(
                "Merge: dropped {} records whose address did not geocode",
                self.dropped_records
            );
        }
    }
}

/// Output of [`merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    /// Every distinct address with its optional result, in input order.
    pub mapping: Vec<AddressGeocode>,
    /// Records that joined to a result with coordinates, in input order.
    pub records: Vec<GeocodedCrimeRecord>,
    /// What was discarded along the way.
    pub report: MergeReport,
}

/// Concatenates `batches`, keeping the first row per address.
///
/// Returns the surviving rows and the number of duplicates ignored.
#[must_use]
pub fn concat_batches(batches: &[&[GeocodeResult]]) -> (Vec<GeocodeResult>, usize) {
    let mut seen = BTreeSet::new();
    let mut rows = Vec::new();
    let mut duplicates = 0;

    for row in batches.iter().flat_map(|batch| batch.iter()) {
        if seen.insert(row.query.as_str()) {
            rows.push(row.clone());
        } else {
            duplicates += 1;
        }
    }

    (rows, duplicates)
}

/// Left-joins `distinct` against `results` on the address key.
#[must_use]
pub fn left_join(distinct: &[String], results: &[GeocodeResult]) -> Vec<AddressGeocode> {
    let by_query: BTreeMap<&str, &GeocodeResult> =
        results.iter().map(|r| (r.query.as_str(), r)).collect();

    distinct
        .iter()
        .map(|address| AddressGeocode {
            address: address.clone(),
            result: by_query.get(address.as_str()).map(|r| (*r).clone()),
        })
        .collect()
}

/// Inner-joins `mapping` onto `records`, keeping only records whose address
/// has a result with coordinates.
#[must_use]
pub fn inner_join(records: &[CrimeRecord], mapping: &[AddressGeocode]) -> Vec<GeocodedCrimeRecord> {
    let located: BTreeMap<&str, &GeocodeResult> = mapping
        .iter()
        .filter_map(|m| {
            m.result
                .as_ref()
                .filter(|r| r.coordinates().is_some())
                .map(|r| (m.address.as_str(), r))
        })
        .collect();

    records
        .iter()
        .filter_map(|record| {
            located
                .get(record.address.as_str())
                .map(|result| GeocodedCrimeRecord {
                    record: record.clone(),
                    geocode: (*result).clone(),
                })
        })
        .collect()
}

/// Runs the three merge steps and reports what each discarded.
#[must_use]
pub fn merge(
    records: &[CrimeRecord],
    distinct: &[String],
    batches: &[&[GeocodeResult]],
) -> Merged {
    let result_rows: usize = batches.iter().map(|b| b.len()).sum();
    let (results, duplicate_results) = concat_batches(batches);

    let distinct_set: BTreeSet<&str> = distinct.iter().map(String::as_str).collect();
    let orphan_results = results
        .iter()
        .filter(|r| !distinct_set.contains(r.query.as_str()))
        .count();

    let mapping = left_join(distinct, &results);
    let unmatched_addresses = mapping.iter().filter(|m| m.result.is_none()).count();
    let failed_addresses = mapping
        .iter()
        .filter(|m| {
            m.result
                .as_ref()
                .is_some_and(|r| r.outcome != LookupOutcome::Ok)
        })
        .count();

    let geocoded = inner_join(records, &mapping);

    let report = MergeReport {
        distinct_addresses: distinct.len(),
        result_rows,
        duplicate_results,
        orphan_results,
        unmatched_addresses,
        failed_addresses,
        input_records: records.len(),
        kept_records: geocoded.len(),
        dropped_records: records.len() - geocoded.len(),
    };

    Merged {
        mapping,
        records: geocoded,
        report,
    }
}
