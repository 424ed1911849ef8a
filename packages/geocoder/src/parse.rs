//! Flattening of classified responses into result rows.
//!
//! Every query produces exactly one [`GeocodeResult`] keyed by the query
//! string. Only a [`GeocodeResponse::Success`] populates anything beyond the
//! key and outcome.

use std::collections::BTreeMap;

use cville_crime_models::{GeocodeResult, LookupOutcome};

use crate::GeocodeResponse;

/// Maps a response to its [`LookupOutcome`].
#[must_use]
pub const fn outcome_of(response: &GeocodeResponse) -> LookupOutcome {
    match response {
        GeocodeResponse::Success(_) => LookupOutcome::Ok,
        GeocodeResponse::ZeroResults => LookupOutcome::ZeroResults,
        GeocodeResponse::Rejected { .. } => LookupOutcome::Rejected,
        GeocodeResponse::Malformed { .. } => LookupOutcome::Malformed,
        GeocodeResponse::TimedOut => LookupOutcome::TimedOut,
    }
}

/// Flattens one response into a row keyed by `query`.
#[must_use]
pub fn to_row(query: &str, response: &GeocodeResponse) -> GeocodeResult {
    match response {
        GeocodeResponse::Success(m) => GeocodeResult {
            query: query.to_string(),
            outcome: LookupOutcome::Ok,
            status: m.status.clone(),
            latitude: Some(m.latitude),
            longitude: Some(m.longitude),
            formatted_address: m.formatted_address.clone(),
            location_type: m.location_type.clone(),
        },
        other => GeocodeResult::placeholder(query.to_string(), outcome_of(other)),
    }
}

/// Counts rows per outcome.
#[must_use]
pub fn tally(results: &[GeocodeResult]) -> BTreeMap<LookupOutcome, usize> {
    let mut counts = BTreeMap::new();
    for row in results {
        *counts.entry(row.outcome).or_insert(0) += 1;
    }
    counts
}

/// Fraction of rows with outcome [`LookupOutcome::Ok`], or `None` when
/// there are no rows.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn success_ratio(results: &[GeocodeResult]) -> Option<f64> {
    if results.is_empty() {
        return None;
    }
    let ok = results
        .iter()
        .filter(|r| r.outcome == LookupOutcome::Ok)
        .count();
    Some(ok as f64 / results.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeocodeMatch;

    fn success() -> GeocodeResponse {
        GeocodeResponse::Success(GeocodeMatch {
            status: Some("OK".to_string()),
            latitude: 38.03,
            longitude: -78.48,
            formatted_address: Some("100 Main St, Charlottesville, VA".to_string()),
            location_type: Some("APPROXIMATE".to_string()),
            distinct_results: 1,
        })
    }

    #[test]
    fn success_populates_every_field() {
        let row = to_row("100 MAIN ST Charlottesville VA", &success());
        assert_eq!(row.query, "100 MAIN ST Charlottesville VA");
        assert_eq!(row.outcome, LookupOutcome::Ok);
        assert_eq!(row.status.as_deref(), Some("OK"));
        assert_eq!(row.coordinates(), Some((38.03, -78.48)));
        assert!(row.formatted_address.is_some());
        assert!(row.location_type.is_some());
    }

    #[test]
    fn failures_yield_one_placeholder_each() {
        let failures = [
            (GeocodeResponse::ZeroResults, LookupOutcome::ZeroResults),
            (
                GeocodeResponse::Rejected {
                    status: "REQUEST_DENIED".to_string(),
                },
                LookupOutcome::Rejected,
            ),
            (
                GeocodeResponse::Malformed {
                    reason: "missing status".to_string(),
                },
                LookupOutcome::Malformed,
            ),
            (GeocodeResponse::TimedOut, LookupOutcome::TimedOut),
        ];

        for (response, expected) in failures {
            let row = to_row("1 NOWHERE Charlottesville VA", &response);
            assert_eq!(row.query, "1 NOWHERE Charlottesville VA");
            assert_eq!(row.outcome, expected);
            assert!(row.status.is_none());
            assert!(row.coordinates().is_none());
            assert!(row.formatted_address.is_none());
            assert!(row.location_type.is_none());
        }
    }

    #[test]
    fn tallies_outcomes() {
        let rows = vec![
            to_row("a", &success()),
            to_row("b", &success()),
            to_row("c", &GeocodeResponse::ZeroResults),
        ];
        let counts = tally(&rows);
        assert_eq!(counts.get(&LookupOutcome::Ok), Some(&2));
        assert_eq!(counts.get(&LookupOutcome::ZeroResults), Some(&1));
        assert_eq!(counts.get(&LookupOutcome::TimedOut), None);

        let ratio = success_ratio(&rows).unwrap();
        assert!((ratio - 2.0 / 3.0).abs() < 1e-9);
        assert!(success_ratio(&[]).is_none());
    }
}
