#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geocoding for crime block addresses.
//!
//! Converts address strings to latitude/longitude through an external
//! provider configured via TOML files in `services/`:
//!
//! 1. **Google Maps Geocoding API** (priority 1): commercial, API key,
//!    2,500 free requests per day.
//! 2. **Nominatim / OpenStreetMap** (priority 2): free, 1 req/sec.
//!
//! Every provider answers with a [`GeocodeResponse`], which distinguishes a
//! match from "no results", a refusal, an unreadable body, and a timeout.
//! [`parse::to_row`] flattens a response into a
//! [`GeocodeResult`](cville_crime_models::GeocodeResult) row.
//!
//! The [`scheduler`] submits addresses in batches against a daily request
//! budget tracked by [`quota::QuotaLedger`].

pub mod google;
pub mod nominatim;
pub mod parse;
pub mod progress;
pub mod quota;
pub mod scheduler;
pub mod service_registry;

use async_trait::async_trait;
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// How much of a response the client keeps.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutputDetail {
    /// Latitude and longitude only.
    Coordinates,
    /// Coordinates plus formatted address and location type.
    #[default]
    All,
}

/// A matched location extracted from the first result of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeMatch {
    /// Service status string, when the service reports one.
    pub status: Option<String>,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Canonical address returned by the service.
    pub formatted_address: Option<String>,
    /// Precision classification.
    pub location_type: Option<String>,
    /// Number of distinct results the service returned.
    pub distinct_results: usize,
}

/// One provider response, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeResponse {
    /// The service matched the address.
    Success(GeocodeMatch),
    /// The service answered but found nothing.
    ZeroResults,
    /// The service refused the request with the given status.
    Rejected {
        /// Status reported by the service (e.g. `OVER_QUERY_LIMIT`).
        status: String,
    },
    /// The body did not have a recognizable shape.
    Malformed {
        /// What was wrong with it.
        reason: String,
    },
    /// No answer within the per-request timeout.
    TimedOut,
}

/// Status Google uses when the daily or per-second quota is spent.
pub const OVER_QUERY_LIMIT: &str = "OVER_QUERY_LIMIT";

impl GeocodeResponse {
    /// Whether the service reported that the request budget is exhausted.
    #[must_use]
    pub fn is_over_query_limit(&self) -> bool {
        matches!(self, Self::Rejected { status } if status == OVER_QUERY_LIMIT)
    }
}

/// A geocoding provider.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Service id (matches the TOML `id`).
    fn id(&self) -> &str;

    /// Looks up a single address.
    ///
    /// Service-reported failures (no results, refusals, unreadable bodies,
    /// timeouts) are returned as [`GeocodeResponse`] variants, not errors.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] for transport failures (connection, TLS,
    /// DNS) and HTTP statuses without a readable body.
    async fn geocode(&self, address: &str) -> Result<GeocodeResponse, GeocodeError>;
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an HTTP error and no readable body.
    #[error("HTTP {status} from geocoding service")]
    Status {
        /// Response status code.
        status: reqwest::StatusCode,
    },

    /// Service configuration is incomplete (e.g. missing API key).
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// The daily request budget is spent and the policy is to stop.
    #[error("Daily quota of {limit} requests exhausted with {pending} addresses left")]
    QuotaExhausted {
        /// Configured daily limit.
        limit: u64,
        /// Addresses not yet queried.
        pending: usize,
    },

    /// The quota ledger could not be read or written.
    #[error("Quota ledger error: {0}")]
    Ledger(#[from] std::io::Error),

    /// The quota ledger contents were invalid.
    #[error("Quota ledger parse error: {0}")]
    LedgerFormat(#[from] serde_json::Error),

    /// A result could not be persisted.
    #[error("Failed to persist result: {message}")]
    Sink {
        /// Description of the failure.
        message: String,
    },
}
