#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Record and result types shared across the cville-crime toolchain.
//!
//! Crime records flow through the pipeline in three shapes:
//!
//! 1. [`RawCrimeRecord`]: the untouched `properties` of one feature from
//!    the open-data portal.
//! 2. [`CrimeRecord`]: the raw record plus the derived block number,
//!    trimmed street name, and address string.
//! 3. [`GeocodedCrimeRecord`]: a crime record joined to the
//!    [`GeocodeResult`] for its address.
//!
//! Derived columns are only ever added; the raw properties are never
//! rewritten.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Attribute map of a single feature.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// One reported incident exactly as published.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCrimeRecord {
    /// Feature attributes. Geometry is discarded at fetch time.
    pub properties: Properties,
}

impl RawCrimeRecord {
    /// Wraps a feature's attribute map.
    #[must_use]
    pub const fn new(properties: Properties) -> Self {
        Self { properties }
    }

    /// Returns the named attribute as text.
    ///
    /// Strings are returned as-is, numbers and booleans are rendered with
    /// their JSON representation, and `null` or absent attributes yield
    /// `None`.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<String> {
        match self.properties.get(field)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_)) => {
                Some(other.to_string())
            }
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

/// Hundred-block number of an incident location.
///
/// The city publishes block numbers rounded to the nearest hundred. A
/// missing or zero block is recoded to [`BlockNumber::DEFAULT`], so every
/// value held by this type is finite.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockNumber(f64);

impl BlockNumber {
    /// Block assigned to records with a missing or zero block number.
    pub const DEFAULT: Self = Self(100.0);

    /// Applies the recode rule to a parsed block number.
    ///
    /// Missing → 100, exactly zero → 100, anything else unchanged.
    /// Non-finite values count as missing.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn recode(parsed: Option<f64>) -> Self {
        match parsed {
            Some(v) if v.is_finite() && v != 0.0 => Self(v),
            _ => Self::DEFAULT,
        }
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for BlockNumber {
    #[allow(clippy::float_cmp)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract() == 0.0 {
            write!(f, "{:.0}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A crime record with its normalized location columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeRecord {
    /// Original feature attributes, untouched.
    pub properties: Properties,
    /// Recoded block number.
    pub block_number: BlockNumber,
    /// Street name with surrounding whitespace removed.
    pub street_name: String,
    /// Geocoding query string built from the block, street, and locality.
    pub address: String,
}

/// How a single address lookup ended.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupOutcome {
    /// The service matched the address.
    Ok,
    /// The service answered but found nothing.
    ZeroResults,
    /// The service refused the query (quota, key, invalid request).
    Rejected,
    /// The response could not be understood.
    Malformed,
    /// No response arrived within the per-request timeout.
    TimedOut,
}

impl LookupOutcome {
    /// Whether a cached result with this outcome should stop the address
    /// from being queried again.
    ///
    /// Matches and definitive "not found" answers are final. Refusals,
    /// unreadable responses, and timeouts say nothing about the address
    /// itself and are retried on the next run.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Ok | Self::ZeroResults)
    }
}

/// Flat geocoding result for one query address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    /// The exact address string that was submitted.
    pub query: String,
    /// How the lookup ended.
    pub outcome: LookupOutcome,
    /// Service status string, populated for successful lookups.
    pub status: Option<String>,
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
    /// Canonical address returned by the service.
    pub formatted_address: Option<String>,
    /// Precision classification (e.g. `ROOFTOP`, `APPROXIMATE`).
    pub location_type: Option<String>,
}

impl GeocodeResult {
    /// A row with every field empty except the query key and outcome.
    #[must_use]
    pub const fn placeholder(query: String, outcome: LookupOutcome) -> Self {
        Self {
            query,
            outcome,
            status: None,
            latitude: None,
            longitude: None,
            formatted_address: None,
            location_type: None,
        }
    }

    /// Returns `(latitude, longitude)` when both are present.
    #[must_use]
    pub const fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}

/// A crime record joined to the geocode result for its address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedCrimeRecord {
    /// The source record.
    pub record: CrimeRecord,
    /// The geocode result whose `query` equals `record.address`.
    pub geocode: GeocodeResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr as _;

    #[test]
    fn recodes_missing_and_zero() {
        assert_eq!(BlockNumber::recode(None), BlockNumber::DEFAULT);
        assert_eq!(BlockNumber::recode(Some(0.0)), BlockNumber::DEFAULT);
        assert_eq!(BlockNumber::recode(Some(-0.0)), BlockNumber::DEFAULT);
        assert_eq!(BlockNumber::recode(Some(f64::NAN)), BlockNumber::DEFAULT);
    }

    #[test]
    fn keeps_other_blocks() {
        assert!((BlockNumber::recode(Some(450.0)).value() - 450.0).abs() < f64::EPSILON);
        assert!((BlockNumber::recode(Some(-100.0)).value() + 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn displays_integral_blocks_without_fraction() {
        assert_eq!(BlockNumber::DEFAULT.to_string(), "100");
        assert_eq!(BlockNumber::recode(Some(1200.0)).to_string(), "1200");
        assert_eq!(BlockNumber::recode(Some(12.5)).to_string(), "12.5");
    }

    #[test]
    fn reads_text_attributes() {
        let record = RawCrimeRecord::new(
            serde_json::json!({
                "BlockNumber": 400,
                "StreetName": "AVON ST",
                "Missing": null,
            })
            .as_object()
            .cloned()
            .unwrap(),
        );
        assert_eq!(record.text("BlockNumber").as_deref(), Some("400"));
        assert_eq!(record.text("StreetName").as_deref(), Some("AVON ST"));
        assert_eq!(record.text("Missing"), None);
        assert_eq!(record.text("Absent"), None);
    }

    #[test]
    fn outcome_string_forms() {
        assert_eq!(LookupOutcome::ZeroResults.as_ref(), "ZERO_RESULTS");
        assert_eq!(
            LookupOutcome::from_str("TIMED_OUT").unwrap(),
            LookupOutcome::TimedOut
        );
        assert!(LookupOutcome::Ok.is_final());
        assert!(LookupOutcome::ZeroResults.is_final());
        assert!(!LookupOutcome::TimedOut.is_final());
        assert!(!LookupOutcome::Rejected.is_final());
    }

    #[test]
    fn placeholder_has_only_key() {
        let row = GeocodeResult::placeholder("1 A ST".to_string(), LookupOutcome::Malformed);
        assert_eq!(row.query, "1 A ST");
        assert!(row.status.is_none());
        assert!(row.coordinates().is_none());
        assert!(row.formatted_address.is_none());
        assert!(row.location_type.is_none());
    }
}
