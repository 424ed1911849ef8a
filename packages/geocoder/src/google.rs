//! Google Maps Geocoding API client.
//!
//! One `GET` per address against the JSON endpoint. The response is an
//! object with a `status` string and, on success, a `results` array whose
//! entries carry `formatted_address`, `geometry.location.{lat,lng}`, and
//! `geometry.location_type`.
//!
//! Requests are never retried. A non-`OK` status is returned as data.
//!
//! See <https://developers.google.com/maps/documentation/geocoding/requests-geocoding>

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::{GeocodeError, GeocodeMatch, GeocodeResponse, Geocoder, OutputDetail};

/// Client for the Google geocoding endpoint.
#[derive(Debug, Clone)]
pub struct GoogleGeocoder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    region: Option<String>,
    detail: OutputDetail,
}

impl GoogleGeocoder {
    /// Creates a client for `base_url` authenticated with `api_key`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            region: None,
            detail: OutputDetail::All,
        }
    }

    /// Biases results toward a ccTLD region (e.g. `"us"`).
    #[must_use]
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// Sets how much of each result is kept.
    #[must_use]
    pub const fn with_detail(mut self, detail: OutputDetail) -> Self {
        self.detail = detail;
        self
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    fn id(&self) -> &str {
        "google"
    }

    async fn geocode(&self, address: &str) -> Result<GeocodeResponse, GeocodeError> {
        let mut params = vec![("address", address), ("key", self.api_key.as_str())];
        if let Some(region) = &self.region {
            params.push(("region", region.as_str()));
        }

        let resp = match self.client.get(&self.base_url).query(&params).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => return Ok(GeocodeResponse::TimedOut),
            Err(e) => return Err(GeocodeError::Http(e)),
        };

        let status = resp.status();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) if e.is_timeout() => return Ok(GeocodeResponse::TimedOut),
            Err(e) => return Err(GeocodeError::Http(e)),
        };

        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(body) => Ok(classify_response(&body, self.detail)),
            Err(_) if !status.is_success() => Err(GeocodeError::Status { status }),
            Err(e) => Ok(GeocodeResponse::Malformed {
                reason: format!("body is not JSON: {e}"),
            }),
        }
    }
}

/// Classifies a Google geocoding response body.
///
/// `OK` with at least one result yields [`GeocodeResponse::Success`] built
/// from the first result; `OK` with an empty `results` array and
/// `ZERO_RESULTS` both yield [`GeocodeResponse::ZeroResults`]; any other
/// status is [`GeocodeResponse::Rejected`]; a body without a string
/// `status`, or a first result without coordinates, is
/// [`GeocodeResponse::Malformed`].
#[must_use]
pub fn classify_response(body: &serde_json::Value, detail: OutputDetail) -> GeocodeResponse {
    let Some(status) = body.get("status").and_then(serde_json::Value::as_str) else {
        return GeocodeResponse::Malformed {
            reason: "missing status".to_string(),
        };
    };

    match status {
        "OK" => {}
        "ZERO_RESULTS" => return GeocodeResponse::ZeroResults,
        other => {
            if let Some(message) = body.get("error_message").and_then(serde_json::Value::as_str) {
                log::debug!("Google geocoder {other}: {message}");
            }
            return GeocodeResponse::Rejected {
                status: other.to_string(),
            };
        }
    }

    let Some(results) = body.get("results").and_then(serde_json::Value::as_array) else {
        return GeocodeResponse::Malformed {
            reason: "OK response without results array".to_string(),
        };
    };

    let Some(first) = results.first() else {
        return GeocodeResponse::ZeroResults;
    };

    let lat = first
        .pointer("/geometry/location/lat")
        .and_then(serde_json::Value::as_f64);
    let lng = first
        .pointer("/geometry/location/lng")
        .and_then(serde_json::Value::as_f64);
    let (Some(latitude), Some(longitude)) = (lat, lng) else {
        return GeocodeResponse::Malformed {
            reason: "first result has no geometry.location".to_string(),
        };
    };

    let (formatted_address, location_type) = match detail {
        OutputDetail::Coordinates => (None, None),
        OutputDetail::All => (
            first
                .get("formatted_address")
                .and_then(serde_json::Value::as_str)
                .map(String::from),
            first
                .pointer("/geometry/location_type")
                .and_then(serde_json::Value::as_str)
                .map(String::from),
        ),
    };

    // Results are compared on the fields we keep; identical entries count once.
    let distinct_results = results
        .iter()
        .map(|r| {
            (
                r.pointer("/geometry/location/lat").map(ToString::to_string),
                r.pointer("/geometry/location/lng").map(ToString::to_string),
                r.get("formatted_address").map(ToString::to_string),
                r.pointer("/geometry/location_type").map(ToString::to_string),
            )
        })
        .collect::<BTreeSet<_>>()
        .len();

    GeocodeResponse::Success(GeocodeMatch {
        status: Some(status.to_string()),
        latitude,
        longitude,
        formatted_address,
        location_type,
        distinct_results,
    })
}
