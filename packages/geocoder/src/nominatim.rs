//! Nominatim / OpenStreetMap geocoder client.
//!
//! Free alternative to the commercial provider. The public instance allows
//! **1 request per second**; the scheduler enforces this through
//! `min_interval_ms` in the service TOML.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use async_trait::async_trait;

use crate::{
    GeocodeError, GeocodeMatch, GeocodeResponse, Geocoder, OVER_QUERY_LIMIT, OutputDetail,
};

/// Client for a Nominatim `/search` endpoint.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
    detail: OutputDetail,
}

impl NominatimGeocoder {
    /// Creates a client for `base_url`.
    ///
    /// The public instance rejects requests without an identifying
    /// `User-Agent`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, user_agent: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            user_agent: user_agent.to_string(),
            detail: OutputDetail::All,
        }
    }

    /// Sets how much of each result is kept.
    #[must_use]
    pub const fn with_detail(mut self, detail: OutputDetail) -> Self {
        self.detail = detail;
        self
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    fn id(&self) -> &str {
        "nominatim"
    }

    async fn geocode(&self, address: &str) -> Result<GeocodeResponse, GeocodeError> {
        let result = self
            .client
            .get(&self.base_url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[
                ("q", address),
                ("countrycodes", "us"),
                ("format", "jsonv2"),
                ("limit", "1"),
            ])
            .send()
            .await;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => return Ok(GeocodeResponse::TimedOut),
            Err(e) => return Err(GeocodeError::Http(e)),
        };

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Ok(GeocodeResponse::Rejected {
                status: OVER_QUERY_LIMIT.to_string(),
            });
        }
        if !status.is_success() {
            return Err(GeocodeError::Status { status });
        }

        match resp.json::<serde_json::Value>().await {
            Ok(body) => Ok(classify_response(&body, self.detail)),
            Err(e) if e.is_timeout() => Ok(GeocodeResponse::TimedOut),
            Err(e) if e.is_decode() => Ok(GeocodeResponse::Malformed {
                reason: format!("body is not JSON: {e}"),
            }),
            Err(e) => Err(GeocodeError::Http(e)),
        }
    }
}

/// Classifies a Nominatim `jsonv2` search response.
///
/// An empty array is [`GeocodeResponse::ZeroResults`]. Anything that is
/// not an array, or whose first entry lacks parseable `lat`/`lon`, is
/// [`GeocodeResponse::Malformed`]. The OSM `type` of the match stands in
/// for the location type.
#[must_use]
pub fn classify_response(body: &serde_json::Value, detail: OutputDetail) -> GeocodeResponse {
    let Some(results) = body.as_array() else {
        return GeocodeResponse::Malformed {
            reason: "Nominatim response is not an array".to_string(),
        };
    };

    let Some(first) = results.first() else {
        return GeocodeResponse::ZeroResults;
    };

    let coord = |field: &str| {
        first
            .get(field)
            .and_then(serde_json::Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
    };

    let (Some(latitude), Some(longitude)) = (coord("lat"), coord("lon")) else {
        return GeocodeResponse::Malformed {
            reason: "Missing lat/lon in Nominatim response".to_string(),
        };
    };

    let text = |field: &str| match detail {
        OutputDetail::Coordinates => None,
        OutputDetail::All => first
            .get(field)
            .and_then(serde_json::Value::as_str)
            .map(String::from),
    };

    GeocodeResponse::Success(GeocodeMatch {
        status: None,
        latitude,
        longitude,
        formatted_address: text("display_name"),
        location_type: text("type"),
        distinct_results: results.len(),
    })
}
