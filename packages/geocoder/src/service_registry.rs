//! Compile-time registry of geocoding service configurations.
//!
//! Each geocoding provider is defined in a TOML file under `services/`
//! with a `[provider]` table (endpoint and credentials) and a `[quota]`
//! table (daily budget, batching, pacing). The registry embeds these at
//! compile time and exposes them via [`all_services`] and
//! [`enabled_services`].

use serde::Deserialize;

use crate::google::GoogleGeocoder;
use crate::nominatim::NominatimGeocoder;
use crate::quota::QuotaConfig;
use crate::{GeocodeError, Geocoder, OutputDetail};

/// A geocoding service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"google"`, `"nominatim"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service may be selected.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Selection order; the lowest enabled priority is the default.
    pub priority: u32,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
    /// Request budget and pacing.
    pub quota: QuotaConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Google Maps Geocoding API.
    Google {
        /// Endpoint URL.
        base_url: String,
        /// Environment variable holding the API key.
        api_key_env: String,
        /// Optional region bias (ccTLD code).
        #[serde(default)]
        region: Option<String>,
    },
    /// Nominatim / `OpenStreetMap` geocoder.
    Nominatim {
        /// Endpoint URL (e.g., `"https://nominatim.openstreetmap.org/search"`).
        base_url: String,
        /// Identifying `User-Agent` required by the usage policy.
        user_agent: String,
    },
}

const fn default_true() -> bool {
    true
}

impl GeocodingService {
    /// Returns the provider's base URL regardless of variant.
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::Google { base_url, .. } | ProviderConfig::Nominatim { base_url, .. } => {
                base_url
            }
        }
    }
}

const SERVICE_TOMLS: &[(&str, &str)] = &[
    ("google", include_str!("../services/google.toml")),
    ("nominatim", include_str!("../services/nominatim.toml")),
];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 2;

/// Returns all geocoding service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse geocoding service '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled services, sorted by priority (ascending).
#[must_use]
pub fn enabled_services() -> Vec<GeocodingService> {
    let mut services: Vec<GeocodingService> =
        all_services().into_iter().filter(|s| s.enabled).collect();
    services.sort_by_key(|s| s.priority);
    services
}

/// Looks up a service by id, or the highest-priority enabled service when
/// `id` is `None`.
///
/// # Errors
///
/// Returns [`GeocodeError::Config`] if the id is unknown or no service is
/// enabled.
pub fn find_service(id: Option<&str>) -> Result<GeocodingService, GeocodeError> {
    match id {
        Some(id) => all_services()
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| GeocodeError::Config {
                message: format!("unknown geocoding service '{id}'"),
            }),
        None => enabled_services()
            .into_iter()
            .next()
            .ok_or_else(|| GeocodeError::Config {
                message: "no geocoding service is enabled".to_string(),
            }),
    }
}

/// Constructs the client for `service`.
///
/// # Errors
///
/// Returns [`GeocodeError::Config`] if a required API key is not set in
/// the environment.
pub fn build_geocoder(
    service: &GeocodingService,
    client: reqwest::Client,
    detail: OutputDetail,
) -> Result<Box<dyn Geocoder>, GeocodeError> {
    match &service.provider {
        ProviderConfig::Google {
            base_url,
            api_key_env,
            region,
        } => {
            let api_key = std::env::var(api_key_env)
                .ok()
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| GeocodeError::Config {
                    message: format!("{} requires an API key in ${api_key_env}", service.name),
                })?;
            Ok(Box::new(
                GoogleGeocoder::new(client, base_url, &api_key)
                    .with_region(region.clone())
                    .with_detail(detail),
            ))
        }
        ProviderConfig::Nominatim {
            base_url,
            user_agent,
        } => Ok(Box::new(
            NominatimGeocoder::new(client, base_url, user_agent).with_detail(detail),
        )),
    }
}
