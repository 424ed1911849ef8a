//! `GeoJSON` feature collection fetcher.
//!
//! Downloads the source's feature collection with a single GET and keeps
//! the `properties` of every feature. Geometry is dropped; locations come
//! from geocoding the block address instead.

use std::path::Path;

use cville_crime_models::RawCrimeRecord;

use crate::source_def::SourceDefinition;
use crate::{FetchOptions, SourceError, retry};

/// Downloads and parses all records for a source.
///
/// When `options.snapshot_path` is set the raw body is written there
/// before parsing, so later runs can replay it with [`load_records`].
///
/// # Errors
///
/// Returns [`SourceError`] if the download fails, the snapshot cannot be
/// written, or the body is not a feature collection.
pub async fn fetch_records(
    client: &reqwest::Client,
    source: &SourceDefinition,
    options: &FetchOptions,
) -> Result<Vec<RawCrimeRecord>, SourceError> {
    log::info!("{}: downloading {}", source.name, source.url);
    let body = retry::send_text(&options.retry, || client.get(&source.url)).await?;
    log::info!("{}: received {} bytes", source.name, body.len());

    if let Some(path) = &options.snapshot_path {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &body)?;
        log::debug!("{}: snapshot written to {}", source.name, path.display());
    }

    let records = parse_feature_collection(&body, options.limit)?;
    log::info!("{}: {} records", source.name, records.len());
    Ok(records)
}

/// Reads records from a previously downloaded `GeoJSON` file.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be read or parsed.
pub fn load_records(path: &Path, limit: Option<u64>) -> Result<Vec<RawCrimeRecord>, SourceError> {
    let body = std::fs::read_to_string(path)?;
    let records = parse_feature_collection(&body, limit)?;
    log::info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Parses a feature collection, keeping at most `limit` features.
///
/// Features without properties become empty records rather than being
/// skipped, so the record count always matches the feature count.
///
/// # Errors
///
/// Returns [`SourceError::GeoJson`] if `body` is not a feature collection.
pub fn parse_feature_collection(
    body: &str,
    limit: Option<u64>,
) -> Result<Vec<RawCrimeRecord>, SourceError> {
    let collection: geojson::FeatureCollection = body
        .parse()
        .map_err(|e| SourceError::GeoJson(Box::new(e)))?;

    let limit = limit.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));

    Ok(collection
        .features
        .into_iter()
        .take(limit)
        .map(|feature| RawCrimeRecord::new(feature.properties.unwrap_or_default()))
        .collect())
}
