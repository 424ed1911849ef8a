//! Geocoded crime record CSV.
//!
//! Columns are the sorted union of every record's property keys followed by
//! the derived and geocode columns in [`DERIVED_COLUMNS`]. A property whose
//! key collides with a derived column is dropped in favor of the derived
//! value.

use std::collections::BTreeSet;
use std::path::Path;

use cville_crime_models::GeocodedCrimeRecord;

use crate::DbError;

/// Columns written after the source properties, in order.
pub const DERIVED_COLUMNS: &[&str] = &[
    "block_number",
    "street_name",
    "address",
    "latitude",
    "longitude",
    "formatted_address",
    "location_type",
];

/// Returns the header row for `records`.
#[must_use]
pub fn columns(records: &[GeocodedCrimeRecord]) -> Vec<String> {
    let property_keys: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.record.properties.keys())
        .map(String::as_str)
        .filter(|key| !DERIVED_COLUMNS.contains(key))
        .collect();

    property_keys
        .into_iter()
        .chain(DERIVED_COLUMNS.iter().copied())
        .map(String::from)
        .collect()
}

/// Renders a property value as a CSV cell.
fn cell(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn row(record: &GeocodedCrimeRecord, property_keys: &[String]) -> Vec<String> {
    let crime = &record.record;
    let geocode = &record.geocode;

    property_keys
        .iter()
        .map(|key| cell(crime.properties.get(key)))
        .chain([
            crime.block_number.to_string(),
            crime.street_name.clone(),
            crime.address.clone(),
            optional(geocode.latitude),
            optional(geocode.longitude),
            optional(geocode.formatted_address.as_deref()),
            optional(geocode.location_type.as_deref()),
        ])
        .collect()
}

/// Writes `records` to `path`, replacing any existing file, and returns the
/// number of rows written.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be created or written.
pub fn write_geocoded(path: &Path, records: &[GeocodedCrimeRecord]) -> Result<usize, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let header = columns(records);
    let property_keys = &header[..header.len() - DERIVED_COLUMNS.len()];

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&header)?;
    for record in records {
        writer.write_record(row(record, property_keys))?;
    }
    writer.flush()?;

    log::info!(
        "Wrote {} geocoded records ({} columns) to {}",
        records.len(),
        header.len(),
        path.display()
    );
    Ok(records.len())
}
