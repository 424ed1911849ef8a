//! Record normalization.
//!
//! Cleaning never fails: an unparseable block number is treated as
//! missing and recoded like any other missing value.

use cville_crime_models::{BlockNumber, CrimeRecord, RawCrimeRecord};

use crate::address::build_address;
use crate::source_def::SourceDefinition;

/// Parses a raw block number, yielding `None` for absent or non-numeric
/// input.
#[must_use]
pub fn parse_block_number(raw: Option<&str>) -> Option<f64> {
    raw.map(str::trim).and_then(|s| s.parse::<f64>().ok())
}

/// Trims, parses, and recodes a raw block number.
///
/// `None`, `"0"`, and anything that does not parse become 100.
#[must_use]
pub fn clean_block_number(raw: Option<&str>) -> BlockNumber {
    BlockNumber::recode(parse_block_number(raw))
}

/// Trims a raw street name. Missing names become the empty string.
#[must_use]
pub fn clean_street_name(raw: Option<&str>) -> String {
    raw.map_or_else(String::new, |s| s.trim().to_string())
}

/// Derives the location columns for one record.
#[must_use]
pub fn normalize_record(raw: &RawCrimeRecord, source: &SourceDefinition) -> CrimeRecord {
    let block_number = clean_block_number(raw.text(&source.fields.block_number).as_deref());
    let street_name = clean_street_name(raw.text(&source.fields.street_name).as_deref());
    let address = build_address(block_number, &street_name, &source.locality);

    CrimeRecord {
        properties: raw.properties.clone(),
        block_number,
        street_name,
        address,
    }
}

/// Normalizes every record, preserving order and count.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn normalize_records(raw: &[RawCrimeRecord], source: &SourceDefinition) -> Vec<CrimeRecord> {
    let records: Vec<CrimeRecord> = raw.iter().map(|r| normalize_record(r, source)).collect();

    let recoded = raw
        .iter()
        .filter(|r| {
            parse_block_number(r.text(&source.fields.block_number).as_deref())
                .is_none_or(|v| v == 0.0 || !v.is_finite())
        })
        .count();
    log::info!(
        "{}: normalized {} records ({recoded} block numbers recoded to {})",
        source.name,
        records.len(),
        BlockNumber::DEFAULT,
    );

    records
}
