//! Geocoding query construction.

use cville_crime_models::BlockNumber;

/// Locality appended to every Charlottesville address.
pub const DEFAULT_LOCALITY: &str = "Charlottesville VA";

/// Joins block, street, and locality with single spaces.
///
/// `build_address(100, "AVON ST", "Charlottesville VA")` yields
/// `"100 AVON ST Charlottesville VA"`. The inputs are expected to be
/// normalized already; nothing is trimmed or collapsed here.
#[must_use]
pub fn build_address(block: BlockNumber, street: &str, locality: &str) -> String {
    format!("{block} {street} {locality}")
}
