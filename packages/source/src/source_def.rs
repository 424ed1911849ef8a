//! TOML-driven source definitions.
//!
//! Each crime data source is fully described by a TOML file: where its
//! `GeoJSON` lives, which attributes carry the block number and street
//! name, and the locality appended to every geocoding query.

use serde::Deserialize;

use crate::address::DEFAULT_LOCALITY;

/// A crime data source parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDefinition {
    /// Unique identifier (e.g., `"charlottesville"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// `GeoJSON` feature collection endpoint.
    pub url: String,
    /// City/region suffix appended to every address.
    #[serde(default = "default_locality")]
    pub locality: String,
    /// Attribute names used to build addresses.
    pub fields: FieldMapping,
}

/// Names of the feature attributes holding the address components.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    /// Attribute with the hundred-block number.
    pub block_number: String,
    /// Attribute with the street name.
    pub street_name: String,
}

fn default_locality() -> String {
    DEFAULT_LOCALITY.to_string()
}

impl SourceDefinition {
    /// Returns the source identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the human-readable source name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Parses a TOML string into a [`SourceDefinition`].
///
/// # Errors
///
/// Returns an error string if the TOML is malformed or missing required
/// fields.
pub fn parse_source_toml(toml_str: &str) -> Result<SourceDefinition, String> {
    toml::de::from_str(toml_str).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_locality_when_omitted() {
        let def = parse_source_toml(
            r#"
            id = "test"
            name = "Test"
            url = "https://example.com/crimes.geojson"

            [fields]
            block_number = "Block"
            street_name = "Street"
            "#,
        )
        .unwrap();
        assert_eq!(def.locality, DEFAULT_LOCALITY);
        assert_eq!(def.fields.block_number, "Block");
    }

    #[test]
    fn rejects_missing_fields_table() {
        let result = parse_source_toml(
            r#"
            id = "test"
            name = "Test"
            url = "https://example.com/crimes.geojson"
            "#,
        );
        assert!(result.is_err());
    }
}
