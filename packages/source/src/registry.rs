//! Source registry: loads all source definitions from embedded TOML configs.
//!
//! Each `.toml` file in `packages/source/sources/` is baked into the binary
//! at compile time via [`include_str!`].

use crate::SourceError;
use crate::source_def::{SourceDefinition, parse_source_toml};

/// TOML configs embedded at compile time.
const SOURCE_TOMLS: &[(&str, &str)] = &[(
    "charlottesville",
    include_str!("../sources/charlottesville.toml"),
)];

/// Source used when none is requested explicitly.
pub const DEFAULT_SOURCE_ID: &str = "charlottesville";

#[cfg(test)]
const EXPECTED_SOURCE_COUNT: usize = 1;

/// Returns all configured source definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_sources() -> Vec<SourceDefinition> {
    SOURCE_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_source_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Looks up a source by id, falling back to [`DEFAULT_SOURCE_ID`].
///
/// # Errors
///
/// Returns [`SourceError::UnknownSource`] if no source has the id.
pub fn find_source(id: Option<&str>) -> Result<SourceDefinition, SourceError> {
    let id = id.unwrap_or(DEFAULT_SOURCE_ID);
    all_sources()
        .into_iter()
        .find(|s| s.id == id)
        .ok_or_else(|| SourceError::UnknownSource { id: id.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_all_sources() {
        assert_eq!(all_sources().len(), EXPECTED_SOURCE_COUNT);
    }

    #[test]
    fn all_sources_have_required_fields() {
        for source in &all_sources() {
            assert!(!source.id.is_empty(), "source id is empty");
            assert!(!source.name.is_empty(), "{}: name is empty", source.id);
            assert!(
                source.url.starts_with("https://"),
                "{}: url is not https",
                source.id
            );
            assert!(!source.locality.is_empty(), "{}: no locality", source.id);
        }
    }

    #[test]
    fn finds_default_source() {
        let source = find_source(None).unwrap();
        assert_eq!(source.id, DEFAULT_SOURCE_ID);
        assert_eq!(source.locality, "Charlottesville VA");
    }

    #[test]
    fn unknown_source_is_an_error() {
        assert!(matches!(
            find_source(Some("gotham")),
            Err(SourceError::UnknownSource { .. })
        ));
    }
}
