#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Crime data source definitions, fetching, and normalization.
//!
//! A source is described by a TOML file under `sources/` (see
//! [`registry`]). The [`fetch`] module downloads the source's `GeoJSON`
//! feature collection and keeps each feature's attributes; [`normalize`]
//! cleans the block number and street name; [`address`] builds the query
//! string sent to the geocoder.

pub mod address;
pub mod fetch;
pub mod normalize;
pub mod registry;
pub mod retry;
pub mod source_def;

use std::path::PathBuf;

/// Errors that can occur during data source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: reqwest::StatusCode,
        /// Requested URL.
        url: String,
    },

    /// The body was not a valid `GeoJSON` feature collection.
    #[error("GeoJSON parse error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No source with the requested id is configured.
    #[error("Unknown source: {id}")]
    UnknownSource {
        /// The requested id.
        id: String,
    },
}

/// Configuration for fetching data from a source.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Maximum number of records to keep.
    pub limit: Option<u64>,
    /// Where to write the downloaded `GeoJSON` body, if anywhere.
    pub snapshot_path: Option<PathBuf>,
    /// Retry behavior for the download.
    pub retry: retry::RetryPolicy,
}
