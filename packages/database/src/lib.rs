#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Files the pipeline keeps under its data directory.
//!
//! - [`geocode_cache`]: the append-only address → geocode CSV that lets
//!   later runs skip addresses already resolved.
//! - [`output`]: the geocoded crime record CSV.
//! - [`paths`]: where each file lives.

pub mod geocode_cache;
pub mod output;
pub mod paths;

/// Errors that can occur while reading or writing pipeline files.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
