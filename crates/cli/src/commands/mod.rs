//! Subcommand implementations.
//!
//! Each command returns its output as a string; `main` writes it to stdout.

pub mod demo_image;
pub mod eco_impact;
pub mod order_code;
pub mod price;

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file did not contain the expected JSON.
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Output could not be serialized.
    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Demo image pool: {0}")]
    DemoImage(#[from] losia_core::DemoImageError),

    #[error("Voucher {code} rejected: {reason}")]
    VoucherRejected {
        code: String,
        reason: losia_core::VoucherRejection,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Read and parse a JSON file.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CommandError> {
    let text = std::fs::read_to_string(path).map_err(|source| CommandError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CommandError::Json {
        path: path.to_path_buf(),
        source,
    })
}
