//! Errors that abort a pipeline stage.
//!
//! Row-level problems that the analysis can tolerate (unparseable tokens,
//! missing join partners, unreadable stability values) never reach this type;
//! stages log them as `warn` events and carry on.

use std::path::{Path, PathBuf};

use motifstab_core::ConfigError;
use thiserror::Error;

use crate::table::TableError;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("required input not found: {0}")]
    MissingInput(PathBuf),
    #[error("no {pattern} files found in {dir}")]
    NoInputFiles { dir: PathBuf, pattern: &'static str },
    #[error("{origin}: no column matching {expected}")]
    MissingColumn { origin: String, expected: String },
    #[error("{origin}:{line}: {message}")]
    MalformedRow {
        origin: String,
        line: usize,
        message: String,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
