use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal pipeline errors
///
/// These cover malformed input, missing files, and analyzer subprocess
/// failures. Classification rejections are not errors; they are carried as
/// [`crate::Outcome::Reject`] values and aggregated into statistics.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// I/O failure on a named path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being read or written when the failure occurred
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The analyzer record stream could not be parsed
    #[error("malformed analyzer record in {}: {source}", path.display())]
    MalformedRecord {
        /// File the record stream was read from
        path: PathBuf,
        /// Underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// A `file:line:col` source location could not be parsed
    #[error("invalid source location `{0}`")]
    InvalidLocation(String),

    /// `compile_commands.json` could not be parsed
    #[error("malformed compile command in {}: {source}", path.display())]
    MalformedCompileCommand {
        /// The compilation database file
        path: PathBuf,
        /// Underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// The external analyzer could not be spawned
    #[error("failed to run analyzer `{command}`: {source}")]
    AnalyzerSpawn {
        /// The command that failed to start
        command: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The CSV report could not be written
    #[error("failed to write CSV report: {0}")]
    CsvReport(#[from] csv::Error),
}

impl TranslateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TranslateError::Io {
            path: path.into(),
            source,
        }
    }
}
