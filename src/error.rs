use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Every way an import run can fail. All of them are fatal to the run.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The source file cannot be opened or read.
    #[error("cannot read source {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The XML token stream itself is broken (syntax, mismatched tags, undeclared entity).
    #[error("malformed document at byte {position}: {reason}")]
    MalformedDocument { position: usize, reason: String },

    /// A matched element could not be shaped into its record type.
    #[error("cannot decode <{element}> record #{index}: {reason}")]
    RecordDecodeFailure {
        element: &'static str,
        index: usize,
        reason: String,
    },

    /// A reading restriction names a kanji form the entry does not declare.
    #[error("{record}: restriction {restriction:?} does not match any kanji form of the entry")]
    ReferentialIntegrityFailure { record: String, restriction: String },

    #[error("schema statement #{index} failed: {statement}")]
    SchemaBootstrapFailure {
        index: usize,
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{record}: insert into {table} failed")]
    RowInsertFailure {
        table: &'static str,
        record: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Opening, committing, or configuring the storage connection failed.
    #[error("storage transaction failed")]
    Transaction(#[from] rusqlite::Error),
}

/// Failures raised while walking one matched subtree. The streaming decoder
/// lifts these into [`ImportError`] once it knows which record was being read.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{reason} (byte {position})")]
    Malformed { position: usize, reason: String },

    #[error("{0}")]
    Invalid(String),
}

impl DecodeError {
    pub fn missing(field: &str, parent: &str) -> Self {
        DecodeError::Invalid(format!("<{parent}> has no <{field}>"))
    }
}
