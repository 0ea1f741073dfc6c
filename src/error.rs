//! Error taxonomy for the counting pipeline, database format, and action tree.
//!
//! Mirrors the four-way split in the design notes: configuration errors are
//! collected and reported together before any work starts, format/IO errors
//! during a run are fatal and tear the run down, and internal errors are
//! asserted invariant violations that abort immediately.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MerylError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("no inputs supplied for action")]
    MissingInput,

    #[error("conflicting outputs: {0}")]
    ConflictingOutputs(String),

    #[error("counting action has no sequence input")]
    CountingWithoutSequenceInput,

    #[error("mer-size mismatch: expected k={expected}, got k={actual} from {source}")]
    MerSizeMismatch {
        expected: u32,
        actual: u32,
        source: String,
    },

    #[error("label-width mismatch: expected {expected}, got {actual} from {source}")]
    LabelWidthMismatch {
        expected: u32,
        actual: u32,
        source: String,
    },

    #[error("memory budget {budget_bytes} bytes is too small for any counting mode at k={k}")]
    BudgetTooSmall { budget_bytes: u64, k: u32 },

    #[error("invalid mer size {0}: must be between 1 and 64")]
    InvalidMerSize(u32),

    #[error("invalid label width {0}: must be between 0 and 64")]
    InvalidLabelWidth(u32),

    #[error("output path already exists: {0}")]
    OutputExists(PathBuf),
}

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("{path}: bad magic number (not a meryl database)")]
    BadMagic { path: PathBuf },

    #[error("{path} at bit offset {offset}: unexpected end of data")]
    PrematureEnd { path: PathBuf, offset: u64 },

    #[error(
        "{path} at bit offset {offset}: block claims {claimed} k-mers but only {available} remain"
    )]
    BlockOverrun {
        path: PathBuf,
        offset: u64,
        claimed: u64,
        available: u64,
    },

    #[error("{path} at bit offset {offset}: value {value} exceeds declared width {width} bits")]
    ValueTooWide {
        path: PathBuf,
        offset: u64,
        value: u64,
        width: u32,
    },

    #[error("{path}: unknown k-mer coding type {0}", .coding_type)]
    UnknownKmerCoding { path: PathBuf, coding_type: u8 },

    #[error("{path}: unknown count coding type {0}", .coding_type)]
    UnknownCountCoding { path: PathBuf, coding_type: u8 },
}

pub type Result<T> = std::result::Result<T, MerylError>;

impl MerylError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MerylError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        MerylError::Internal(msg.into())
    }
}
