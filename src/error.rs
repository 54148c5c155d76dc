//! Error types for the affordability pipeline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Header text that marks a Git-LFS pointer stub instead of real data.
pub const LFS_POINTER_MARKER: &str = "version https://git-lfs.github.com/spec/v1";

/// Coarse failure classes surfaced to dashboard callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing, unreadable or corrupt source data
    Source,
    /// Expected columns absent
    Schema,
    /// Nothing left after filtering
    Empty,
    /// No year-1 data to compute a change against
    NoPriorYear,
    Config,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("no data source found (tried: {0})")]
    SourceMissing(String),

    #[error("{0} is a Git LFS pointer file, not the dataset; run `git lfs pull` or download the CSV")]
    LfsPointer(String),

    #[error("{0} is empty")]
    EmptyFile(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("missing required columns [{missing}]; available columns: [{available}]")]
    SchemaMismatch { missing: String, available: String },

    #[error("no data available {0}")]
    EmptyAfterFilter(String),

    #[error("no prior-year data for {0}")]
    NoPriorYear(u32),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SourceMissing(_)
            | Error::LfsPointer(_)
            | Error::EmptyFile(_)
            | Error::Csv(_)
            | Error::Io(_)
            | Error::Http(_) => ErrorKind::Source,
            Error::SchemaMismatch { .. } => ErrorKind::Schema,
            Error::EmptyAfterFilter(_) => ErrorKind::Empty,
            Error::NoPriorYear(_) => ErrorKind::NoPriorYear,
            Error::Config(_) | Error::ConfigParse(_) => ErrorKind::Config,
        }
    }
}
