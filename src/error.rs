use crate::placement::OverrideList;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed document at byte {position}: {message}")]
    Parse { message: String, position: u64 },

    #[error("table is missing required column(s): {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("{list} override '{name}' does not match any record")]
    UnknownRecord { name: String, list: OverrideList },

    #[error("'{name}' is listed as both upward and downward")]
    ConflictingOverride { name: String },

    #[error("source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("render failed: {0}")]
    Render(String),
}

impl Error {
    /// Maps an I/O failure on `path`, turning `NotFound` into [`Error::SourceNotFound`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::SourceNotFound { path }
        } else {
            Error::Io { path, source }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
