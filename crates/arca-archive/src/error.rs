use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error in {entry}: {source}")]
    Json {
        entry: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("archive is missing {0}")]
    MissingEntry(String),

    #[error("unsupported format version {version} in {entry}")]
    UnsupportedVersion { entry: String, version: String },

    #[error("data.json checksum mismatch: manifest says {expected}, content hashes to {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("cannot store attachment {field} of {owner}: {reason}")]
    InvalidAttachment {
        owner: String,
        field: String,
        reason: String,
    },

    #[error("invalid archive: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl ArchiveError {
    pub(crate) fn json(entry: &str, source: serde_json::Error) -> Self {
        Self::Json {
            entry: entry.to_string(),
            source,
        }
    }
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
