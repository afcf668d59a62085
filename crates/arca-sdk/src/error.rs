use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error(transparent)]
    Engine(#[from] arca_engine::EngineError),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<arca_archive::ArchiveError> for SdkError {
    fn from(e: arca_archive::ArchiveError) -> Self {
        Self::Engine(e.into())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
