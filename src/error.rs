//! Error types for dlp-conductor

use thiserror::Error;

/// Coarse error categories, stable across variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Network errors
    NetworkError,

    // Dependency errors
    MissingDependency,
    ArchiveError,

    // User errors
    InvalidConfig,

    // System errors
    FileError,
    SpawnError,
}

impl ErrorCode {
    /// Process exit status reported by the CLI
    pub fn exit_code(self) -> i32 {
        match self {
            Self::NetworkError => 3,
            Self::MissingDependency => 4,
            Self::ArchiveError => 5,
            Self::InvalidConfig => 6,
            Self::FileError => 7,
            Self::SpawnError => 8,
        }
    }
}

/// Main error type for dlp-conductor
#[derive(Error, Debug)]
pub enum DlpError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("Background task failed: {0}")]
    Join(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DlpError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Network(_) => ErrorCode::NetworkError,
            Self::MissingDependency(_) => ErrorCode::MissingDependency,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::File(_) => ErrorCode::FileError,
            Self::Spawn(_) => ErrorCode::SpawnError,
            Self::Join(_) => ErrorCode::SpawnError,
            Self::Http(_) => ErrorCode::NetworkError,
            Self::Archive(_) => ErrorCode::ArchiveError,
            Self::Json(_) => ErrorCode::InvalidConfig,
        }
    }
}

impl From<tokio::task::JoinError> for DlpError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Join(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DlpError>;
