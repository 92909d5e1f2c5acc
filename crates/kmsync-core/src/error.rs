use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KmsyncError {
    #[error("a session is already active for this root")]
    SessionAlreadyActive,

    #[error("no active session for this root")]
    NoActiveSession,

    #[error("checkpoint not found: {id}")]
    CheckpointNotFound { id: String },

    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    #[error("missing CAS object {hash}")]
    MissingCasObject { hash: String },

    #[error("missing delta object {hash}")]
    MissingDeltaObject { hash: String },

    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("restore verification failed for {paths:?}")]
    RestoreVerifyFailed { paths: Vec<PathBuf> },

    #[error("corrupt manifest for checkpoint {checkpoint_id}")]
    CorruptManifest { checkpoint_id: String },

    #[error("metadata is missing the 'provider' key")]
    MissingProvider,

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("wildcard pattern not found: {pattern}")]
    WildcardPatternNotFound { pattern: String },

    #[error("lock held by another process (pid {pid})")]
    LockHeld { pid: u32 },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config key not found: {key}")]
    ConfigKeyNotFound { key: String },
}

pub type Result<T> = std::result::Result<T, KmsyncError>;

impl KmsyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SessionAlreadyActive => 2,
            Self::NoActiveSession => 3,
            Self::CheckpointNotFound { .. } => 4,
            Self::SessionNotFound { .. } => 5,
            Self::MissingCasObject { .. } => 6,
            Self::MissingDeltaObject { .. } => 7,
            Self::HashMismatch { .. } => 8,
            Self::RestoreVerifyFailed { .. } => 9,
            Self::CorruptManifest { .. } => 10,
            Self::MissingProvider => 11,
            Self::InvalidArgument { .. } => 12,
            Self::Cancelled => 13,
            Self::IoError { .. } => 14,
            Self::WildcardPatternNotFound { .. } => 15,
            Self::LockHeld { .. } => 16,
            Self::ConfigKeyNotFound { .. } => 17,
            _ => 1,
        }
    }
}
