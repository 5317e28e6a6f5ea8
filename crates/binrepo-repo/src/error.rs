//! Error types for repository operations

use binrepo_core::{CoreError, StatusError, codes};
use thiserror::Error;

/// Repository operation errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error("Repository not found: {key}")]
    RepositoryNotFound { key: String },

    #[error("Duplicate repository key '{key}' ({first} and {second})")]
    DuplicateKey {
        key: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("Virtual repository '{virtual_key}' references unknown repository '{member}'")]
    UnknownMember { virtual_key: String, member: String },

    #[error("Invalid repository configuration: {message}")]
    InvalidConfig { message: String },

    // ============ Resolution Errors ============
    #[error("Item not found: {path}")]
    ItemNotFound { path: String },

    #[error("Item already exists: {path}")]
    ItemExists { path: String },

    #[error("Repository '{key}' cannot accept deployments: {reason}")]
    NotDeployable { key: String, reason: String },

    // ============ Locking Errors ============
    #[error("Path {path} is locked ({holder})")]
    Locked { path: String, holder: String },

    #[error("Timed out after {waited_ms}ms waiting for lock on {path}")]
    LockTimeout { path: String, waited_ms: u64 },

    // ============ Pipeline Errors ============
    #[error("{message}")]
    Cancelled { code: i32, message: String },

    #[error(transparent)]
    Status(#[from] StatusError),

    // ============ Storage Errors ============
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Unit of work is no longer active")]
    UnitOfWorkClosed,

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    /// Lock contention can be retried by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepoError::Locked { .. } | RepoError::LockTimeout { .. })
    }

    /// Status code forwarded to callers
    pub fn status_code(&self) -> i32 {
        match self {
            RepoError::RepositoryNotFound { .. } | RepoError::ItemNotFound { .. } => {
                codes::NOT_FOUND
            }
            RepoError::ItemExists { .. } => codes::CONFLICT,
            RepoError::NotDeployable { .. } => codes::BAD_REQUEST,
            RepoError::Locked { .. } | RepoError::LockTimeout { .. } => codes::LOCKED,
            RepoError::Cancelled { code, .. } => *code,
            RepoError::Status(e) => e.code(),
            _ => codes::INTERNAL_ERROR,
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        RepoError::Storage {
            message: message.into(),
        }
    }
}
