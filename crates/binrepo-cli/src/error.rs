//! CLI error types with exit code handling
//!
//! Library errors are mapped onto a single diagnostic type carrying the
//! exit code the process ends with.

use binrepo_core::CoreError;
use binrepo_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// The configuration document is invalid
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(binrepo::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Warnings were reported and strict mode is on
    #[error("Configuration has {warnings} warning(s)")]
    #[diagnostic(
        code(binrepo::cli::warnings),
        help("fix the reported virtual repository members or drop --strict")
    )]
    Warnings { warnings: usize },

    /// Unknown repository or item
    #[error("{message}")]
    #[diagnostic(code(binrepo::cli::not_found))]
    NotFound {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Writes to the path are rejected
    #[error("{message}")]
    #[diagnostic(code(binrepo::cli::not_deployable))]
    NotDeployable { message: String },

    /// The user supplied invalid input
    #[error("{message}")]
    #[diagnostic(code(binrepo::cli::usage))]
    Usage { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(binrepo::cli::io))]
    Io {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(binrepo::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } | CliError::Warnings { .. } => exit_codes::CONFIG_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::NotDeployable { .. } => exit_codes::NOT_DEPLOYABLE,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Create a not-found error with help text
    pub fn not_found_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => CliError::Io {
                message: e.to_string(),
                help: Some("pass --config <FILE> or --root <DIR>".to_string()),
            },
            CoreError::InvalidPath { .. } => CliError::usage(err.to_string()),
            CoreError::YamlParse(_) | CoreError::InvalidConfig { .. } => CliError::Config {
                message: err.to_string(),
                help: None,
            },
            CoreError::DirectoryUnavailable { .. } => CliError::Internal {
                message: err.to_string(),
            },
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Core(e) => e.into(),
            RepoError::DuplicateKey { .. } | RepoError::InvalidConfig { .. } => CliError::Config {
                message: err.to_string(),
                help: None,
            },
            RepoError::UnknownMember { .. } => CliError::Config {
                message: err.to_string(),
                help: Some("every virtual member must name a configured repository".to_string()),
            },
            RepoError::RepositoryNotFound { .. } | RepoError::ItemNotFound { .. } => {
                CliError::NotFound {
                    message: err.to_string(),
                    help: None,
                }
            }
            RepoError::NotDeployable { .. } => CliError::NotDeployable {
                message: err.to_string(),
            },
            other => CliError::Internal {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
