//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid repository path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to parse configuration: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not determine {what} directory")]
    DirectoryUnavailable { what: &'static str },
}

pub type Result<T> = std::result::Result<T, CoreError>;
