use std::{fmt::Display, io};

use thiserror::Error;

/// Standardized application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
    #[error("Invalid JSON payload: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Uuid parse error: {0}")]
    UuidParseError(#[from] uuid::Error),

    #[error("Not found: {0}")]
    NotFoundError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl AppError {
    /// Create a new not found error
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Display) -> Self {
        Self::NotFoundError(format!(
            "{} with ID {} not found",
            entity_type.into(),
            entity_id
        ))
    }

    /// Create a new validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError(message.into())
    }
}

pub type Result<T, E = AppError> = core::result::Result<T, E>;
