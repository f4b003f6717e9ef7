//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed storage error kept as the `source` of [`Error::Database`]
pub type StorageError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core library error type
///
/// Storage failures are wrapped in [`Error::Database`]: the message only
/// carries our own context string, the underlying error stays reachable
/// through `source()` for diagnostics.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Investment not found: {0}")]
    InvestmentNotFound(String),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Transaction not found: {0}")]
    MovementNotFound(String),

    #[error("Resource does not belong to user: {0}")]
    ResourceNotOwned(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {context}")]
    Database {
        context: String,
        #[source]
        source: StorageError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Wrap a storage failure with a caller-safe context message
    pub fn database(context: impl Into<String>, source: impl Into<StorageError>) -> Self {
        Self::Database {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Stable machine-readable code, for boundary layers mapping errors to
    /// their own status codes
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::UserNotFound(_) => "USER_NOT_FOUND",
            Error::InvestmentNotFound(_) => "INVESTMENT_NOT_FOUND",
            Error::CategoryNotFound(_) => "CATEGORY_NOT_FOUND",
            Error::MovementNotFound(_) => "TRANSACTION_NOT_FOUND",
            Error::ResourceNotOwned(_) => "RESOURCE_NOT_OWNED",
            Error::Conflict(_) => "CONFLICT",
            Error::Database { .. } => "DATABASE_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
        }
    }

    /// True for the not-found family (user, investment, category, movement)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::UserNotFound(_)
                | Error::InvestmentNotFound(_)
                | Error::CategoryNotFound(_)
                | Error::MovementNotFound(_)
        )
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::database("storage operation failed", err)
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result from a core error, keeping its code in the context
    pub fn from_error(error: &Error) -> Self {
        let mut context = HashMap::new();
        context.insert(
            "code".to_string(),
            serde_json::Value::String(error.code().to_string()),
        );
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            context: Some(context),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::from_error(&e),
        }
    }
}
