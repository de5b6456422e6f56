use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize)]
pub enum AppError {
    Internal(String),
    NotFound(String),
    ValidationError(String),
    ConfigError(String),
    DatabaseError(String),
    IoError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<SinkError> for AppError {
    fn from(err: SinkError) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Why a sink connection could not be established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionFailure {
    Network,
    Authentication,
    MissingDatabase,
    Other,
}

impl ConnectionFailure {
    /// Operator-facing hint logged next to the raw driver message.
    pub fn hint(&self) -> &'static str {
        match self {
            ConnectionFailure::Network => {
                "Check that the server name is correct and the server is reachable."
            }
            ConnectionFailure::Authentication => {
                "Authentication failed. Check user/password or the trusted authentication setup."
            }
            ConnectionFailure::MissingDatabase => {
                "The requested database could not be opened. Check that it exists and the login may use it."
            }
            ConnectionFailure::Other => "Unexpected connection failure.",
        }
    }
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionFailure::Network => "network",
            ConnectionFailure::Authentication => "authentication",
            ConnectionFailure::MissingDatabase => "missing database",
            ConnectionFailure::Other => "other",
        };
        f.write_str(name)
    }
}

/// Failure reported by a relational sink.
///
/// Callers branch on the variant, never on the message text.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("connection failed ({kind}): {message}")]
    Connection {
        kind: ConnectionFailure,
        message: String,
    },
    #[error("schema does not exist: {0}")]
    SchemaMissing(String),
    #[error("statement failed: {0}")]
    Statement(String),
}
