//! Error types for the agent platform core

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for platform operations
pub type Result<T> = std::result::Result<T, AgentOpsError>;

#[derive(Error, Debug)]
pub enum AgentOpsError {

    // =============================
    // Caller Errors
    // =============================

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Agent is not active: {0}")]
    AgentNotActive(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // =============================
    // Transfer Gateway Errors
    // =============================

    #[error("Idempotency key reused with a different payload")]
    IdempotencyConflict,

    #[error("Request already in progress")]
    IdempotencyInProgress,

    #[error("Daily transaction limit reached")]
    RateLimited,

    #[error("Confirmation token rejected: {0}")]
    ConfirmationToken(String),

    // =============================
    // Pipeline Errors
    // =============================

    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("UUID parse error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentOpsError {
    /// HTTP status for the API surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AgentOpsError::Unauthorized => StatusCode::UNAUTHORIZED,
            AgentOpsError::NotFound(_) => StatusCode::NOT_FOUND,
            AgentOpsError::AgentNotActive(_) => StatusCode::FORBIDDEN,
            AgentOpsError::Validation(_)
            | AgentOpsError::InvalidPlan(_)
            | AgentOpsError::ConfirmationToken(_)
            | AgentOpsError::Uuid(_) => StatusCode::BAD_REQUEST,
            AgentOpsError::IdempotencyConflict | AgentOpsError::IdempotencyInProgress => {
                StatusCode::CONFLICT
            }
            AgentOpsError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
