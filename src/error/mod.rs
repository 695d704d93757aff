use thiserror::Error;

use crate::storage::CellFailure;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Reasoning client errors, split into transient and permanent classes.
///
/// Transient errors are retried by the resilient caller; permanent errors
/// (bad credentials, malformed requests) abort the call immediately.
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ReasoningError {
    /// Whether this failure class is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ReasoningError::RateLimited { .. }
            | ReasoningError::Timeout { .. }
            | ReasoningError::EmptyResponse
            | ReasoningError::Http(_) => true,
            ReasoningError::Api { status, .. } => *status >= 500,
            ReasoningError::InvalidCredentials { .. } => false,
        }
    }
}

/// Raised by stage parsers when the model returned non-conforming text.
///
/// Internal to the retry boundary: it never escapes the resilient caller
/// except folded into a [`ResilientCallFailure`] after retries exhaust.
#[derive(Debug, Clone, Error)]
#[error("Parse error: {message}")]
pub struct ParseError {
    /// What was wrong with the raw text.
    pub message: String,
}

impl ParseError {
    /// Create a parse error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::new(format!("invalid JSON: {}", err))
    }
}

/// Terminal failure of a resilient call after bounded retries.
///
/// Carries the last raw payload for diagnostics; the caller never silently
/// substitutes a default value.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' failed after {attempts} attempt(s): {last_error}")]
pub struct ResilientCallFailure {
    /// Name of the stage whose call failed.
    pub stage: String,
    /// Number of attempts made before giving up.
    pub attempts: u32,
    /// Raw text of the last model response, if one was received.
    pub last_raw: Option<String>,
    /// Description of the last error observed.
    pub last_error: String,
}

/// Pipeline and stage-level errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid profile: {message}")]
    InvalidProfile { message: String },

    #[error("Invalid decision: {message}")]
    InvalidDecision { message: String },

    #[error("Invalid timelines: {message}")]
    InvalidTimelines { message: String },

    #[error("Resilient call failed: {0}")]
    Call(#[from] ResilientCallFailure),

    #[error("Simulation failed: all {total} cells failed")]
    SimulationFailed {
        total: usize,
        failures: Vec<CellFailure>,
    },

    #[error("Insufficient scenarios: analysis requires at least one scenario")]
    InsufficientScenarios,

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Pipeline cancelled before stage '{stage}'")]
    Cancelled { stage: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for reasoning client operations
pub type ReasoningResult<T> = Result<T, ReasoningError>;

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
