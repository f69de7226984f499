//! Error types for the Pathwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Pathwise operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- External service errors ---
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    // --- Data access errors ---
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    // --- Tool catalog / execution errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Cache errors ---
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the external classification/planning/verification/
/// reflection/formatting services and of the LLM provider beneath them.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Service not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed service output: {0}")]
    MalformedOutput(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("Dataset not loaded: {0}")]
    NotLoaded(String),

    #[error("Query failed: {operation}: {reason}")]
    QueryFailed { operation: String, reason: String },

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid arguments for {operation}: {reason}")]
    InvalidArguments { operation: String, reason: String },

    #[error("Operation not allowed for tier {tier}: {operation}")]
    NotAllowed { operation: String, tier: String },

    #[error("Operation failed: {operation}: {reason}")]
    ExecutionFailed { operation: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache store error: {0}")]
    Store(String),

    #[error("Corrupt cache entry at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Cache encoding failed: {0}")]
    Encoding(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_displays_correctly() {
        let err = Error::Service(ServiceError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::InvalidArguments {
            operation: "search_by_cip_code".into(),
            reason: "no codes given".into(),
        });
        assert!(err.to_string().contains("search_by_cip_code"));
        assert!(err.to_string().contains("no codes"));
    }

    #[test]
    fn repository_error_converts_into_top_level() {
        let err: Error = RepositoryError::NotLoaded("programs.json".into()).into();
        assert!(matches!(err, Error::Repository(_)));
    }
}
