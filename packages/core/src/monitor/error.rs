//! Error types for route monitoring operations

use thiserror::Error;

/// Errors that can occur while checking or managing a route.
///
/// The checker never panics past its boundary; every failure comes back
/// as one of these so the scheduler's timer can log it and keep going.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Route {0} not found")]
    NotFound(i64),

    #[error("No travel time API key configured")]
    Unconfigured,

    #[error("Travel time provider failed: {0}")]
    ProviderFailure(#[from] ProviderError),

    #[error("Persistence failed: {0}")]
    PersistenceFailure(#[from] StoreError),

    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl MonitorError {
    pub fn invalid_route(message: impl Into<String>) -> Self {
        Self::InvalidRoute(message.into())
    }

    /// Short label used for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            MonitorError::NotFound(_) => "not_found",
            MonitorError::Unconfigured => "unconfigured",
            MonitorError::ProviderFailure(_) => "provider_failure",
            MonitorError::PersistenceFailure(_) => "persistence_failure",
            MonitorError::InvalidRoute(_) => "invalid_route",
            MonitorError::InvalidSettings(_) => "invalid_settings",
        }
    }
}

/// Errors from travel time providers
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Data format error: {message}")]
    FormatError { message: String },

    #[error("Authentication error: {message}")]
    AuthError { message: String },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Service unavailable")]
    ServiceUnavailable,
}

/// Errors from a [`RouteStore`](crate::store::RouteStore) backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },
}

impl StoreError {
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::CorruptRow { table, message: message.into() }
    }
}
