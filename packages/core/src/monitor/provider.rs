//! Travel Time Provider Interface
//!
//! Provides abstraction layer for different travel time sources

use async_trait::async_trait;

use crate::monitor::{error::ProviderError, types::TravelTime};

/// Trait for travel time providers to ensure data source independence.
///
/// Any failure (transport error, bad status, missing fields) is reported as
/// an `Err`; the checker treats every error the same way and aborts the
/// cycle without writing anything.
#[async_trait]
pub trait TravelTimeProvider {
    /// Measure the current travel time from `source` to `destination`.
    async fn fetch_travel_time(
        &self,
        source: &str,
        destination: &str,
        api_key: &str,
    ) -> ProviderResult<TravelTime>;

    /// Get the name of this provider for logging/debugging
    fn provider_name(&self) -> &str;
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;
