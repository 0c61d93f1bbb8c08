//! Route Monitoring Module
//!
//! Periodically re-measures travel times for user-defined routes, folds
//! each measurement into running statistics, and decides whether the
//! change is worth a notification.

pub mod aggregator;
pub mod checker;
pub mod error;
pub mod policy;
pub mod provider;
pub mod service;
pub mod types;


pub use checker::RouteChecker;
pub use error::{MonitorError, ProviderError, StoreError};
pub use provider::TravelTimeProvider;
pub use service::RouteMonitor;
pub use types::*;
