//! Scripted travel-time provider for tests and offline runs.
//!
//! Responses are served in order; once the script runs out the last
//! response repeats. Every call is counted, which lets timer tests assert
//! how many times a route actually fired.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::monitor::error::ProviderError;
use crate::monitor::provider::{ProviderResult, TravelTimeProvider};
use crate::monitor::types::TravelTime;

#[derive(Debug, Clone, Copy)]
enum Scripted {
    Minutes(i64),
    Unavailable,
}

#[derive(Debug, Default)]
pub struct MockTravelTimeProvider {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    calls: AtomicUsize,
}

impl MockTravelTimeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve these durations (minutes) in order.
    pub fn with_times(self, minutes: impl IntoIterator<Item = i64>) -> Self {
        self.lock_script()
            .extend(minutes.into_iter().map(Scripted::Minutes));
        self
    }

    /// Queue a failing response.
    pub fn with_failure(self) -> Self {
        self.lock_script().push_back(Scripted::Unavailable);
        self
    }

    /// Number of `fetch_travel_time` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Scripted>> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_response(&self) -> Option<Scripted> {
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(next) = self.lock_script().pop_front() {
            *last = Some(next);
        }
        *last
    }
}

#[async_trait]
impl TravelTimeProvider for MockTravelTimeProvider {
    async fn fetch_travel_time(
        &self,
        _source: &str,
        _destination: &str,
        _api_key: &str,
    ) -> ProviderResult<TravelTime> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.next_response() {
            Some(Scripted::Minutes(minutes)) => Ok(TravelTime {
                duration_minutes: minutes,
                duration_text: format!("{} mins", minutes),
                distance_text: "10 km".to_string(),
            }),
            Some(Scripted::Unavailable) | None => Err(ProviderError::ServiceUnavailable),
        }
    }

    fn provider_name(&self) -> &str {
        "Mock"
    }
}
