//! Running statistics for a route.
//!
//! The average is recomputed from the full history on every check rather
//! than maintained incrementally, so it is O(n) in the number of stored
//! measurements. Switching to a running mean would change rounding and is
//! not a drop-in replacement.

use crate::monitor::types::{Route, RouteHistory, RouteStats};

/// Fold `new_travel_time` into the route's running statistics.
///
/// `prior_history` is every history entry recorded for the route *before*
/// this measurement; the new value is included in the mean here.
pub fn aggregate(route: &Route, new_travel_time: i64, prior_history: &[RouteHistory]) -> RouteStats {
    let change = route.current_time.map(|previous| new_travel_time - previous);

    let min_time = route
        .min_time
        .map_or(new_travel_time, |min| min.min(new_travel_time));
    let max_time = route
        .max_time
        .map_or(new_travel_time, |max| max.max(new_travel_time));

    let avg_time = rounded_mean(
        prior_history
            .iter()
            .map(|entry| entry.travel_time)
            .chain(std::iter::once(new_travel_time)),
    );

    RouteStats {
        current_time: new_travel_time,
        min_time,
        max_time,
        avg_time,
        change,
    }
}

/// Arithmetic mean rounded half away from zero. Empty input yields 0.
pub fn rounded_mean(values: impl IntoIterator<Item = i64>) -> i64 {
    let (sum, count) = values
        .into_iter()
        .fold((0i128, 0i128), |(sum, count), v| (sum + v as i128, count + 1));

    if count == 0 {
        return 0;
    }

    // Integer form of round-half-away-from-zero: (2*sum ± count) / (2*count).
    let doubled = 2 * sum;
    let rounded = if doubled >= 0 {
        (doubled + count) / (2 * count)
    } else {
        (doubled - count) / (2 * count)
    };
    rounded as i64
}
