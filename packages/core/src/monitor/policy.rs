//! Notification policy: maps a delta and the user's preference to an
//! emit/suppress decision, and renders the message text.

use crate::monitor::types::{NotificationDecision, NotificationKind, NotificationPreference, Settings};

/// Minimum absolute change (minutes) for the `significant` preference.
pub const SIGNIFICANT_CHANGE_MINUTES: i64 = 5;

/// Decide whether a measurement with the given `change` should notify.
///
/// A `None` change marks the first measurement for a route and is always
/// emitted, whatever the settings say.
pub fn decide(change: Option<i64>, settings: &Settings) -> NotificationDecision {
    let Some(change) = change else {
        return NotificationDecision {
            kind: NotificationKind::New,
            should_emit: true,
        };
    };

    let kind = match change {
        c if c > 0 => NotificationKind::Increase,
        c if c < 0 => NotificationKind::Decrease,
        _ => NotificationKind::Unchanged,
    };

    let wanted = match settings.notification_type {
        NotificationPreference::All => true,
        NotificationPreference::Significant => change.abs() >= SIGNIFICANT_CHANGE_MINUTES,
        NotificationPreference::Increase => change > 0,
    };

    NotificationDecision {
        kind,
        should_emit: settings.enable_notifications && wanted,
    }
}

/// Render the user-visible message for a notification.
///
/// The route name is always included in full.
pub fn message(route_name: &str, travel_time: i64, kind: NotificationKind, change: Option<i64>) -> String {
    match (kind, change) {
        (NotificationKind::Increase, Some(delta)) => format!(
            "Travel time for {} increased by {:+} min to {} min",
            route_name, delta, travel_time
        ),
        (NotificationKind::Decrease, Some(delta)) => format!(
            "Travel time for {} decreased by {:+} min to {} min",
            route_name, delta, travel_time
        ),
        (NotificationKind::Unchanged, _) => format!(
            "Travel time for {} unchanged at {} min",
            route_name, travel_time
        ),
        _ => format!(
            "Started monitoring {}: current travel time is {} min",
            route_name, travel_time
        ),
    }
}
