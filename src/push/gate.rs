use chrono::{NaiveTime, Timelike};

use crate::errors::{EngineError, Result};
use crate::models::{NotificationPreferences, NotificationType};

/// Decides whether a push notification should be surfaced. Pure; called
/// once per candidate notification before the platform display call.
///
/// Order of checks: global push toggle, per-type toggle, quiet hours.
/// A malformed quiet-hours window never suppresses delivery.
pub fn should_deliver(
    kind: NotificationType,
    preferences: &NotificationPreferences,
    now: NaiveTime,
) -> bool {
    if !preferences.push_enabled || !preferences.type_enabled(kind) {
        return false;
    }
    if !preferences.quiet_hours_enabled {
        return true;
    }
    match quiet_window_active(
        &preferences.quiet_hours_start,
        &preferences.quiet_hours_end,
        now,
    ) {
        Ok(active) => !active,
        Err(_) => true,
    }
}

/// Whether `now` falls inside the quiet window. Both boundaries are
/// inclusive. A window with `start > end` crosses midnight: active when
/// `now >= start` or `now <= end`.
pub fn quiet_window_active(start: &str, end: &str, now: NaiveTime) -> Result<bool> {
    let start = parse_clock(start)?;
    let end = parse_clock(end)?;
    let current = now.hour() * 60 + now.minute();

    Ok(if start <= end {
        start <= current && current <= end
    } else {
        current >= start || current <= end
    })
}

/// Parses "HH:MM" into minutes since midnight.
fn parse_clock(s: &str) -> Result<u32> {
    let bad = || EngineError::BadClockTime(s.to_string());

    let (hours, minutes) = s.split_once(':').ok_or_else(bad)?;
    let hours: u32 = hours.parse().map_err(|_| bad())?;
    let minutes: u32 = minutes.parse().map_err(|_| bad())?;
    if hours > 23 || minutes > 59 {
        return Err(bad());
    }
    Ok(hours * 60 + minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn prefs_with_quiet(start: &str, end: &str) -> NotificationPreferences {
        let mut prefs = NotificationPreferences::defaults_for(Uuid::new_v4());
        prefs.push_enabled = true;
        prefs.quiet_hours_enabled = true;
        prefs.quiet_hours_start = start.to_string();
        prefs.quiet_hours_end = end.to_string();
        prefs
    }

    #[test]
    fn test_wrapping_window_22_to_08() {
        let w = |h, m| quiet_window_active("22:00", "08:00", at(h, m)).unwrap();
        assert!(w(23, 30)); // inside, before midnight
        assert!(!w(9, 0)); // outside
        assert!(w(7, 59)); // inside, after midnight
        assert!(w(8, 0)); // boundary inclusive
        assert!(!w(8, 1)); // just past the boundary
        assert!(w(22, 0)); // start boundary inclusive
        assert!(!w(21, 59));
    }

    #[test]
    fn test_same_day_window() {
        let w = |h, m| quiet_window_active("12:00", "14:00", at(h, m)).unwrap();
        assert!(w(12, 0));
        assert!(w(13, 0));
        assert!(w(14, 0));
        assert!(!w(11, 59));
        assert!(!w(14, 1));
    }

    #[test]
    fn test_malformed_clock_rejected() {
        assert!(parse_clock("2400").is_err());
        assert!(parse_clock("24:00").is_err());
        assert!(parse_clock("12:60").is_err());
        assert!(parse_clock("ab:cd").is_err());
        assert_eq!(parse_clock("00:00").unwrap(), 0);
        assert_eq!(parse_clock("23:59").unwrap(), 23 * 60 + 59);
    }

    #[test]
    fn test_gate_respects_global_toggle() {
        let mut prefs = NotificationPreferences::defaults_for(Uuid::new_v4());
        prefs.push_enabled = false;
        assert!(!should_deliver(
            NotificationType::NewsPublished,
            &prefs,
            at(12, 0)
        ));
    }

    #[test]
    fn test_gate_respects_type_toggle() {
        let mut prefs = NotificationPreferences::defaults_for(Uuid::new_v4());
        prefs.push_enabled = true;
        prefs
            .types
            .insert(NotificationType::CommentNew, false);
        assert!(!should_deliver(NotificationType::CommentNew, &prefs, at(12, 0)));
        assert!(should_deliver(
            NotificationType::NewsPublished,
            &prefs,
            at(12, 0)
        ));
    }

    #[test]
    fn test_gate_suppresses_inside_quiet_hours() {
        let prefs = prefs_with_quiet("22:00", "08:00");
        assert!(!should_deliver(
            NotificationType::NewsPublished,
            &prefs,
            at(23, 30)
        ));
        assert!(should_deliver(
            NotificationType::NewsPublished,
            &prefs,
            at(9, 0)
        ));
    }

    #[test]
    fn test_gate_delivers_on_malformed_window() {
        let prefs = prefs_with_quiet("25:00", "08:00");
        assert!(should_deliver(
            NotificationType::NewsPublished,
            &prefs,
            at(23, 30)
        ));
    }
}
