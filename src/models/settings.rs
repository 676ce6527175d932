use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Shop-wide singleton. The timezone is the single civil timezone every
/// rule and slot label is interpreted in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopSettings {
    pub slot_interval_minutes: u32,
    pub default_buffer_minutes: u32,
    pub pending_confirmation_minutes: i64,
    pub cancellation_window_hours: i64,
    pub reschedule_window_hours: i64,
    pub timezone: String,
}

impl ShopSettings {
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(timezone = %self.timezone, "unknown shop timezone, falling back to UTC");
            chrono_tz::UTC
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(tz: &str) -> ShopSettings {
        ShopSettings {
            slot_interval_minutes: 30,
            default_buffer_minutes: 0,
            pending_confirmation_minutes: 30,
            cancellation_window_hours: 24,
            reschedule_window_hours: 6,
            timezone: tz.to_string(),
        }
    }

    #[test]
    fn test_parses_iana_zone() {
        assert_eq!(
            settings("America/New_York").tz(),
            chrono_tz::America::New_York
        );
    }

    #[test]
    fn test_unknown_zone_falls_back_to_utc() {
        assert_eq!(settings("Mars/Olympus_Mons").tz(), chrono_tz::UTC);
    }
}
