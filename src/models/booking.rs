use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The central mutable entity. Intervals are absolute UTC instants;
/// `end_at = start_at + service duration + effective buffer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub service_id: String,
    pub barber_id: String,
    pub client_id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: BookingStatus,
    pub confirm_token_hash: Option<String>,
    pub confirm_token_expires_at: Option<DateTime<Utc>>,
    pub manage_token_hash: Option<String>,
    pub manage_token_expires_at: Option<DateTime<Utc>>,
    pub rescheduled_at: Option<DateTime<Utc>>,
    pub original_start_at: Option<DateTime<Utc>>,
    pub original_end_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingConfirmation,
    Confirmed,
    CancelledByClient,
    CancelledByShop,
    Expired,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingConfirmation => "pending_confirmation",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::CancelledByClient => "cancelled_by_client",
            BookingStatus::CancelledByShop => "cancelled_by_shop",
            BookingStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => BookingStatus::Confirmed,
            "cancelled_by_client" => BookingStatus::CancelledByClient,
            "cancelled_by_shop" => BookingStatus::CancelledByShop,
            "expired" => BookingStatus::Expired,
            _ => BookingStatus::PendingConfirmation,
        }
    }

    /// Terminal statuses are sinks: no transition leads out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::CancelledByClient
                | BookingStatus::CancelledByShop
                | BookingStatus::Expired
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            BookingStatus::PendingConfirmation,
            BookingStatus::Confirmed,
            BookingStatus::CancelledByClient,
            BookingStatus::CancelledByShop,
            BookingStatus::Expired,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_terminal_set() {
        assert!(!BookingStatus::PendingConfirmation.is_terminal());
        assert!(!BookingStatus::Confirmed.is_terminal());
        assert!(BookingStatus::CancelledByClient.is_terminal());
        assert!(BookingStatus::CancelledByShop.is_terminal());
        assert!(BookingStatus::Expired.is_terminal());
    }
}
