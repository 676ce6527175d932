pub mod email;

use async_trait::async_trait;

use crate::models::Booking;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Dev-mode stand-in used when no email API is configured: messages go to
/// the log instead of the wire.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(to = %to, subject = %subject, body = %body, "notification (log only)");
        Ok(())
    }
}

// ── Message templates ──
//
// Builders return (subject, body). The caller supplies local-time labels so
// clients always read shop wall-clock times.

pub fn confirmation_requested(
    booking: &Booking,
    when_local: &str,
    confirm_token: &str,
    base_url: &str,
) -> (String, String) {
    let subject = "Please confirm your appointment".to_string();
    let body = format!(
        "Hi {name},\n\n\
         Your appointment on {when_local} is held for you, but it is not \
         confirmed yet.\n\n\
         Confirm it here:\n{base_url}/confirm?token={confirm_token}\n\n\
         If you don't confirm in time the slot will be released.",
        name = booking.full_name,
    );
    (subject, body)
}

pub fn booking_confirmed(
    booking: &Booking,
    when_local: &str,
    manage_token: &str,
    base_url: &str,
) -> (String, String) {
    let subject = "Your appointment is confirmed".to_string();
    let body = format!(
        "Hi {name},\n\n\
         You're booked for {when_local}.\n\n\
         Need to change something?\n\
         Reschedule: {base_url}/reschedule?token={manage_token}\n\
         Cancel: {base_url}/cancel?token={manage_token}",
        name = booking.full_name,
    );
    (subject, body)
}

pub fn cancelled_by_shop(
    booking: &Booking,
    when_local: &str,
    reason: Option<&str>,
) -> (String, String) {
    let subject = "Your appointment was cancelled".to_string();
    let reason_line = match reason {
        Some(r) => format!("\n\nReason: {r}"),
        None => String::new(),
    };
    let body = format!(
        "Hi {name},\n\n\
         We're sorry: the shop had to cancel your appointment on \
         {when_local}.{reason_line}\n\n\
         Please book a new time whenever suits you.",
        name = booking.full_name,
    );
    (subject, body)
}

pub fn rescheduled(
    booking: &Booking,
    previous_local: &str,
    new_local: &str,
) -> (String, String) {
    let subject = "Your appointment was rescheduled".to_string();
    let body = format!(
        "Hi {name},\n\n\
         Your appointment has moved from {previous_local} to {new_local}.\n\n\
         Your existing manage links keep working.",
        name = booking.full_name,
    );
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus;
    use chrono::Utc;

    fn booking() -> Booking {
        let now = Utc::now();
        Booking {
            id: "bk-1".to_string(),
            service_id: "svc-1".to_string(),
            barber_id: "barber-1".to_string(),
            client_id: "client-1".to_string(),
            full_name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            phone: None,
            start_at: now,
            end_at: now,
            status: BookingStatus::PendingConfirmation,
            confirm_token_hash: None,
            confirm_token_expires_at: None,
            manage_token_hash: None,
            manage_token_expires_at: None,
            rescheduled_at: None,
            original_start_at: None,
            original_end_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_confirmation_requested_contains_link() {
        let (subject, body) = confirmation_requested(
            &booking(),
            "2026-02-24 10:00",
            "tok123",
            "https://shop.example",
        );
        assert!(subject.contains("confirm"));
        assert!(body.contains("https://shop.example/confirm?token=tok123"));
        assert!(body.contains("2026-02-24 10:00"));
        assert!(body.contains("Alice"));
    }

    #[test]
    fn test_confirmed_contains_manage_links() {
        let (_, body) =
            booking_confirmed(&booking(), "2026-02-24 10:00", "tok456", "https://shop.example");
        assert!(body.contains("reschedule?token=tok456"));
        assert!(body.contains("cancel?token=tok456"));
    }

    #[test]
    fn test_rescheduled_mentions_previous_time() {
        let (_, body) = rescheduled(&booking(), "2026-02-24 10:00", "2026-02-24 11:00");
        assert!(body.contains("2026-02-24 10:00"));
        assert!(body.contains("2026-02-24 11:00"));
    }

    #[test]
    fn test_shop_cancel_reason_is_optional() {
        let (_, with) = cancelled_by_shop(&booking(), "2026-02-24 10:00", Some("barber ill"));
        assert!(with.contains("barber ill"));
        let (_, without) = cancelled_by_shop(&booking(), "2026-02-24 10:00", None);
        assert!(!without.contains("Reason:"));
    }
}
