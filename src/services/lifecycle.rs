use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Deserialize;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Booking, BookingStatus, Service, ShopSettings};
use crate::services::civil;
use crate::services::overlap::{any_overlap, Interval};
use crate::services::slots::candidate_interval;
use crate::services::tokens::{hash_token, issue_token};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub service_id: String,
    pub barber_id: String,
    pub date: String,
    pub time: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleRequest {
    pub service_id: String,
    pub barber_id: String,
    pub date: String,
    pub time: String,
}

/// Every overlap-sensitive operation runs inside an IMMEDIATE transaction:
/// the write lock is taken up front and the overlap re-check reads
/// transaction-local state, so two racing reservations cannot both pass it.
fn begin(conn: &mut Connection) -> Result<Transaction<'_>, BookingError> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(busy_as_unavailable)
}

fn commit(tx: Transaction<'_>) -> Result<(), BookingError> {
    tx.commit().map_err(busy_as_unavailable)
}

/// A lost write race surfaces as "someone else booked it first".
fn busy_as_unavailable(e: rusqlite::Error) -> BookingError {
    match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::DatabaseBusy
                || f.code == rusqlite::ErrorCode::DatabaseLocked =>
        {
            BookingError::SlotUnavailable
        }
        other => BookingError::Database(other),
    }
}

fn parse_date(input: &str) -> Result<NaiveDate, BookingError> {
    civil::normalize_date(input)
        .ok_or_else(|| BookingError::InvalidInput("Invalid date.".to_string()))
}

fn parse_time(input: &str) -> Result<u32, BookingError> {
    civil::parse_clock_label(input)
        .ok_or_else(|| BookingError::InvalidInput("Invalid time.".to_string()))
}

/// Transaction-local slot validation: weekday rule, calendar, and the three
/// overlap classes. `exclude` skips one booking id so a reschedule does not
/// conflict with its own current interval.
fn validate_slot(
    tx: &Connection,
    barber_id: &str,
    service: &Service,
    date: NaiveDate,
    start_minute: u32,
    settings: &ShopSettings,
    tz: Tz,
    exclude: Option<&str>,
) -> Result<Interval, BookingError> {
    let rule = queries::get_active_rule(tx, barber_id, civil::weekday_of(date))?
        .ok_or(BookingError::SlotUnavailable)?;

    let interval = candidate_interval(date, start_minute, service, &rule, settings, tz)
        .ok_or(BookingError::SlotUnavailable)?;

    let committed =
        queries::booking_intervals_between(tx, barber_id, interval.start, interval.end, exclude)?;
    let time_off =
        queries::time_off_intervals_between(tx, barber_id, interval.start, interval.end)?;
    let blocks = queries::block_intervals_between(tx, barber_id, interval.start, interval.end)?;

    if any_overlap(&interval, &committed)
        || any_overlap(&interval, &time_off)
        || any_overlap(&interval, &blocks)
    {
        return Err(BookingError::SlotUnavailable);
    }

    Ok(interval)
}

/// Reserve a slot. The returned raw confirm token is shown once (sent to
/// the client); only its hash is stored.
pub fn create_pending(
    conn: &mut Connection,
    req: &CreateBookingRequest,
) -> Result<(Booking, String), BookingError> {
    let full_name = req.full_name.trim();
    let email = req.email.trim();
    if full_name.is_empty() || !email.contains('@') {
        return Err(BookingError::InvalidInput(
            "Please provide your name and a valid email address.".to_string(),
        ));
    }

    let date = parse_date(&req.date)?;
    let start_minute = parse_time(&req.time)?;

    let tx = begin(conn)?;
    let now = Utc::now();

    queries::expire_stale_pending(&tx, now)?;

    let settings = queries::get_settings(&tx)?;
    let tz = settings.tz();

    let service = queries::get_service(&tx, &req.service_id)?
        .filter(|s| s.active)
        .ok_or_else(|| BookingError::NotFound("service".to_string()))?;
    let barber = queries::get_barber(&tx, &req.barber_id)?
        .filter(|b| b.active)
        .ok_or_else(|| BookingError::NotFound("barber".to_string()))?;

    let interval = validate_slot(
        &tx,
        &barber.id,
        &service,
        date,
        start_minute,
        &settings,
        tz,
        None,
    )?;

    let client = queries::resolve_client(&tx, full_name, email, req.phone.as_deref())?;

    let confirm_token = issue_token();
    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        service_id: service.id.clone(),
        barber_id: barber.id.clone(),
        client_id: client.id,
        full_name: full_name.to_string(),
        email: email.to_string(),
        phone: req.phone.clone(),
        start_at: interval.start,
        end_at: interval.end,
        status: BookingStatus::PendingConfirmation,
        confirm_token_hash: Some(hash_token(&confirm_token)),
        confirm_token_expires_at: Some(
            now + Duration::minutes(settings.pending_confirmation_minutes),
        ),
        manage_token_hash: None,
        manage_token_expires_at: None,
        rescheduled_at: None,
        original_start_at: None,
        original_end_at: None,
        notes: None,
        created_at: now,
        updated_at: now,
    };
    queries::insert_booking(&tx, &booking)?;
    commit(tx)?;

    tracing::info!(
        booking_id = %booking.id,
        barber_id = %booking.barber_id,
        start_at = %booking.start_at,
        "created pending booking"
    );

    Ok((booking, confirm_token))
}

/// pending → confirmed. Consumes the confirm token and issues the manage
/// token used for self-service cancel/reschedule.
pub fn confirm_by_token(
    conn: &mut Connection,
    raw_token: &str,
) -> Result<(Booking, String), BookingError> {
    let hash = hash_token(raw_token);

    let tx = begin(conn)?;
    let now = Utc::now();

    let booking = queries::find_by_confirm_hash(&tx, &hash)?.ok_or(BookingError::InvalidToken)?;

    // Cancellation and expiry always win over a stale confirm attempt.
    if booking.status.is_terminal() {
        return Err(BookingError::AlreadyCancelled);
    }

    let expires_at = booking
        .confirm_token_expires_at
        .ok_or(BookingError::InvalidToken)?;
    if now > expires_at {
        // The sweep had not caught this one yet; expire it now.
        queries::mark_expired(&tx, &booking.id, now)?;
        commit(tx)?;
        return Err(BookingError::TokenExpired);
    }

    let manage_token = issue_token();
    queries::confirm_booking(&tx, &booking.id, &hash_token(&manage_token), booking.end_at, now)?;
    let confirmed = queries::get_booking(&tx, &booking.id)?.ok_or(BookingError::InvalidToken)?;
    commit(tx)?;

    tracing::info!(booking_id = %confirmed.id, "booking confirmed");

    Ok((confirmed, manage_token))
}

pub fn cancel_by_manage_token(
    conn: &mut Connection,
    raw_token: &str,
) -> Result<Booking, BookingError> {
    let hash = hash_token(raw_token);

    let tx = begin(conn)?;
    let now = Utc::now();

    let booking = queries::find_by_manage_hash(&tx, &hash)?.ok_or(BookingError::InvalidToken)?;

    if booking.status.is_terminal() {
        return Err(BookingError::AlreadyCancelled);
    }

    if let Some(expires_at) = booking.manage_token_expires_at {
        if now > expires_at {
            return Err(BookingError::TokenExpired);
        }
    }

    let settings = queries::get_settings(&tx)?;
    if booking.start_at - now < Duration::hours(settings.cancellation_window_hours) {
        return Err(BookingError::WindowPassed);
    }

    queries::set_status(&tx, &booking.id, BookingStatus::CancelledByClient, now)?;
    let cancelled = queries::get_booking(&tx, &booking.id)?.ok_or(BookingError::InvalidToken)?;
    commit(tx)?;

    tracing::info!(booking_id = %cancelled.id, "booking cancelled by client");

    Ok(cancelled)
}

/// Operator path: no token and no window restriction. Authorization happens
/// at the HTTP boundary.
pub fn cancel_by_shop(
    conn: &mut Connection,
    booking_id: &str,
    reason: Option<&str>,
) -> Result<Booking, BookingError> {
    let tx = begin(conn)?;
    let now = Utc::now();

    let booking = queries::get_booking(&tx, booking_id)?
        .ok_or_else(|| BookingError::NotFound("booking".to_string()))?;

    if booking.status.is_terminal() {
        return Err(BookingError::AlreadyCancelled);
    }

    queries::set_status(&tx, &booking.id, BookingStatus::CancelledByShop, now)?;
    if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
        queries::append_note(&tx, &booking.id, &format!("cancelled by shop: {reason}"))?;
    }
    let cancelled = queries::get_booking(&tx, &booking.id)?
        .ok_or_else(|| BookingError::NotFound("booking".to_string()))?;
    commit(tx)?;

    tracing::info!(booking_id = %cancelled.id, "booking cancelled by shop");

    Ok(cancelled)
}

/// Moves a confirmed booking to a new slot, possibly with a different
/// barber or service. Returns the updated booking plus the interval it
/// previously occupied (for the notification copy).
pub fn reschedule_by_token(
    conn: &mut Connection,
    raw_token: &str,
    req: &RescheduleRequest,
) -> Result<(Booking, Interval), BookingError> {
    let date = parse_date(&req.date)?;
    let start_minute = parse_time(&req.time)?;
    let hash = hash_token(raw_token);

    let tx = begin(conn)?;
    let now = Utc::now();

    queries::expire_stale_pending(&tx, now)?;

    let booking = queries::find_by_manage_hash(&tx, &hash)?.ok_or(BookingError::InvalidToken)?;

    if booking.status.is_terminal() {
        return Err(BookingError::AlreadyCancelled);
    }
    if booking.status != BookingStatus::Confirmed {
        return Err(BookingError::InvalidToken);
    }

    if let Some(expires_at) = booking.manage_token_expires_at {
        if now > expires_at {
            return Err(BookingError::TokenExpired);
        }
    }

    let settings = queries::get_settings(&tx)?;
    let tz = settings.tz();

    if booking.start_at - now < Duration::hours(settings.reschedule_window_hours) {
        return Err(BookingError::WindowPassed);
    }

    let service = queries::get_service(&tx, &req.service_id)?
        .filter(|s| s.active)
        .ok_or_else(|| BookingError::NotFound("service".to_string()))?;
    let barber = queries::get_barber(&tx, &req.barber_id)?
        .filter(|b| b.active)
        .ok_or_else(|| BookingError::NotFound("barber".to_string()))?;

    let interval = validate_slot(
        &tx,
        &barber.id,
        &service,
        date,
        start_minute,
        &settings,
        tz,
        Some(&booking.id),
    )?;

    let previous = Interval::new(booking.start_at, booking.end_at);
    queries::apply_reschedule(
        &tx,
        &booking.id,
        &service.id,
        &barber.id,
        interval.start,
        interval.end,
        now,
    )?;
    let updated = queries::get_booking(&tx, &booking.id)?.ok_or(BookingError::InvalidToken)?;
    commit(tx)?;

    tracing::info!(
        booking_id = %updated.id,
        from = %previous.start,
        to = %updated.start_at,
        "booking rescheduled"
    );

    Ok((updated, previous))
}

/// Idempotent batch transition of lapsed pending holds. Also invoked
/// opportunistically at the start of slot reads and reservation attempts,
/// so its correctness never depends on a timer.
pub fn sweep_expired(conn: &Connection) -> Result<usize, BookingError> {
    let count = queries::expire_stale_pending(conn, Utc::now())?;
    if count > 0 {
        tracing::info!(count, "expired stale pending bookings");
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Barber, BarberTimeOff, TimeBlock};
    use crate::models::AvailabilityRule;
    use chrono_tz::America::New_York;
    use rusqlite::params;

    fn setup_db() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        queries::insert_barber(
            &conn,
            &Barber {
                id: "barber-1".to_string(),
                name: "Sam".to_string(),
                active: true,
            },
        )
        .unwrap();
        queries::insert_barber(
            &conn,
            &Barber {
                id: "barber-2".to_string(),
                name: "Robin".to_string(),
                active: true,
            },
        )
        .unwrap();
        queries::insert_service(
            &conn,
            &crate::models::Service {
                id: "svc-1".to_string(),
                name: "Haircut".to_string(),
                duration_minutes: 30,
                buffer_minutes: None,
                active: true,
            },
        )
        .unwrap();
        // barber-1 works every day 10:00-18:00 with a 13:00-13:30 break, so
        // the now-relative dates used below always land on an open day.
        for weekday in 0..7 {
            queries::upsert_rule(
                &conn,
                &AvailabilityRule {
                    id: format!("rule-{weekday}"),
                    barber_id: "barber-1".to_string(),
                    weekday,
                    start_minute: 600,
                    end_minute: 1080,
                    break_start_minute: Some(780),
                    break_end_minute: Some(810),
                    active: true,
                },
            )
            .unwrap();
        }
        conn
    }

    fn future_date() -> String {
        (Utc::now() + Duration::days(14))
            .with_timezone(&New_York)
            .date_naive()
            .format("%Y-%m-%d")
            .to_string()
    }

    fn request(date: &str, time: &str) -> CreateBookingRequest {
        CreateBookingRequest {
            service_id: "svc-1".to_string(),
            barber_id: "barber-1".to_string(),
            date: date.to_string(),
            time: time.to_string(),
            full_name: "Alice Smith".to_string(),
            email: "alice@example.com".to_string(),
            phone: Some("+15551110000".to_string()),
        }
    }

    fn widen_windows(conn: &Connection, hours: i64) {
        let mut settings = queries::get_settings(conn).unwrap();
        settings.cancellation_window_hours = hours;
        settings.reschedule_window_hours = hours;
        queries::update_settings(conn, &settings).unwrap();
    }

    fn force_confirm_expiry(conn: &Connection, booking_id: &str) {
        conn.execute(
            "UPDATE bookings SET confirm_token_expires_at = ?1 WHERE id = ?2",
            params![queries::fmt_ts(Utc::now() - Duration::minutes(5)), booking_id],
        )
        .unwrap();
    }

    // ── create ──

    #[test]
    fn test_create_pending() {
        let mut conn = setup_db();
        let date = future_date();
        let (booking, token) = create_pending(&mut conn, &request(&date, "10:00")).unwrap();

        assert_eq!(booking.status, BookingStatus::PendingConfirmation);
        assert_eq!(booking.end_at - booking.start_at, Duration::minutes(30));
        assert_eq!(booking.confirm_token_hash.as_deref(), Some(hash_token(&token).as_str()));
        assert!(booking.confirm_token_expires_at.unwrap() > Utc::now());
        assert!(booking.manage_token_hash.is_none());

        // The client was resolved from the email.
        let stored = queries::get_booking(&conn, &booking.id).unwrap().unwrap();
        assert_eq!(stored.email, "alice@example.com");
        assert!(!stored.client_id.is_empty());
    }

    #[test]
    fn test_create_rejects_bad_input() {
        let mut conn = setup_db();
        let date = future_date();

        let mut bad = request(&date, "10:00");
        bad.email = "not-an-email".to_string();
        assert!(matches!(
            create_pending(&mut conn, &bad),
            Err(BookingError::InvalidInput(_))
        ));

        assert!(matches!(
            create_pending(&mut conn, &request("31/02/2026", "10:00")),
            Err(BookingError::InvalidInput(_))
        ));
        assert!(matches!(
            create_pending(&mut conn, &request(&date, "25:00")),
            Err(BookingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_create_unknown_or_inactive_ids() {
        let mut conn = setup_db();
        let date = future_date();

        let mut unknown = request(&date, "10:00");
        unknown.service_id = "nope".to_string();
        assert!(matches!(
            create_pending(&mut conn, &unknown),
            Err(BookingError::NotFound(_))
        ));

        conn.execute("UPDATE barbers SET active = 0 WHERE id = 'barber-1'", [])
            .unwrap();
        assert!(matches!(
            create_pending(&mut conn, &request(&date, "10:00")),
            Err(BookingError::NotFound(_))
        ));
    }

    #[test]
    fn test_create_outside_rule_window() {
        let mut conn = setup_db();
        let date = future_date();

        assert!(matches!(
            create_pending(&mut conn, &request(&date, "09:00")),
            Err(BookingError::SlotUnavailable)
        ));
        assert!(matches!(
            create_pending(&mut conn, &request(&date, "17:45")),
            Err(BookingError::SlotUnavailable)
        ));
    }

    #[test]
    fn test_create_in_break_window() {
        let mut conn = setup_db();
        let date = future_date();
        assert!(matches!(
            create_pending(&mut conn, &request(&date, "13:00")),
            Err(BookingError::SlotUnavailable)
        ));
        // Ends exactly when the break starts: allowed.
        assert!(create_pending(&mut conn, &request(&date, "12:30")).is_ok());
    }

    #[test]
    fn test_create_no_rule_for_weekday() {
        let mut conn = setup_db();
        let date = future_date();
        let mut req = request(&date, "10:00");
        req.barber_id = "barber-2".to_string();
        assert!(matches!(
            create_pending(&mut conn, &req),
            Err(BookingError::SlotUnavailable)
        ));
    }

    #[test]
    fn test_create_spring_forward_gap_rejected() {
        let mut conn = setup_db();
        // 2027-03-14 02:30 does not exist in America/New_York; give the
        // barber an early-morning Sunday shift so only the DST gap rejects.
        queries::upsert_rule(
            &conn,
            &AvailabilityRule {
                id: "rule-early".to_string(),
                barber_id: "barber-1".to_string(),
                weekday: 0,
                start_minute: 60,
                end_minute: 300,
                break_start_minute: None,
                break_end_minute: None,
                active: true,
            },
        )
        .unwrap();

        assert!(matches!(
            create_pending(&mut conn, &request("2027-03-14", "02:30")),
            Err(BookingError::SlotUnavailable)
        ));
        assert!(create_pending(&mut conn, &request("2027-03-14", "01:30")).is_ok());
    }

    #[test]
    fn test_double_booking_rejected() {
        let mut conn = setup_db();
        let date = future_date();

        create_pending(&mut conn, &request(&date, "10:00")).unwrap();

        // Same slot and an off-grid overlapping slot both lose.
        assert!(matches!(
            create_pending(&mut conn, &request(&date, "10:00")),
            Err(BookingError::SlotUnavailable)
        ));
        assert!(matches!(
            create_pending(&mut conn, &request(&date, "10:15")),
            Err(BookingError::SlotUnavailable)
        ));
    }

    #[test]
    fn test_abutting_bookings_coexist() {
        let mut conn = setup_db();
        let date = future_date();

        let (first, _) = create_pending(&mut conn, &request(&date, "10:00")).unwrap();
        let (second, _) = create_pending(&mut conn, &request(&date, "10:30")).unwrap();
        assert_eq!(first.end_at, second.start_at);
    }

    #[test]
    fn test_create_blocked_by_time_off_and_blocks() {
        let mut conn = setup_db();
        let date = future_date();
        let day = civil::normalize_date(&date).unwrap();

        queries::insert_time_off(
            &conn,
            &BarberTimeOff {
                id: "off-1".to_string(),
                barber_id: "barber-1".to_string(),
                starts_at: civil::civil_to_instant(day, 600, New_York).unwrap(),
                ends_at: civil::civil_to_instant(day, 660, New_York).unwrap(),
            },
        )
        .unwrap();
        assert!(matches!(
            create_pending(&mut conn, &request(&date, "10:30")),
            Err(BookingError::SlotUnavailable)
        ));

        // A shop-global block (no barber id) applies too.
        queries::insert_time_block(
            &conn,
            &TimeBlock {
                id: "block-1".to_string(),
                barber_id: None,
                title: "staff meeting".to_string(),
                start_at: civil::civil_to_instant(day, 900, New_York).unwrap(),
                end_at: civil::civil_to_instant(day, 930, New_York).unwrap(),
            },
        )
        .unwrap();
        assert!(matches!(
            create_pending(&mut conn, &request(&date, "15:00")),
            Err(BookingError::SlotUnavailable)
        ));

        assert!(create_pending(&mut conn, &request(&date, "11:00")).is_ok());
    }

    // ── confirm ──

    #[test]
    fn test_confirm_flow() {
        let mut conn = setup_db();
        let (booking, confirm_token) =
            create_pending(&mut conn, &request(&future_date(), "10:00")).unwrap();

        let (confirmed, manage_token) = confirm_by_token(&mut conn, &confirm_token).unwrap();
        assert_eq!(confirmed.id, booking.id);
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert!(confirmed.confirm_token_hash.is_none());
        assert!(confirmed.confirm_token_expires_at.is_none());
        assert_eq!(
            confirmed.manage_token_hash.as_deref(),
            Some(hash_token(&manage_token).as_str())
        );
        assert_eq!(confirmed.manage_token_expires_at, Some(confirmed.end_at));
    }

    #[test]
    fn test_confirm_unissued_token() {
        let mut conn = setup_db();
        assert!(matches!(
            confirm_by_token(&mut conn, &issue_token()),
            Err(BookingError::InvalidToken)
        ));
    }

    #[test]
    fn test_confirm_token_single_use() {
        let mut conn = setup_db();
        let (_, confirm_token) =
            create_pending(&mut conn, &request(&future_date(), "10:00")).unwrap();

        confirm_by_token(&mut conn, &confirm_token).unwrap();
        // The hash was cleared on confirmation, so the token no longer
        // resolves to anything.
        assert!(matches!(
            confirm_by_token(&mut conn, &confirm_token),
            Err(BookingError::InvalidToken)
        ));
    }

    #[test]
    fn test_confirm_after_expiry() {
        let mut conn = setup_db();
        let (booking, confirm_token) =
            create_pending(&mut conn, &request(&future_date(), "10:00")).unwrap();
        force_confirm_expiry(&conn, &booking.id);

        assert!(matches!(
            confirm_by_token(&mut conn, &confirm_token),
            Err(BookingError::TokenExpired)
        ));
        let stored = queries::get_booking(&conn, &booking.id).unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Expired);

        // A second attempt hits the terminal status.
        assert!(matches!(
            confirm_by_token(&mut conn, &confirm_token),
            Err(BookingError::AlreadyCancelled)
        ));
    }

    // ── cancel ──

    #[test]
    fn test_cancel_by_client() {
        let mut conn = setup_db();
        let (_, confirm_token) =
            create_pending(&mut conn, &request(&future_date(), "10:00")).unwrap();
        let (_, manage_token) = confirm_by_token(&mut conn, &confirm_token).unwrap();

        let cancelled = cancel_by_manage_token(&mut conn, &manage_token).unwrap();
        assert_eq!(cancelled.status, BookingStatus::CancelledByClient);

        assert!(matches!(
            cancel_by_manage_token(&mut conn, &manage_token),
            Err(BookingError::AlreadyCancelled)
        ));
    }

    #[test]
    fn test_cancel_window_passed() {
        let mut conn = setup_db();
        let (_, confirm_token) =
            create_pending(&mut conn, &request(&future_date(), "10:00")).unwrap();
        let (_, manage_token) = confirm_by_token(&mut conn, &confirm_token).unwrap();

        // A cancellation window wider than the lead time forbids the cancel.
        widen_windows(&conn, 100_000);
        assert!(matches!(
            cancel_by_manage_token(&mut conn, &manage_token),
            Err(BookingError::WindowPassed)
        ));
    }

    #[test]
    fn test_cancel_by_shop() {
        let mut conn = setup_db();
        let (booking, _) = create_pending(&mut conn, &request(&future_date(), "10:00")).unwrap();

        let cancelled = cancel_by_shop(&mut conn, &booking.id, Some("barber ill")).unwrap();
        assert_eq!(cancelled.status, BookingStatus::CancelledByShop);
        assert!(cancelled.notes.unwrap().contains("barber ill"));

        assert!(matches!(
            cancel_by_shop(&mut conn, &booking.id, None),
            Err(BookingError::AlreadyCancelled)
        ));
        assert!(matches!(
            cancel_by_shop(&mut conn, "missing", None),
            Err(BookingError::NotFound(_))
        ));
    }

    #[test]
    fn test_shop_cancel_frees_the_slot() {
        let mut conn = setup_db();
        let date = future_date();
        let (booking, _) = create_pending(&mut conn, &request(&date, "10:00")).unwrap();
        cancel_by_shop(&mut conn, &booking.id, None).unwrap();

        // The interval no longer holds the slot.
        assert!(create_pending(&mut conn, &request(&date, "10:00")).is_ok());
    }

    // ── reschedule ──

    #[test]
    fn test_reschedule_preserves_original_slot() {
        let mut conn = setup_db();
        let date = future_date();
        let (booking, confirm_token) = create_pending(&mut conn, &request(&date, "10:00")).unwrap();
        let (_, manage_token) = confirm_by_token(&mut conn, &confirm_token).unwrap();
        let first_start = booking.start_at;
        let first_end = booking.end_at;

        let move_to = |time: &str| RescheduleRequest {
            service_id: "svc-1".to_string(),
            barber_id: "barber-1".to_string(),
            date: date.clone(),
            time: time.to_string(),
        };

        let (moved, previous) =
            reschedule_by_token(&mut conn, &manage_token, &move_to("11:00")).unwrap();
        assert_eq!(previous.start, first_start);
        assert_eq!(moved.status, BookingStatus::Confirmed);
        assert_eq!(moved.original_start_at, Some(first_start));
        assert_eq!(moved.original_end_at, Some(first_end));
        assert!(moved.rescheduled_at.is_some());
        assert_eq!(moved.manage_token_expires_at, Some(moved.end_at));

        // A second reschedule keeps the first-ever slot.
        let (moved_again, previous) =
            reschedule_by_token(&mut conn, &manage_token, &move_to("12:00")).unwrap();
        assert_eq!(previous.start, moved.start_at);
        assert_eq!(moved_again.original_start_at, Some(first_start));
        assert_eq!(moved_again.original_end_at, Some(first_end));
    }

    #[test]
    fn test_reschedule_to_taken_slot() {
        let mut conn = setup_db();
        let date = future_date();
        create_pending(&mut conn, &request(&date, "11:00")).unwrap();
        let (_, confirm_token) = create_pending(&mut conn, &request(&date, "10:00")).unwrap();
        let (_, manage_token) = confirm_by_token(&mut conn, &confirm_token).unwrap();

        let req = RescheduleRequest {
            service_id: "svc-1".to_string(),
            barber_id: "barber-1".to_string(),
            date: date.clone(),
            time: "11:00".to_string(),
        };
        assert!(matches!(
            reschedule_by_token(&mut conn, &manage_token, &req),
            Err(BookingError::SlotUnavailable)
        ));
    }

    #[test]
    fn test_reschedule_excludes_own_interval() {
        let mut conn = setup_db();
        let date = future_date();
        let (_, confirm_token) = create_pending(&mut conn, &request(&date, "10:00")).unwrap();
        let (_, manage_token) = confirm_by_token(&mut conn, &confirm_token).unwrap();

        // Moving to a slot that only overlaps the booking's own current
        // interval succeeds.
        let req = RescheduleRequest {
            service_id: "svc-1".to_string(),
            barber_id: "barber-1".to_string(),
            date: date.clone(),
            time: "10:15".to_string(),
        };
        assert!(reschedule_by_token(&mut conn, &manage_token, &req).is_ok());
    }

    #[test]
    fn test_reschedule_window_passed() {
        let mut conn = setup_db();
        let (_, confirm_token) =
            create_pending(&mut conn, &request(&future_date(), "10:00")).unwrap();
        let (_, manage_token) = confirm_by_token(&mut conn, &confirm_token).unwrap();

        widen_windows(&conn, 100_000);
        let req = RescheduleRequest {
            service_id: "svc-1".to_string(),
            barber_id: "barber-1".to_string(),
            date: future_date(),
            time: "11:00".to_string(),
        };
        assert!(matches!(
            reschedule_by_token(&mut conn, &manage_token, &req),
            Err(BookingError::WindowPassed)
        ));
    }

    // ── sweep ──

    #[test]
    fn test_sweep_expired_is_idempotent() {
        let mut conn = setup_db();
        let (booking, _) = create_pending(&mut conn, &request(&future_date(), "10:00")).unwrap();
        force_confirm_expiry(&conn, &booking.id);

        assert_eq!(sweep_expired(&conn).unwrap(), 1);
        assert_eq!(sweep_expired(&conn).unwrap(), 0);

        let stored = queries::get_booking(&conn, &booking.id).unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Expired);
    }

    #[test]
    fn test_expired_hold_frees_the_slot() {
        let mut conn = setup_db();
        let date = future_date();
        let (booking, _) = create_pending(&mut conn, &request(&date, "10:00")).unwrap();
        force_confirm_expiry(&conn, &booking.id);

        // The inline sweep inside create frees the lapsed hold.
        assert!(create_pending(&mut conn, &request(&date, "10:00")).is_ok());
    }

    // ── end to end ──

    #[test]
    fn test_full_lifecycle_scenario() {
        let mut conn = setup_db();
        let date = future_date();

        // Create pending at 10:00.
        let (booking, confirm_token) = create_pending(&mut conn, &request(&date, "10:00")).unwrap();
        assert_eq!(booking.status, BookingStatus::PendingConfirmation);
        let original_start = booking.start_at;

        // Confirm within the timeout.
        let (confirmed, manage_token) = confirm_by_token(&mut conn, &confirm_token).unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert!(confirmed.manage_token_hash.is_some());
        assert!(confirmed.confirm_token_hash.is_none());

        // Reschedule to 11:00: the interval moves, the original is kept.
        let reschedule = RescheduleRequest {
            service_id: "svc-1".to_string(),
            barber_id: "barber-1".to_string(),
            date: date.clone(),
            time: "11:00".to_string(),
        };
        let (moved, _) = reschedule_by_token(&mut conn, &manage_token, &reschedule).unwrap();
        assert_eq!(moved.original_start_at, Some(original_start));
        assert_ne!(moved.start_at, original_start);

        // Cancel with plenty of lead time.
        let cancelled = cancel_by_manage_token(&mut conn, &manage_token).unwrap();
        assert_eq!(cancelled.status, BookingStatus::CancelledByClient);

        // Stale tokens now fail.
        assert!(matches!(
            confirm_by_token(&mut conn, &confirm_token),
            Err(BookingError::InvalidToken)
        ));
        assert!(matches!(
            reschedule_by_token(&mut conn, &manage_token, &reschedule),
            Err(BookingError::AlreadyCancelled)
        ));
    }
}
