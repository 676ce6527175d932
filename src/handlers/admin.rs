use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::notify;
use crate::db::queries;
use crate::errors::{AppError, BookingError};
use crate::models::{AvailabilityRule, Barber, BarberTimeOff, Service, ShopSettings, TimeBlock};
use crate::services::{civil, lifecycle, notifications};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

fn invalid(msg: &str) -> AppError {
    AppError::Booking(BookingError::InvalidInput(msg.to_string()))
}

/// Operator date+time input ("YYYY-MM-DD" / "HH:MM") read as shop-local
/// wall-clock time.
fn parse_local(date: &str, time: &str, tz: Tz) -> Result<DateTime<Utc>, AppError> {
    let date = civil::normalize_date(date).ok_or_else(|| invalid("Invalid date."))?;
    let minute = civil::parse_clock_label(time).ok_or_else(|| invalid("Invalid time."))?;
    civil::civil_to_instant(date, minute, tz)
        .ok_or_else(|| invalid("That time does not exist on that date."))
}

/// Rule boundaries additionally accept "24:00" (end of day).
fn parse_rule_minute(s: &str) -> Option<u32> {
    if s == "24:00" {
        return Some(1440);
    }
    civil::parse_clock_label(s)
}

// ── Bookings ──

#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct AdminBookingResponse {
    pub id: String,
    pub service_id: String,
    pub barber_id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub start: String,
    pub end: String,
    pub status: String,
    pub original_start: Option<String>,
    pub notes: Option<String>,
}

// GET /api/admin/bookings
pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<AdminBookingResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(50);
    let status_filter = query.status.as_deref();

    let response = {
        let db = state.db.lock().unwrap();
        let settings = queries::get_settings(&db)?;
        let tz = settings.tz();
        let bookings = queries::list_bookings(&db, status_filter, limit)?;

        bookings
            .into_iter()
            .map(|b| AdminBookingResponse {
                id: b.id,
                service_id: b.service_id,
                barber_id: b.barber_id,
                full_name: b.full_name,
                email: b.email,
                phone: b.phone,
                start: civil::local_datetime_label(b.start_at, tz),
                end: civil::local_datetime_label(b.end_at, tz),
                status: b.status.as_str().to_string(),
                original_start: b
                    .original_start_at
                    .map(|t| civil::local_datetime_label(t, tz)),
                notes: b.notes,
            })
            .collect::<Vec<_>>()
    };

    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct ShopCancelRequest {
    pub reason: Option<String>,
}

// POST /api/admin/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<ShopCancelRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let reason = body.and_then(|Json(b)| b.reason);

    let (booking, when_local) = {
        let mut db = state.db.lock().unwrap();
        let booking = lifecycle::cancel_by_shop(&mut db, &id, reason.as_deref())?;
        let settings = queries::get_settings(&db)?;
        let when_local = civil::local_datetime_label(booking.start_at, settings.tz());
        (booking, when_local)
    };

    let (subject, text) =
        notifications::cancelled_by_shop(&booking, &when_local, reason.as_deref());
    notify(&state, &booking.email, &subject, &text).await;

    Ok(Json(serde_json::json!({
        "booking_id": booking.id,
        "status": booking.status.as_str(),
    })))
}

// ── Settings ──

// GET /api/admin/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ShopSettings>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let settings = {
        let db = state.db.lock().unwrap();
        queries::get_settings(&db)?
    };
    Ok(Json(settings))
}

// POST /api/admin/settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(settings): Json<ShopSettings>,
) -> Result<Json<ShopSettings>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if settings.timezone.parse::<Tz>().is_err() {
        return Err(invalid("Unknown timezone."));
    }
    if settings.slot_interval_minutes == 0 {
        return Err(invalid("Slot interval must be at least one minute."));
    }

    let db = state.db.lock().unwrap();
    queries::update_settings(&db, &settings)?;
    Ok(Json(settings))
}

// ── Barbers & Services ──

#[derive(Deserialize)]
pub struct CreateBarberRequest {
    pub name: String,
}

// POST /api/admin/barbers
pub async fn create_barber(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateBarberRequest>,
) -> Result<Json<Barber>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if req.name.trim().is_empty() {
        return Err(invalid("Barber name is required."));
    }

    let barber = Barber {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name.trim().to_string(),
        active: true,
    };
    let db = state.db.lock().unwrap();
    queries::insert_barber(&db, &barber)?;
    Ok(Json(barber))
}

#[derive(Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub duration_minutes: u32,
    pub buffer_minutes: Option<u32>,
}

// POST /api/admin/services
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateServiceRequest>,
) -> Result<Json<Service>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if req.name.trim().is_empty() || req.duration_minutes == 0 {
        return Err(invalid("Service name and a non-zero duration are required."));
    }

    let service = Service {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name.trim().to_string(),
        duration_minutes: req.duration_minutes,
        buffer_minutes: req.buffer_minutes,
        active: true,
    };
    let db = state.db.lock().unwrap();
    queries::insert_service(&db, &service)?;
    Ok(Json(service))
}

// ── Availability Rules ──

#[derive(Deserialize)]
pub struct CreateRuleRequest {
    pub barber_id: String,
    pub weekday: u32,
    pub start: String,
    pub end: String,
    pub break_start: Option<String>,
    pub break_end: Option<String>,
}

// POST /api/admin/rules
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateRuleRequest>,
) -> Result<Json<AvailabilityRule>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if req.weekday > 6 {
        return Err(invalid("Weekday must be 0 (Sunday) through 6 (Saturday)."));
    }
    let start_minute =
        parse_rule_minute(&req.start).ok_or_else(|| invalid("Invalid start time."))?;
    let end_minute = parse_rule_minute(&req.end).ok_or_else(|| invalid("Invalid end time."))?;
    if start_minute >= end_minute {
        return Err(invalid("The start time must come before the end time."));
    }

    let break_window = match (&req.break_start, &req.break_end) {
        (Some(bs), Some(be)) => {
            let bs = parse_rule_minute(bs).ok_or_else(|| invalid("Invalid break start."))?;
            let be = parse_rule_minute(be).ok_or_else(|| invalid("Invalid break end."))?;
            if bs >= be || bs < start_minute || be > end_minute {
                return Err(invalid("The break must fall inside the working hours."));
            }
            Some((bs, be))
        }
        (None, None) => None,
        _ => return Err(invalid("Break start and end must be given together.")),
    };

    let rule = AvailabilityRule {
        id: uuid::Uuid::new_v4().to_string(),
        barber_id: req.barber_id.clone(),
        weekday: req.weekday,
        start_minute,
        end_minute,
        break_start_minute: break_window.map(|(s, _)| s),
        break_end_minute: break_window.map(|(_, e)| e),
        active: true,
    };

    let db = state.db.lock().unwrap();
    queries::get_barber(&db, &req.barber_id)?
        .ok_or_else(|| AppError::Booking(BookingError::NotFound("barber".to_string())))?;
    queries::upsert_rule(&db, &rule)?;
    Ok(Json(rule))
}

// ── Time Off & Blocks ──

#[derive(Deserialize)]
pub struct CreateTimeOffRequest {
    pub barber_id: String,
    pub start_date: String,
    pub start_time: String,
    pub end_date: String,
    pub end_time: String,
}

// POST /api/admin/time-off
pub async fn create_time_off(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTimeOffRequest>,
) -> Result<Json<BarberTimeOff>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let tz = queries::get_settings(&db)?.tz();
    queries::get_barber(&db, &req.barber_id)?
        .ok_or_else(|| AppError::Booking(BookingError::NotFound("barber".to_string())))?;

    let starts_at = parse_local(&req.start_date, &req.start_time, tz)?;
    let ends_at = parse_local(&req.end_date, &req.end_time, tz)?;
    if starts_at >= ends_at {
        return Err(invalid("Time off must end after it starts."));
    }

    let time_off = BarberTimeOff {
        id: uuid::Uuid::new_v4().to_string(),
        barber_id: req.barber_id,
        starts_at,
        ends_at,
    };
    queries::insert_time_off(&db, &time_off)?;
    Ok(Json(time_off))
}

#[derive(Deserialize)]
pub struct CreateBlockRequest {
    pub barber_id: Option<String>,
    pub title: String,
    pub start_date: String,
    pub start_time: String,
    pub end_date: String,
    pub end_time: String,
}

// POST /api/admin/blocks
pub async fn create_block(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateBlockRequest>,
) -> Result<Json<TimeBlock>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let tz = queries::get_settings(&db)?.tz();
    if let Some(barber_id) = &req.barber_id {
        queries::get_barber(&db, barber_id)?
            .ok_or_else(|| AppError::Booking(BookingError::NotFound("barber".to_string())))?;
    }

    let start_at = parse_local(&req.start_date, &req.start_time, tz)?;
    let end_at = parse_local(&req.end_date, &req.end_time, tz)?;
    if start_at >= end_at {
        return Err(invalid("A block must end after it starts."));
    }

    let block = TimeBlock {
        id: uuid::Uuid::new_v4().to_string(),
        barber_id: req.barber_id,
        title: if req.title.trim().is_empty() {
            "blocked".to_string()
        } else {
            req.title.trim().to_string()
        },
        start_at,
        end_at,
    };
    queries::insert_time_block(&db, &block)?;
    Ok(Json(block))
}

// GET /api/admin/blocks
pub async fn list_blocks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<TimeBlock>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let blocks = queries::list_time_blocks(&db)?;
    Ok(Json(blocks))
}

// DELETE /api/admin/blocks/:id
pub async fn delete_block(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let deleted = queries::delete_time_block(&db, &id)?;
    if !deleted {
        return Err(AppError::Booking(BookingError::NotFound(
            "time block".to_string(),
        )));
    }
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// ── Maintenance ──

// POST /api/admin/sweep
pub async fn sweep_expired(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let expired = {
        let db = state.db.lock().unwrap();
        lifecycle::sweep_expired(&db)?
    };
    Ok(Json(serde_json::json!({ "expired": expired })))
}
