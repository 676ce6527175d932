use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::notify;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::Booking;
use crate::services::lifecycle::{self, CreateBookingRequest, RescheduleRequest};
use crate::services::{civil, notifications};
use crate::state::AppState;

#[derive(Serialize)]
pub struct CreateBookingResponse {
    pub booking_id: String,
    pub status: String,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct RescheduleApiRequest {
    pub token: String,
    pub service_id: String,
    pub barber_id: String,
    pub date: String,
    pub time: String,
}

/// What a client gets back after any lifecycle call: local shop times, no
/// internal identifiers beyond the booking id.
#[derive(Serialize)]
pub struct BookingSummary {
    pub booking_id: String,
    pub service: String,
    pub barber: String,
    pub date: String,
    pub time: String,
    pub status: String,
}

fn summarize(conn: &Connection, booking: &Booking) -> Result<BookingSummary, AppError> {
    let settings = queries::get_settings(conn)?;
    let tz = settings.tz();
    let local = booking.start_at.with_timezone(&tz);

    let service = queries::get_service(conn, &booking.service_id)?
        .map(|s| s.name)
        .unwrap_or_else(|| booking.service_id.clone());
    let barber = queries::get_barber(conn, &booking.barber_id)?
        .map(|b| b.name)
        .unwrap_or_else(|| booking.barber_id.clone());

    Ok(BookingSummary {
        booking_id: booking.id.clone(),
        service,
        barber,
        date: local.format("%Y-%m-%d").to_string(),
        time: local.format("%H:%M").to_string(),
        status: booking.status.as_str().to_string(),
    })
}

fn local_label(conn: &Connection, booking: &Booking) -> Result<String, AppError> {
    let settings = queries::get_settings(conn)?;
    Ok(civil::local_datetime_label(booking.start_at, settings.tz()))
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<CreateBookingResponse>, AppError> {
    let (booking, confirm_token, when_local) = {
        let mut db = state.db.lock().unwrap();
        let (booking, confirm_token) = lifecycle::create_pending(&mut db, &req)?;
        let when_local = local_label(&db, &booking)?;
        (booking, confirm_token, when_local)
    };

    let (subject, body) = notifications::confirmation_requested(
        &booking,
        &when_local,
        &confirm_token,
        &state.config.public_base_url,
    );
    notify(&state, &booking.email, &subject, &body).await;

    Ok(Json(CreateBookingResponse {
        booking_id: booking.id,
        status: booking.status.as_str().to_string(),
    }))
}

// POST /api/bookings/confirm
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<BookingSummary>, AppError> {
    let (booking, manage_token, summary, when_local) = {
        let mut db = state.db.lock().unwrap();
        let (booking, manage_token) = lifecycle::confirm_by_token(&mut db, &req.token)?;
        let summary = summarize(&db, &booking)?;
        let when_local = local_label(&db, &booking)?;
        (booking, manage_token, summary, when_local)
    };

    let (subject, body) = notifications::booking_confirmed(
        &booking,
        &when_local,
        &manage_token,
        &state.config.public_base_url,
    );
    notify(&state, &booking.email, &subject, &body).await;

    Ok(Json(summary))
}

// POST /api/bookings/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<BookingSummary>, AppError> {
    let summary = {
        let mut db = state.db.lock().unwrap();
        let booking = lifecycle::cancel_by_manage_token(&mut db, &req.token)?;
        summarize(&db, &booking)?
    };

    Ok(Json(summary))
}

// POST /api/bookings/reschedule
pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RescheduleApiRequest>,
) -> Result<Json<BookingSummary>, AppError> {
    let details = RescheduleRequest {
        service_id: req.service_id,
        barber_id: req.barber_id,
        date: req.date,
        time: req.time,
    };

    let (booking, summary, previous_local, new_local) = {
        let mut db = state.db.lock().unwrap();
        let (booking, previous) = lifecycle::reschedule_by_token(&mut db, &req.token, &details)?;
        let summary = summarize(&db, &booking)?;
        let settings = queries::get_settings(&db)?;
        let tz = settings.tz();
        let previous_local = civil::local_datetime_label(previous.start, tz);
        let new_local = civil::local_datetime_label(booking.start_at, tz);
        (booking, summary, previous_local, new_local)
    };

    let (subject, body) = notifications::rescheduled(&booking, &previous_local, &new_local);
    notify(&state, &booking.email, &subject, &body).await;

    Ok(Json(summary))
}
