use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{AvailabilityRule, Service, ShopSettings};
use crate::services::civil;
use crate::services::overlap::{any_overlap, minutes_overlap, Interval};

fn effective_duration(service: &Service, settings: &ShopSettings) -> u32 {
    service.duration_minutes
        + service
            .buffer_minutes
            .unwrap_or(settings.default_buffer_minutes)
}

/// Validates one candidate start against the weekday rule and the calendar,
/// independent of other bookings. Returns the absolute interval the booking
/// would occupy (service time plus trailing buffer), or None when the
/// candidate is not offerable:
/// - it does not fit inside the rule's open window,
/// - the service time crosses the rule's break window (the trailing buffer
///   may run into the break),
/// - the wall-clock time does not exist on that date (spring-forward gap),
/// - the computed end rolls past local midnight into the next civil day.
pub fn candidate_interval(
    date: NaiveDate,
    start_minute: u32,
    service: &Service,
    rule: &AvailabilityRule,
    settings: &ShopSettings,
    tz: Tz,
) -> Option<Interval> {
    let effective = effective_duration(service, settings);
    if start_minute < rule.start_minute || start_minute + effective > rule.end_minute {
        return None;
    }

    if let (Some(break_start), Some(break_end)) = (rule.break_start_minute, rule.break_end_minute)
    {
        if minutes_overlap(
            start_minute,
            start_minute + service.duration_minutes,
            break_start,
            break_end,
        ) {
            return None;
        }
    }

    let start = civil::civil_to_instant(date, start_minute, tz)?;
    let end = start + Duration::minutes(effective as i64);
    if civil::civil_date_of(end, tz) != date {
        return None;
    }

    Some(Interval::new(start, end))
}

/// Produces the ordered, deduplicated list of offerable "HH:MM" start
/// labels for one barber/service/date. An empty list means closed or fully
/// booked; it is never an error.
pub fn generate_slots(
    date: NaiveDate,
    service: &Service,
    rule: Option<&AvailabilityRule>,
    committed: &[Interval],
    time_off: &[Interval],
    blocks: &[Interval],
    settings: &ShopSettings,
    tz: Tz,
) -> Vec<String> {
    let Some(rule) = rule else {
        return Vec::new();
    };

    let effective = effective_duration(service, settings);
    let step = settings.slot_interval_minutes.max(1);

    let mut slots: Vec<String> = Vec::new();
    let mut start_minute = rule.start_minute;
    while start_minute + effective <= rule.end_minute {
        if let Some(candidate) = candidate_interval(date, start_minute, service, rule, settings, tz)
        {
            if !any_overlap(&candidate, committed)
                && !any_overlap(&candidate, time_off)
                && !any_overlap(&candidate, blocks)
            {
                let label = civil::clock_label(candidate.start, tz);
                if slots.last() != Some(&label) {
                    slots.push(label);
                }
            }
        }
        start_minute += step;
    }

    slots
}

/// The slot query path: sweeps stale pending holds first so they never
/// falsely block a slot, then assembles the barber's committed intervals
/// for the civil date and runs the generator.
pub fn available_slots(
    conn: &Connection,
    service_id: &str,
    barber_id: &str,
    date_input: &str,
) -> Result<Vec<String>, BookingError> {
    let date = civil::normalize_date(date_input)
        .ok_or_else(|| BookingError::InvalidInput("Invalid date.".to_string()))?;

    queries::expire_stale_pending(conn, Utc::now())?;

    let settings = queries::get_settings(conn)?;
    let tz = settings.tz();

    let service = queries::get_service(conn, service_id)?
        .filter(|s| s.active)
        .ok_or_else(|| BookingError::NotFound("service".to_string()))?;
    let barber = queries::get_barber(conn, barber_id)?
        .filter(|b| b.active)
        .ok_or_else(|| BookingError::NotFound("barber".to_string()))?;

    let rule = queries::get_active_rule(conn, &barber.id, civil::weekday_of(date))?;

    // A UTC window generously covering the civil date in any timezone.
    let window_from = date.and_time(NaiveTime::MIN).and_utc() - Duration::days(1);
    let window_to = window_from + Duration::days(3);

    let committed =
        queries::booking_intervals_between(conn, &barber.id, window_from, window_to, None)?;
    let time_off = queries::time_off_intervals_between(conn, &barber.id, window_from, window_to)?;
    let blocks = queries::block_intervals_between(conn, &barber.id, window_from, window_to)?;

    Ok(generate_slots(
        date,
        &service,
        rule.as_ref(),
        &committed,
        &time_off,
        &blocks,
        &settings,
        tz,
    ))
}
