use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{
    AvailabilityRule, Barber, BarberTimeOff, Booking, BookingStatus, Client, Service,
    ShopSettings, TimeBlock,
};
use crate::services::overlap::Interval;

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.format(TS_FMT).to_string()
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, TS_FMT)
        .map(|n| n.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

fn opt_fmt_ts(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(fmt_ts)
}

fn opt_parse_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|v| parse_ts(&v))
}

// ── Shop Settings ──

pub fn get_settings(conn: &Connection) -> anyhow::Result<ShopSettings> {
    let settings = conn.query_row(
        "SELECT slot_interval_minutes, default_buffer_minutes, pending_confirmation_minutes,
                cancellation_window_hours, reschedule_window_hours, timezone
         FROM shop_settings WHERE id = 1",
        [],
        |row| {
            Ok(ShopSettings {
                slot_interval_minutes: row.get(0)?,
                default_buffer_minutes: row.get(1)?,
                pending_confirmation_minutes: row.get(2)?,
                cancellation_window_hours: row.get(3)?,
                reschedule_window_hours: row.get(4)?,
                timezone: row.get(5)?,
            })
        },
    )?;
    Ok(settings)
}

pub fn update_settings(conn: &Connection, settings: &ShopSettings) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE shop_settings SET
            slot_interval_minutes = ?1,
            default_buffer_minutes = ?2,
            pending_confirmation_minutes = ?3,
            cancellation_window_hours = ?4,
            reschedule_window_hours = ?5,
            timezone = ?6
         WHERE id = 1",
        params![
            settings.slot_interval_minutes,
            settings.default_buffer_minutes,
            settings.pending_confirmation_minutes,
            settings.cancellation_window_hours,
            settings.reschedule_window_hours,
            settings.timezone,
        ],
    )?;
    Ok(())
}

// ── Barbers ──

pub fn insert_barber(conn: &Connection, barber: &Barber) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO barbers (id, name, active) VALUES (?1, ?2, ?3)",
        params![barber.id, barber.name, barber.active as i32],
    )?;
    Ok(())
}

pub fn get_barber(conn: &Connection, id: &str) -> anyhow::Result<Option<Barber>> {
    let result = conn.query_row(
        "SELECT id, name, active FROM barbers WHERE id = ?1",
        params![id],
        |row| {
            Ok(Barber {
                id: row.get(0)?,
                name: row.get(1)?,
                active: row.get::<_, i32>(2)? != 0,
            })
        },
    );

    match result {
        Ok(barber) => Ok(Some(barber)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_barbers(conn: &Connection) -> anyhow::Result<Vec<Barber>> {
    let mut stmt = conn.prepare("SELECT id, name, active FROM barbers ORDER BY name ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(Barber {
            id: row.get(0)?,
            name: row.get(1)?,
            active: row.get::<_, i32>(2)? != 0,
        })
    })?;

    let mut barbers = vec![];
    for row in rows {
        barbers.push(row?);
    }
    Ok(barbers)
}

// ── Services ──

pub fn insert_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, name, duration_minutes, buffer_minutes, active)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            service.id,
            service.name,
            service.duration_minutes,
            service.buffer_minutes,
            service.active as i32,
        ],
    )?;
    Ok(())
}

pub fn get_service(conn: &Connection, id: &str) -> anyhow::Result<Option<Service>> {
    let result = conn.query_row(
        "SELECT id, name, duration_minutes, buffer_minutes, active FROM services WHERE id = ?1",
        params![id],
        |row| {
            Ok(Service {
                id: row.get(0)?,
                name: row.get(1)?,
                duration_minutes: row.get(2)?,
                buffer_minutes: row.get(3)?,
                active: row.get::<_, i32>(4)? != 0,
            })
        },
    );

    match result {
        Ok(service) => Ok(Some(service)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_services(conn: &Connection) -> anyhow::Result<Vec<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, duration_minutes, buffer_minutes, active FROM services ORDER BY name ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Service {
            id: row.get(0)?,
            name: row.get(1)?,
            duration_minutes: row.get(2)?,
            buffer_minutes: row.get(3)?,
            active: row.get::<_, i32>(4)? != 0,
        })
    })?;

    let mut services = vec![];
    for row in rows {
        services.push(row?);
    }
    Ok(services)
}

// ── Availability Rules ──

/// Replaces the active rule for this barber/weekday, if any. The partial
/// unique index on (barber_id, weekday) WHERE active=1 enforces the
/// at-most-one-active-rule invariant.
pub fn upsert_rule(conn: &Connection, rule: &AvailabilityRule) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE availability_rules SET active = 0
         WHERE barber_id = ?1 AND weekday = ?2 AND active = 1",
        params![rule.barber_id, rule.weekday],
    )?;
    conn.execute(
        "INSERT INTO availability_rules
            (id, barber_id, weekday, start_minute, end_minute,
             break_start_minute, break_end_minute, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            rule.id,
            rule.barber_id,
            rule.weekday,
            rule.start_minute,
            rule.end_minute,
            rule.break_start_minute,
            rule.break_end_minute,
            rule.active as i32,
        ],
    )?;
    Ok(())
}

pub fn get_active_rule(
    conn: &Connection,
    barber_id: &str,
    weekday: u32,
) -> anyhow::Result<Option<AvailabilityRule>> {
    let result = conn.query_row(
        "SELECT id, barber_id, weekday, start_minute, end_minute,
                break_start_minute, break_end_minute, active
         FROM availability_rules
         WHERE barber_id = ?1 AND weekday = ?2 AND active = 1
         ORDER BY id ASC LIMIT 1",
        params![barber_id, weekday],
        |row| {
            Ok(AvailabilityRule {
                id: row.get(0)?,
                barber_id: row.get(1)?,
                weekday: row.get(2)?,
                start_minute: row.get(3)?,
                end_minute: row.get(4)?,
                break_start_minute: row.get(5)?,
                break_end_minute: row.get(6)?,
                active: row.get::<_, i32>(7)? != 0,
            })
        },
    );

    match result {
        Ok(rule) => Ok(Some(rule)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Time Off ──

pub fn insert_time_off(conn: &Connection, time_off: &BarberTimeOff) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO barber_time_off (id, barber_id, starts_at, ends_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            time_off.id,
            time_off.barber_id,
            fmt_ts(time_off.starts_at),
            fmt_ts(time_off.ends_at),
        ],
    )?;
    Ok(())
}

pub fn time_off_intervals_between(
    conn: &Connection,
    barber_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> anyhow::Result<Vec<Interval>> {
    let mut stmt = conn.prepare(
        "SELECT starts_at, ends_at FROM barber_time_off
         WHERE barber_id = ?1 AND starts_at < ?2 AND ends_at > ?3
         ORDER BY starts_at ASC",
    )?;
    let rows = stmt.query_map(params![barber_id, fmt_ts(to), fmt_ts(from)], |row| {
        let start: String = row.get(0)?;
        let end: String = row.get(1)?;
        Ok(Interval::new(parse_ts(&start), parse_ts(&end)))
    })?;

    let mut intervals = vec![];
    for row in rows {
        intervals.push(row?);
    }
    Ok(intervals)
}

// ── Time Blocks ──

pub fn insert_time_block(conn: &Connection, block: &TimeBlock) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO time_blocks (id, barber_id, title, start_at, end_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            block.id,
            block.barber_id,
            block.title,
            fmt_ts(block.start_at),
            fmt_ts(block.end_at),
        ],
    )?;
    Ok(())
}

pub fn list_time_blocks(conn: &Connection) -> anyhow::Result<Vec<TimeBlock>> {
    let mut stmt = conn.prepare(
        "SELECT id, barber_id, title, start_at, end_at FROM time_blocks ORDER BY start_at ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        let start: String = row.get(3)?;
        let end: String = row.get(4)?;
        Ok(TimeBlock {
            id: row.get(0)?,
            barber_id: row.get(1)?,
            title: row.get(2)?,
            start_at: parse_ts(&start),
            end_at: parse_ts(&end),
        })
    })?;

    let mut blocks = vec![];
    for row in rows {
        blocks.push(row?);
    }
    Ok(blocks)
}

pub fn delete_time_block(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM time_blocks WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Blocks that apply to this barber: barber-specific plus shop-global rows.
pub fn block_intervals_between(
    conn: &Connection,
    barber_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> anyhow::Result<Vec<Interval>> {
    let mut stmt = conn.prepare(
        "SELECT start_at, end_at FROM time_blocks
         WHERE (barber_id = ?1 OR barber_id IS NULL) AND start_at < ?2 AND end_at > ?3
         ORDER BY start_at ASC",
    )?;
    let rows = stmt.query_map(params![barber_id, fmt_ts(to), fmt_ts(from)], |row| {
        let start: String = row.get(0)?;
        let end: String = row.get(1)?;
        Ok(Interval::new(parse_ts(&start), parse_ts(&end)))
    })?;

    let mut intervals = vec![];
    for row in rows {
        intervals.push(row?);
    }
    Ok(intervals)
}

// ── Clients ──

/// Resolve an existing client by email or create one; the latest contact
/// details win.
pub fn resolve_client(
    conn: &Connection,
    full_name: &str,
    email: &str,
    phone: Option<&str>,
) -> anyhow::Result<Client> {
    conn.execute(
        "INSERT INTO clients (id, full_name, email, phone, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(email) DO UPDATE SET
           full_name = excluded.full_name,
           phone = COALESCE(excluded.phone, clients.phone)",
        params![
            uuid::Uuid::new_v4().to_string(),
            full_name,
            email,
            phone,
            fmt_ts(Utc::now()),
        ],
    )?;

    let client = conn.query_row(
        "SELECT id, full_name, email, phone, created_at FROM clients WHERE email = ?1",
        params![email],
        |row| {
            let created_at: String = row.get(4)?;
            Ok(Client {
                id: row.get(0)?,
                full_name: row.get(1)?,
                email: row.get(2)?,
                phone: row.get(3)?,
                created_at: parse_ts(&created_at),
            })
        },
    )?;
    Ok(client)
}

// ── Bookings ──

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings
            (id, service_id, barber_id, client_id, full_name, email, phone,
             start_at, end_at, status,
             confirm_token_hash, confirm_token_expires_at,
             manage_token_hash, manage_token_expires_at,
             rescheduled_at, original_start_at, original_end_at,
             notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                 ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        params![
            booking.id,
            booking.service_id,
            booking.barber_id,
            booking.client_id,
            booking.full_name,
            booking.email,
            booking.phone,
            fmt_ts(booking.start_at),
            fmt_ts(booking.end_at),
            booking.status.as_str(),
            booking.confirm_token_hash,
            opt_fmt_ts(booking.confirm_token_expires_at),
            booking.manage_token_hash,
            opt_fmt_ts(booking.manage_token_expires_at),
            opt_fmt_ts(booking.rescheduled_at),
            opt_fmt_ts(booking.original_start_at),
            opt_fmt_ts(booking.original_end_at),
            booking.notes,
            fmt_ts(booking.created_at),
            fmt_ts(booking.updated_at),
        ],
    )?;
    Ok(())
}

const BOOKING_COLUMNS: &str = "id, service_id, barber_id, client_id, full_name, email, phone, \
     start_at, end_at, status, \
     confirm_token_hash, confirm_token_expires_at, \
     manage_token_hash, manage_token_expires_at, \
     rescheduled_at, original_start_at, original_end_at, \
     notes, created_at, updated_at";

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let start_at: String = row.get(7)?;
    let end_at: String = row.get(8)?;
    let status: String = row.get(9)?;
    let confirm_expires: Option<String> = row.get(11)?;
    let manage_expires: Option<String> = row.get(13)?;
    let rescheduled_at: Option<String> = row.get(14)?;
    let original_start: Option<String> = row.get(15)?;
    let original_end: Option<String> = row.get(16)?;
    let created_at: String = row.get(18)?;
    let updated_at: String = row.get(19)?;

    Ok(Booking {
        id: row.get(0)?,
        service_id: row.get(1)?,
        barber_id: row.get(2)?,
        client_id: row.get(3)?,
        full_name: row.get(4)?,
        email: row.get(5)?,
        phone: row.get(6)?,
        start_at: parse_ts(&start_at),
        end_at: parse_ts(&end_at),
        status: BookingStatus::parse(&status),
        confirm_token_hash: row.get(10)?,
        confirm_token_expires_at: opt_parse_ts(confirm_expires),
        manage_token_hash: row.get(12)?,
        manage_token_expires_at: opt_parse_ts(manage_expires),
        rescheduled_at: opt_parse_ts(rescheduled_at),
        original_start_at: opt_parse_ts(original_start),
        original_end_at: opt_parse_ts(original_end),
        notes: row.get(17)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1");
    let result = conn.query_row(&sql, params![id], |row| Ok(parse_booking_row(row)));

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn find_by_confirm_hash(conn: &Connection, hash: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE confirm_token_hash = ?1");
    let result = conn.query_row(&sql, params![hash], |row| Ok(parse_booking_row(row)));

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn find_by_manage_hash(conn: &Connection, hash: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE manage_token_hash = ?1");
    let result = conn.query_row(&sql, params![hash], |row| Ok(parse_booking_row(row)));

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Intervals of pending/confirmed bookings for a barber that intersect the
/// given window. `exclude` skips one booking id (a booking being moved does
/// not conflict with itself).
pub fn booking_intervals_between(
    conn: &Connection,
    barber_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    exclude: Option<&str>,
) -> anyhow::Result<Vec<Interval>> {
    let mut stmt = conn.prepare(
        "SELECT start_at, end_at FROM bookings
         WHERE barber_id = ?1
           AND status IN ('pending_confirmation', 'confirmed')
           AND start_at < ?2 AND end_at > ?3
           AND id != ?4
         ORDER BY start_at ASC",
    )?;
    let rows = stmt.query_map(
        params![barber_id, fmt_ts(to), fmt_ts(from), exclude.unwrap_or("")],
        |row| {
            let start: String = row.get(0)?;
            let end: String = row.get(1)?;
            Ok(Interval::new(parse_ts(&start), parse_ts(&end)))
        },
    )?;

    let mut intervals = vec![];
    for row in rows {
        intervals.push(row?);
    }
    Ok(intervals)
}

pub fn list_bookings(
    conn: &Connection,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = ?1
                 ORDER BY start_at DESC LIMIT ?2"
            ),
            vec![
                Box::new(status.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!("SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY start_at DESC LIMIT ?1"),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Batch-expire stale pending holds. Safe to call repeatedly.
pub fn expire_stale_pending(conn: &Connection, now: DateTime<Utc>) -> anyhow::Result<usize> {
    let now_str = fmt_ts(now);
    let count = conn.execute(
        "UPDATE bookings SET status = 'expired', updated_at = ?1
         WHERE status = 'pending_confirmation' AND confirm_token_expires_at < ?1",
        params![now_str],
    )?;
    Ok(count)
}

pub fn mark_expired(conn: &Connection, id: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE bookings SET status = 'expired', updated_at = ?1 WHERE id = ?2",
        params![fmt_ts(now), id],
    )?;
    Ok(())
}

/// pending → confirmed: clears the confirm token fields and installs the
/// manage token in one statement so exactly one hash is ever active.
pub fn confirm_booking(
    conn: &Connection,
    id: &str,
    manage_hash: &str,
    manage_expires: DateTime<Utc>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE bookings SET
            status = 'confirmed',
            confirm_token_hash = NULL,
            confirm_token_expires_at = NULL,
            manage_token_hash = ?1,
            manage_token_expires_at = ?2,
            updated_at = ?3
         WHERE id = ?4",
        params![manage_hash, fmt_ts(manage_expires), fmt_ts(now), id],
    )?;
    Ok(())
}

pub fn set_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn append_note(conn: &Connection, id: &str, note: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE bookings SET notes = CASE
            WHEN notes IS NULL OR notes = '' THEN ?1
            ELSE notes || char(10) || ?1
         END
         WHERE id = ?2",
        params![note, id],
    )?;
    Ok(())
}

/// Moves a confirmed booking to a new interval. `original_start_at` and
/// `original_end_at` keep the first-ever slot: COALESCE only seeds them
/// when they are still NULL. The manage-token expiry follows the new end.
pub fn apply_reschedule(
    conn: &Connection,
    id: &str,
    service_id: &str,
    barber_id: &str,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE bookings SET
            service_id = ?1,
            barber_id = ?2,
            original_start_at = COALESCE(original_start_at, start_at),
            original_end_at = COALESCE(original_end_at, end_at),
            start_at = ?3,
            end_at = ?4,
            manage_token_expires_at = ?4,
            rescheduled_at = ?5,
            updated_at = ?5
         WHERE id = ?6",
        params![
            service_id,
            barber_id,
            fmt_ts(start_at),
            fmt_ts(end_at),
            fmt_ts(now),
            id,
        ],
    )?;
    Ok(())
}
