use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Accepts the canonical `YYYY-MM-DD` or the localized `DD/MM/YYYY` form.
/// chrono rejects impossible calendar dates (e.g. 31/02/2026).
pub fn normalize_date(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(input, "%d/%m/%Y"))
        .ok()
}

/// "HH:MM" → minute of the civil day.
pub fn parse_clock_label(s: &str) -> Option<u32> {
    let (hour, minute) = s.split_once(':')?;
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(hour * 60 + minute)
}

/// Interprets a civil date + minute-of-day in the shop timezone and returns
/// the absolute instant. The offset is derived at the resulting instant, so
/// the conversion is correct across DST transitions.
///
/// DST policy: a wall-clock time skipped by spring-forward does not exist
/// and yields None; a time repeated by fall-back resolves to the earlier
/// offset.
pub fn civil_to_instant(date: NaiveDate, minute_of_day: u32, tz: Tz) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_num_seconds_from_midnight_opt(minute_of_day * 60, 0)?;
    match tz.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// The civil calendar date this instant falls on in the shop timezone.
pub fn civil_date_of(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

pub fn minute_of_day(instant: DateTime<Utc>, tz: Tz) -> u32 {
    let local = instant.with_timezone(&tz);
    local.hour() * 60 + local.minute()
}

/// Local wall-clock "HH:MM", the label shown for an offerable slot.
pub fn clock_label(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format("%H:%M").to_string()
}

/// Local "YYYY-MM-DD HH:MM", used in notification copy.
pub fn local_datetime_label(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

/// Shop-civil weekday, 0=Sunday..6=Saturday.
pub fn weekday_of(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}
