use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weekly opening hours for one barber on one weekday (0=Sunday..6=Saturday).
/// Minutes are counted from civil midnight in the shop timezone. At most one
/// active rule exists per (barber, weekday); the database enforces this with
/// a partial unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: String,
    pub barber_id: String,
    pub weekday: u32,
    pub start_minute: u32,
    pub end_minute: u32,
    pub break_start_minute: Option<u32>,
    pub break_end_minute: Option<u32>,
    pub active: bool,
}

/// Hard block: no slot may overlap it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarberTimeOff {
    pub id: String,
    pub barber_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Ad-hoc operator block (lunch, holiday, quick-block). A None barber_id
/// applies to every barber of the shop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBlock {
    pub id: String,
    pub barber_id: Option<String>,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}
