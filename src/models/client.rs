use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resolved or created from the contact email at booking time; there are no
/// client accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}
