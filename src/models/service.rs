use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub duration_minutes: u32,
    /// Service-specific buffer override; None falls back to the shop default.
    pub buffer_minutes: Option<u32>,
    pub active: bool,
}
