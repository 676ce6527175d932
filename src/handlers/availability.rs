use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::services::slots;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub service_id: String,
    pub barber_id: String,
    pub date: String,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub date: String,
    pub slots: Vec<String>,
}

// GET /api/availability
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let slots = {
        let db = state.db.lock().unwrap();
        slots::available_slots(&db, &query.service_id, &query.barber_id, &query.date)?
    };

    Ok(Json(AvailabilityResponse {
        date: query.date,
        slots,
    }))
}
