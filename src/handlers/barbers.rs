use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Appointment, Provider};
use crate::services::scheduling;
use crate::state::AppState;

// GET /api/barbers
pub async fn list_barbers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BarbersResponse>, AppError> {
    let barbers = state.directory.list()?;
    Ok(Json(BarbersResponse { barbers }))
}

#[derive(Serialize)]
pub struct BarbersResponse {
    pub barbers: Vec<Provider>,
}

#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: String,
}

// GET /api/barbers/:id/slots?date=YYYY-MM-DD
pub async fn open_slots(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let date = NaiveDate::parse_from_str(&query.date, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("invalid date: {}", query.date)))?;

    let provider = state
        .directory
        .get(id)?
        .ok_or_else(|| AppError::NotFound(format!("barber {id}")))?;

    let slots = {
        let db = state.db.lock().unwrap();
        scheduling::list_open_slots(&db, &provider, date, state.config.slot_granularity_minutes)?
    };

    Ok(Json(SlotsResponse {
        date: query.date,
        slots: slots.iter().map(|s| s.format("%H:%M").to_string()).collect(),
    }))
}

#[derive(Serialize)]
pub struct SlotsResponse {
    pub date: String,
    pub slots: Vec<String>,
}

// GET /api/barbers/:id/appointments
pub async fn upcoming_appointments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AppointmentsResponse>, AppError> {
    state
        .directory
        .get(id)?
        .ok_or_else(|| AppError::NotFound(format!("barber {id}")))?;

    let now = chrono::Utc::now().naive_utc();
    let appointments = {
        let db = state.db.lock().unwrap();
        queries::get_upcoming_for_provider(&db, id, &now)?
    };

    Ok(Json(AppointmentsResponse { appointments }))
}

#[derive(Serialize)]
pub struct AppointmentsResponse {
    pub appointments: Vec<Appointment>,
}
