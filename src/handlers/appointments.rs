use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{Appointment, ContactInfo};
use crate::services::scheduling;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct BookRequest {
    pub barber_id: i64,
    /// `YYYY-MM-DD HH:MM`
    pub start_time: String,
    pub service_ids: Vec<i64>,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
}

#[derive(Serialize)]
pub struct AppointmentResponse {
    pub appointment: Appointment,
}

// POST /api/appointments. Create and confirm in one call.
pub async fn book(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BookRequest>,
) -> Result<Json<AppointmentResponse>, AppError> {
    let start = NaiveDateTime::parse_from_str(&req.start_time, "%Y-%m-%d %H:%M")
        .map_err(|_| AppError::BadRequest(format!("invalid start_time: {}", req.start_time)))?;

    let provider = state
        .directory
        .get(req.barber_id)?
        .ok_or_else(|| AppError::NotFound(format!("barber {}", req.barber_id)))?;

    let contact = ContactInfo {
        name: Some(req.customer_name),
        email: Some(req.customer_email),
        phone: req.customer_phone,
    };

    let appointment = {
        let mut db = state.db.lock().unwrap();
        scheduling::book(&mut db, &provider, start, &req.service_ids, &contact)?
    };

    Ok(Json(AppointmentResponse { appointment }))
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
}

// POST /api/appointments/:id/confirm
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<AppointmentResponse>, AppError> {
    let contact = ContactInfo {
        name: Some(req.customer_name),
        email: Some(req.customer_email),
        phone: req.customer_phone,
    };

    let appointment = {
        let mut db = state.db.lock().unwrap();
        scheduling::confirm(&mut db, &id, &contact)?
    };

    Ok(Json(AppointmentResponse { appointment }))
}

// POST /api/appointments/:id/cancel
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AppointmentResponse>, AppError> {
    let appointment = {
        let mut db = state.db.lock().unwrap();
        scheduling::cancel(&mut db, &id)?
    };

    Ok(Json(AppointmentResponse { appointment }))
}
