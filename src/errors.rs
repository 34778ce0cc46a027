use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Outcomes of the scheduling core. Everything user-recoverable carries a
/// message the dialogue layer can re-prompt with.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("that time is outside working hours. Hours: {hours}")]
    SlotUnavailable { hours: String },

    #[error("that time slot is already booked")]
    SlotConflict,

    #[error("reservation not found: {0}")]
    ReservationNotFound(String),

    #[error("invalid contact details: {0}")]
    InvalidContact(String),

    #[error("could not extract booking details")]
    ExtractionFailed,

    #[error("concurrent update lost, please retry")]
    PersistenceConflict,

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Booking(e) => match e {
                BookingError::Validation(_) | BookingError::InvalidContact(_) => {
                    StatusCode::BAD_REQUEST
                }
                BookingError::SlotUnavailable { .. }
                | BookingError::SlotConflict
                | BookingError::PersistenceConflict => StatusCode::CONFLICT,
                BookingError::ReservationNotFound(_) => StatusCode::NOT_FOUND,
                BookingError::ExtractionFailed => StatusCode::BAD_GATEWAY,
                BookingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
