use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Engine-level failures. Display strings are short and safe to show to a
/// client directly.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("This booking link is not valid.")]
    InvalidToken,

    #[error("This booking link has expired.")]
    TokenExpired,

    #[error("This booking has already been cancelled or has expired.")]
    AlreadyCancelled,

    #[error("This booking can no longer be changed online. Please contact the shop.")]
    WindowPassed,

    #[error("This slot is no longer available.")]
    SlotUnavailable,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Booking(e) => match e {
                BookingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                BookingError::InvalidToken => StatusCode::NOT_FOUND,
                BookingError::TokenExpired => StatusCode::GONE,
                BookingError::AlreadyCancelled => StatusCode::CONFLICT,
                BookingError::WindowPassed => StatusCode::UNPROCESSABLE_ENTITY,
                BookingError::SlotUnavailable => StatusCode::CONFLICT,
                BookingError::NotFound(_) => StatusCode::NOT_FOUND,
                BookingError::Database(_) | BookingError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal detail goes to the log, never to the client.
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            let body = serde_json::json!({ "error": "internal error" });
            return (status, axum::Json(body)).into_response();
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(
            BookingError::SlotUnavailable.to_string(),
            "This slot is no longer available."
        );
        assert_eq!(
            BookingError::InvalidInput("Invalid date.".to_string()).to_string(),
            "Invalid date."
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Booking(BookingError::SlotUnavailable).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Booking(BookingError::InvalidToken).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Booking(BookingError::TokenExpired).status(),
            StatusCode::GONE
        );
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }
}
