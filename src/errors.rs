use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::booking::BookingError;
use crate::services::group::GroupError;
use crate::services::series::SeriesError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error("missing user identity")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code plus HTTP status for each error
    /// kind, so clients can branch without parsing messages.
    fn code_and_status(&self) -> (&'static str, StatusCode) {
        match self {
            AppError::Booking(e) => booking_code(e),
            AppError::Series(e) => series_code(e),
            AppError::Group(e) => group_code(e),
            AppError::Unauthorized => ("unauthorized", StatusCode::UNAUTHORIZED),
            AppError::Forbidden => ("forbidden", StatusCode::FORBIDDEN),
            AppError::NotFound(_) => ("not_found", StatusCode::NOT_FOUND),
            AppError::BadRequest(_) => ("invalid_request", StatusCode::UNPROCESSABLE_ENTITY),
            AppError::Internal(_) => ("internal", StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

/// Code alone, for embedding booking failures inside partial-success
/// payloads (series expansion, group matching).
pub fn booking_error_code(error: &BookingError) -> &'static str {
    booking_code(error).0
}

fn booking_code(error: &BookingError) -> (&'static str, StatusCode) {
    match error {
        BookingError::NotFound => ("booking_not_found", StatusCode::NOT_FOUND),
        BookingError::ServiceNotFound => ("service_not_found", StatusCode::NOT_FOUND),
        BookingError::ServiceInactive => ("service_inactive", StatusCode::CONFLICT),
        BookingError::ProviderNotFound => ("provider_not_found", StatusCode::NOT_FOUND),
        BookingError::ProviderInactive => ("provider_inactive", StatusCode::CONFLICT),
        BookingError::NotAcceptingCustomers => {
            ("provider_not_accepting_customers", StatusCode::CONFLICT)
        }
        BookingError::Closed { .. } => ("closed", StatusCode::CONFLICT),
        BookingError::OutsideHours { .. } => ("outside_hours", StatusCode::CONFLICT),
        BookingError::SlotTaken => ("slot_taken", StatusCode::CONFLICT),
        BookingError::InsufficientTravelTime { .. } => {
            ("insufficient_travel_time", StatusCode::CONFLICT)
        }
        BookingError::NotOwner => ("not_owner", StatusCode::FORBIDDEN),
        BookingError::AlreadyTerminal { .. } => ("already_terminal", StatusCode::CONFLICT),
        BookingError::Transition(_) => ("illegal_transition", StatusCode::CONFLICT),
        BookingError::RescheduleDisabled => ("reschedule_disabled", StatusCode::CONFLICT),
        BookingError::Storage(_) => ("internal", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

fn series_code(error: &SeriesError) -> (&'static str, StatusCode) {
    match error {
        SeriesError::Disabled => ("series_disabled", StatusCode::CONFLICT),
        SeriesError::NotFound => ("series_not_found", StatusCode::NOT_FOUND),
        SeriesError::ProviderNotFound => ("provider_not_found", StatusCode::NOT_FOUND),
        SeriesError::NotOwner => ("not_owner", StatusCode::FORBIDDEN),
        SeriesError::Recurrence(_) => ("invalid_recurrence", StatusCode::UNPROCESSABLE_ENTITY),
        SeriesError::Storage(_) => ("internal", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

fn group_code(error: &GroupError) -> (&'static str, StatusCode) {
    match error {
        GroupError::NotFound => ("group_not_found", StatusCode::NOT_FOUND),
        GroupError::NotOpen => ("group_not_open", StatusCode::CONFLICT),
        GroupError::AlreadyJoined => ("already_joined", StatusCode::CONFLICT),
        GroupError::GroupFull => ("group_full", StatusCode::CONFLICT),
        GroupError::JoinDeadlinePassed => ("join_deadline_passed", StatusCode::CONFLICT),
        GroupError::ParticipantNotFound => ("participant_not_found", StatusCode::NOT_FOUND),
        GroupError::NotOwner => ("not_owner", StatusCode::FORBIDDEN),
        GroupError::InvalidDateRange => ("invalid_date_range", StatusCode::UNPROCESSABLE_ENTITY),
        GroupError::InvalidMaxParticipants => {
            ("invalid_max_participants", StatusCode::UNPROCESSABLE_ENTITY)
        }
        GroupError::Storage(_) => ("internal", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, status) = self.code_and_status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string(), "code": code });
        (status, axum::Json(body)).into_response()
    }
}
