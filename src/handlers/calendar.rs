use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::actor_id;
use crate::services::booking::get_booking_for_actor;
use crate::services::calendar::generate_ics;
use crate::state::AppState;

// GET /api/bookings/:id/calendar.ics
pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let actor = actor_id(&headers)?;

    let (booking, provider_name, service_name) = {
        let db = state.db.lock().unwrap();
        let booking = get_booking_for_actor(&db, &booking_id, &actor)?;
        let provider_name = queries::get_provider(&db, &booking.provider_id)?
            .map(|p| p.name)
            .unwrap_or_else(|| "your provider".to_string());
        let service_name = queries::get_service(&db, &booking.service_id)?
            .map(|s| s.name)
            .unwrap_or_else(|| "Appointment".to_string());
        (booking, provider_name, service_name)
    };

    let ics = generate_ics(&booking, &provider_name, &service_name);
    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"booking.ics\"",
            ),
        ],
        ics,
    )
        .into_response())
}
