use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::handlers::bookings::BookingResponse;
use crate::handlers::{actor_id, fmt_date, parse_date, parse_time};
use crate::models::{IntervalUnit, Recurrence};
use crate::services::series::{self, SeriesPolicy};
use crate::state::AppState;

// POST /api/series
#[derive(Deserialize)]
pub struct CreateSeriesRequest {
    pub provider_id: String,
    pub service_id: String,
    pub start_date: String,
    pub start_time: String,
    pub interval_unit: String,
    pub interval_count: u32,
    pub occurrences: Option<u32>,
    pub end_date: Option<String>,
    pub horse_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Serialize)]
pub struct OccurrenceErrorResponse {
    date: String,
    error: String,
    code: String,
}

#[derive(Serialize)]
pub struct SeriesResponse {
    series_id: String,
    status: String,
    bookings_created: usize,
    bookings: Vec<BookingResponse>,
    errors: Vec<OccurrenceErrorResponse>,
}

pub async fn create_series(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateSeriesRequest>,
) -> Result<(StatusCode, Json<SeriesResponse>), AppError> {
    let customer_id = actor_id(&headers)?;
    let interval_unit = match req.interval_unit.as_str() {
        "day" => IntervalUnit::Day,
        "week" => IntervalUnit::Week,
        other => {
            return Err(AppError::BadRequest(format!(
                "unknown interval unit: {other}"
            )))
        }
    };
    let create = series::CreateSeries {
        customer_id,
        provider_id: req.provider_id,
        service_id: req.service_id,
        start_date: parse_date(&req.start_date)?,
        start_time: parse_time(&req.start_time)?,
        recurrence: Recurrence {
            interval_unit,
            interval_count: req.interval_count,
            occurrences: req.occurrences,
            end_date: req.end_date.as_deref().map(parse_date).transpose()?,
        },
        horse_name: req.horse_name,
        notes: req.notes,
        visit: None,
    };
    let policy = SeriesPolicy {
        enabled: state.config.series_enabled,
        default_max_occurrences: state.config.max_series_occurrences,
    };

    let outcome = {
        let mut db = state.db.lock().unwrap();
        series::create_series(&mut db, state.travel.as_deref(), &policy, &create)?
    };

    let errors = outcome
        .errors
        .into_iter()
        .map(|e| OccurrenceErrorResponse {
            date: fmt_date(&e.date),
            error: e.error.to_string(),
            code: crate::errors::booking_error_code(&e.error).to_string(),
        })
        .collect();

    Ok((
        StatusCode::CREATED,
        Json(SeriesResponse {
            series_id: outcome.series.id,
            status: outcome.series.status.as_str().to_string(),
            bookings_created: outcome.bookings.len(),
            bookings: outcome.bookings.into_iter().map(Into::into).collect(),
            errors,
        }),
    ))
}

// POST /api/series/:id/cancel
#[derive(Serialize)]
pub struct CancelSeriesResponse {
    cancelled: usize,
}

pub async fn cancel_series(
    State(state): State<Arc<AppState>>,
    Path(series_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CancelSeriesResponse>, AppError> {
    let actor = actor_id(&headers)?;
    let cancelled = {
        let mut db = state.db.lock().unwrap();
        series::cancel_series(&mut db, &series_id, &actor)?
    };
    Ok(Json(CancelSeriesResponse { cancelled }))
}
