use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::handlers::{actor_id, fmt_date, fmt_datetime, fmt_time, parse_date, parse_time};
use crate::models::{Booking, Coordinates};
use crate::services::booking;
use crate::state::AppState;

#[derive(Serialize)]
pub struct BookingResponse {
    id: String,
    customer_id: String,
    provider_id: String,
    service_id: String,
    date: String,
    start_time: String,
    end_time: String,
    status: String,
    horse_name: Option<String>,
    notes: Option<String>,
    booking_series_id: Option<String>,
    reschedule_count: i32,
    created_at: String,
    updated_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            customer_id: b.customer_id,
            provider_id: b.provider_id,
            service_id: b.service_id,
            date: fmt_date(&b.booking_date),
            start_time: fmt_time(&b.start_time),
            end_time: fmt_time(&b.end_time),
            status: b.status.as_str().to_string(),
            horse_name: b.horse_name,
            notes: b.notes,
            booking_series_id: b.booking_series_id,
            reschedule_count: b.reschedule_count,
            created_at: fmt_datetime(&b.created_at),
            updated_at: fmt_datetime(&b.updated_at),
        }
    }
}

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub provider_id: String,
    pub service_id: String,
    pub date: String,
    pub start_time: String,
    pub horse_name: Option<String>,
    pub notes: Option<String>,
    pub visit_lat: Option<f64>,
    pub visit_lng: Option<f64>,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let customer_id = actor_id(&headers)?;
    let create = booking::CreateBooking {
        customer_id,
        provider_id: req.provider_id,
        service_id: req.service_id,
        date: parse_date(&req.date)?,
        start_time: parse_time(&req.start_time)?,
        horse_name: req.horse_name,
        notes: req.notes,
        visit: coordinates(req.visit_lat, req.visit_lng),
    };

    let booking = {
        let mut db = state.db.lock().unwrap();
        booking::create_booking(&mut db, state.travel.as_deref(), &create)?
    };
    Ok((StatusCode::CREATED, Json(booking.into())))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = actor_id(&headers)?;
    let booking = {
        let db = state.db.lock().unwrap();
        booking::get_booking_for_actor(&db, &booking_id, &actor)?
    };
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/reschedule
#[derive(Deserialize)]
pub struct RescheduleRequest {
    pub date: String,
    pub start_time: String,
}

pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<RescheduleRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let customer_id = actor_id(&headers)?;
    let reschedule = booking::RescheduleBooking {
        booking_id,
        customer_id,
        new_date: parse_date(&req.date)?,
        new_start_time: parse_time(&req.start_time)?,
    };

    let booking = {
        let mut db = state.db.lock().unwrap();
        booking::reschedule_booking(&mut db, state.travel.as_deref(), &reschedule)?
    };
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = actor_id(&headers)?;
    let booking = {
        let db = state.db.lock().unwrap();
        booking::cancel_booking(&db, &booking_id, &actor)?
    };
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/confirm
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = actor_id(&headers)?;
    let booking = {
        let db = state.db.lock().unwrap();
        booking::confirm_booking(&db, &booking_id, &actor)?
    };
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/complete
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<BookingResponse>, AppError> {
    let actor = actor_id(&headers)?;
    let booking = {
        let db = state.db.lock().unwrap();
        booking::complete_booking(&db, &booking_id, &actor)?
    };
    Ok(Json(booking.into()))
}

fn coordinates(lat: Option<f64>, lng: Option<f64>) -> Option<Coordinates> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
        _ => None,
    }
}
