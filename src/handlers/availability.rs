use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::{actor_id, fmt_time, parse_date, parse_time};
use crate::models::{AvailabilityException, DayHours, WeeklyHours};
use crate::services::slots;
use crate::state::AppState;

// GET /api/providers/:id/slots
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub service_id: String,
    pub date: String,
    pub step: Option<i32>,
}

#[derive(Serialize)]
pub struct SlotResponse {
    start_time: String,
    end_time: String,
    is_available: bool,
}

pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Vec<SlotResponse>>, AppError> {
    let date = parse_date(&query.date)?;
    let step = query.step.unwrap_or(state.config.slot_step_minutes);
    if step <= 0 {
        return Err(AppError::BadRequest("step must be positive".to_string()));
    }

    let slots = {
        let db = state.db.lock().unwrap();
        slots::slots_for_date(
            &db,
            &provider_id,
            &query.service_id,
            &date,
            step,
            Utc::now().naive_utc(),
        )?
    };

    Ok(Json(
        slots
            .into_iter()
            .map(|s| SlotResponse {
                start_time: fmt_time(&s.start_time),
                end_time: fmt_time(&s.end_time),
                is_available: s.is_available,
            })
            .collect(),
    ))
}

// GET /api/providers/:id/schedule
#[derive(Serialize)]
pub struct ScheduleDayResponse {
    weekday: u32,
    closed: bool,
    opens_at: Option<String>,
    closes_at: Option<String>,
}

pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<String>,
) -> Result<Json<Vec<ScheduleDayResponse>>, AppError> {
    let schedule = {
        let db = state.db.lock().unwrap();
        queries::get_weekly_hours(&db, &provider_id)?
    };

    Ok(Json(
        schedule
            .into_iter()
            .map(|row| ScheduleDayResponse {
                weekday: row.weekday,
                closed: row.hours.is_none(),
                opens_at: row.hours.map(|h| fmt_time(&h.opens_at)),
                closes_at: row.hours.map(|h| fmt_time(&h.closes_at)),
            })
            .collect(),
    ))
}

// PUT /api/providers/:id/schedule
#[derive(Deserialize)]
pub struct ScheduleDayRequest {
    pub weekday: u32,
    #[serde(default)]
    pub closed: bool,
    pub opens_at: Option<String>,
    pub closes_at: Option<String>,
}

pub async fn put_schedule(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<String>,
    headers: HeaderMap,
    Json(days): Json<Vec<ScheduleDayRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    if actor_id(&headers)? != provider_id {
        return Err(AppError::Forbidden);
    }

    let mut rows = Vec::with_capacity(days.len());
    for day in &days {
        if day.weekday > 6 {
            return Err(AppError::BadRequest(format!(
                "weekday out of range: {}",
                day.weekday
            )));
        }
        rows.push(WeeklyHours {
            provider_id: provider_id.clone(),
            weekday: day.weekday,
            hours: day_hours(day.closed, day.opens_at.as_deref(), day.closes_at.as_deref())?,
        });
    }

    {
        let db = state.db.lock().unwrap();
        for row in &rows {
            queries::upsert_weekly_hours(&db, row)?;
        }
    }
    Ok(Json(serde_json::json!({ "updated": rows.len() })))
}

// PUT /api/providers/:id/exceptions/:date
#[derive(Deserialize)]
pub struct ExceptionRequest {
    #[serde(default)]
    pub closed: bool,
    pub opens_at: Option<String>,
    pub closes_at: Option<String>,
    pub reason: Option<String>,
}

pub async fn put_exception(
    State(state): State<Arc<AppState>>,
    Path((provider_id, date)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<ExceptionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if actor_id(&headers)? != provider_id {
        return Err(AppError::Forbidden);
    }
    let date = parse_date(&date)?;

    let exception = AvailabilityException {
        provider_id,
        date,
        hours: day_hours(req.closed, req.opens_at.as_deref(), req.closes_at.as_deref())?,
        reason: req.reason,
    };
    {
        let db = state.db.lock().unwrap();
        queries::upsert_exception(&db, &exception)?;
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn delete_exception(
    State(state): State<Arc<AppState>>,
    Path((provider_id, date)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    if actor_id(&headers)? != provider_id {
        return Err(AppError::Forbidden);
    }
    let date = parse_date(&date)?;

    let deleted = {
        let db = state.db.lock().unwrap();
        queries::delete_exception(&db, &provider_id, &date)?
    };
    if !deleted {
        return Err(AppError::NotFound(format!("no exception on {date}")));
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

fn day_hours(
    closed: bool,
    opens_at: Option<&str>,
    closes_at: Option<&str>,
) -> Result<Option<DayHours>, AppError> {
    if closed {
        return Ok(None);
    }
    match (opens_at, closes_at) {
        (Some(open), Some(close)) => {
            let opens_at = parse_time(open)?;
            let closes_at = parse_time(close)?;
            if opens_at >= closes_at {
                return Err(AppError::BadRequest(
                    "opening time must be before closing time".to_string(),
                ));
            }
            Ok(Some(DayHours { opens_at, closes_at }))
        }
        _ => Err(AppError::BadRequest(
            "open days need both opens_at and closes_at".to_string(),
        )),
    }
}
