pub mod availability;
pub mod bookings;
pub mod calendar;
pub mod groups;
pub mod health;
pub mod series;

use axum::http::HeaderMap;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::errors::AppError;

/// The acting user, injected upstream by the (out-of-scope) auth
/// layer. The core only matches it against ownership columns.
pub(crate) fn actor_id(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(AppError::Unauthorized)
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("invalid date: {s}")))
}

pub(crate) fn parse_time(s: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| AppError::BadRequest(format!("invalid time: {s}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<NaiveDateTime, AppError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map_err(|_| AppError::BadRequest(format!("invalid datetime: {s}")))
}

pub(crate) fn fmt_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub(crate) fn fmt_time(t: &NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

pub(crate) fn fmt_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}
