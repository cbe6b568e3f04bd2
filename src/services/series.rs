use anyhow::Context;
use chrono::{NaiveDate, NaiveTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::db::queries;
use crate::models::{Booking, BookingSeries, Coordinates, Recurrence, RecurrenceError, SeriesStatus};
use crate::services::booking::{self, BookingError, CreateBooking};
use crate::services::travel::TravelEstimator;

#[derive(Debug, thiserror::Error)]
pub enum SeriesError {
    #[error("recurring bookings are not enabled")]
    Disabled,
    #[error("series not found")]
    NotFound,
    #[error("provider not found")]
    ProviderNotFound,
    #[error("not allowed to modify this series")]
    NotOwner,
    #[error(transparent)]
    Recurrence(#[from] RecurrenceError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Feature gate and limits for recurring bookings, resolved from
/// configuration by the caller.
#[derive(Debug, Clone, Copy)]
pub struct SeriesPolicy {
    pub enabled: bool,
    pub default_max_occurrences: u32,
}

#[derive(Debug, Clone)]
pub struct CreateSeries {
    pub customer_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub recurrence: Recurrence,
    pub horse_name: Option<String>,
    pub notes: Option<String>,
    pub visit: Option<Coordinates>,
}

#[derive(Debug)]
pub struct OccurrenceError {
    pub date: NaiveDate,
    pub error: BookingError,
}

#[derive(Debug)]
pub struct SeriesOutcome {
    pub series: BookingSeries,
    pub bookings: Vec<Booking>,
    pub errors: Vec<OccurrenceError>,
}

/// Expands a recurrence eagerly into member bookings, one create per
/// occurrence date. A failed occurrence (closed day, taken slot, ...)
/// is recorded and skipped; the rest are still attempted. The member
/// creates are deliberately independent transactions so one bad date
/// cannot roll back its siblings.
pub fn create_series(
    conn: &mut Connection,
    travel: Option<&dyn TravelEstimator>,
    policy: &SeriesPolicy,
    req: &CreateSeries,
) -> Result<SeriesOutcome, SeriesError> {
    if !policy.enabled {
        return Err(SeriesError::Disabled);
    }

    let provider =
        queries::get_provider(conn, &req.provider_id)?.ok_or(SeriesError::ProviderNotFound)?;
    let max = provider
        .max_series_occurrences
        .unwrap_or(policy.default_max_occurrences) as usize;
    let dates = req.recurrence.expand(req.start_date, max)?;

    let now = Utc::now().naive_utc();
    let series = BookingSeries {
        id: Uuid::new_v4().to_string(),
        customer_id: req.customer_id.clone(),
        provider_id: req.provider_id.clone(),
        service_id: req.service_id.clone(),
        start_date: req.start_date,
        start_time: req.start_time,
        recurrence: req.recurrence,
        status: SeriesStatus::Active,
        created_at: now,
        updated_at: now,
    };
    queries::insert_series(conn, &series)?;

    let mut bookings = Vec::new();
    let mut errors = Vec::new();
    for date in dates {
        let create = CreateBooking {
            customer_id: req.customer_id.clone(),
            provider_id: req.provider_id.clone(),
            service_id: req.service_id.clone(),
            date,
            start_time: req.start_time,
            horse_name: req.horse_name.clone(),
            notes: req.notes.clone(),
            visit: req.visit,
        };
        match booking::create_booking_in_series(conn, travel, &create, &series.id) {
            Ok(booking) => bookings.push(booking),
            Err(error) => {
                tracing::warn!(series_id = %series.id, date = %date, %error, "series occurrence skipped");
                errors.push(OccurrenceError { date, error });
            }
        }
    }

    tracing::info!(
        series_id = %series.id,
        created = bookings.len(),
        skipped = errors.len(),
        "booking series expanded"
    );
    Ok(SeriesOutcome {
        series,
        bookings,
        errors,
    })
}

/// Cancels a whole series: every member the transition table still
/// allows to be cancelled is cancelled, terminal members stay as they
/// are, and the series itself is marked cancelled. Returns how many
/// members were actually cancelled.
pub fn cancel_series(
    conn: &mut Connection,
    series_id: &str,
    actor_id: &str,
) -> Result<usize, SeriesError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to begin series cancel transaction")?;

    let series = queries::get_series(&tx, series_id)?.ok_or(SeriesError::NotFound)?;
    if series.customer_id != actor_id && series.provider_id != actor_id {
        return Err(SeriesError::NotOwner);
    }

    let cancelled = queries::cancel_series_members(&tx, series_id)?;
    queries::update_series_status(&tx, series_id, SeriesStatus::Cancelled)?;
    tx.commit().context("failed to commit series cancel")?;

    tracing::info!(series_id, cancelled, "booking series cancelled");
    Ok(cancelled)
}
