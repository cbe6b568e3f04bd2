use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::db::queries;
use crate::models::{Booking, BookingStatus, Coordinates, DayHours, InvalidTransition, Provider};
use crate::services::slots::effective_hours;
use crate::services::travel::TravelEstimator;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("booking not found")]
    NotFound,
    #[error("service not found")]
    ServiceNotFound,
    #[error("service is not currently offered")]
    ServiceInactive,
    #[error("provider not found")]
    ProviderNotFound,
    #[error("provider is not taking bookings")]
    ProviderInactive,
    #[error("provider is not accepting new customers")]
    NotAcceptingCustomers,
    #[error("provider is closed on {date}")]
    Closed { date: NaiveDate },
    #[error("requested time is outside opening hours ({opens_at} to {closes_at})")]
    OutsideHours {
        opens_at: NaiveTime,
        closes_at: NaiveTime,
    },
    #[error("that time slot is already booked")]
    SlotTaken,
    #[error("not enough travel time next to a neighbouring booking ({required_minutes} min needed, {gap_minutes} min free)")]
    InsufficientTravelTime {
        required_minutes: i64,
        gap_minutes: i64,
    },
    #[error("not allowed to modify this booking")]
    NotOwner,
    #[error("booking is already {status}")]
    AlreadyTerminal { status: BookingStatus },
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
    #[error("provider does not allow rescheduling")]
    RescheduleDisabled,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct CreateBooking {
    pub customer_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub horse_name: Option<String>,
    pub notes: Option<String>,
    pub visit: Option<Coordinates>,
}

#[derive(Debug, Clone)]
pub struct RescheduleBooking {
    pub booking_id: String,
    pub customer_id: String,
    pub new_date: NaiveDate,
    pub new_start_time: NaiveTime,
}

/// Creates a booking after re-validating everything against live data.
/// Slot grids shown earlier are advisory; this is the authoritative
/// check. The overlap test and the insert share one IMMEDIATE
/// transaction, so of two concurrent calls for the same slot at most
/// one can commit.
pub fn create_booking(
    conn: &mut Connection,
    travel: Option<&dyn TravelEstimator>,
    req: &CreateBooking,
) -> Result<Booking, BookingError> {
    create_booking_inner(conn, travel, req, None)
}

pub(crate) fn create_booking_in_series(
    conn: &mut Connection,
    travel: Option<&dyn TravelEstimator>,
    req: &CreateBooking,
    series_id: &str,
) -> Result<Booking, BookingError> {
    create_booking_inner(conn, travel, req, Some(series_id))
}

fn create_booking_inner(
    conn: &mut Connection,
    travel: Option<&dyn TravelEstimator>,
    req: &CreateBooking,
    series_id: Option<&str>,
) -> Result<Booking, BookingError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to begin booking transaction")?;

    let service =
        queries::get_service(&tx, &req.service_id)?.ok_or(BookingError::ServiceNotFound)?;
    if service.provider_id != req.provider_id {
        return Err(BookingError::ServiceNotFound);
    }
    if !service.is_active {
        return Err(BookingError::ServiceInactive);
    }

    let provider =
        queries::get_provider(&tx, &req.provider_id)?.ok_or(BookingError::ProviderNotFound)?;
    if !provider.is_active {
        return Err(BookingError::ProviderInactive);
    }
    if !provider.accepting_new_customers {
        return Err(BookingError::NotAcceptingCustomers);
    }

    let hours = effective_hours(&tx, &req.provider_id, &req.date)?
        .ok_or(BookingError::Closed { date: req.date })?;
    let end_time = window_within_hours(req.start_time, service.duration_minutes, &hours)?;

    let existing = queries::get_active_bookings_for_day(&tx, &req.provider_id, &req.date)?;
    if existing.iter().any(|b| b.overlaps(req.start_time, end_time)) {
        return Err(BookingError::SlotTaken);
    }

    check_travel_buffer(
        &provider,
        travel,
        &existing,
        None,
        req.start_time,
        end_time,
        req.visit,
    )?;

    let now = Utc::now().naive_utc();
    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        customer_id: req.customer_id.clone(),
        provider_id: req.provider_id.clone(),
        service_id: req.service_id.clone(),
        booking_date: req.date,
        start_time: req.start_time,
        end_time,
        status: BookingStatus::Pending,
        horse_name: req.horse_name.clone(),
        notes: req.notes.clone(),
        booking_series_id: series_id.map(str::to_string),
        reschedule_count: 0,
        visit_lat: req.visit.map(|c| c.lat),
        visit_lng: req.visit.map(|c| c.lng),
        created_at: now,
        updated_at: now,
    };
    queries::insert_booking(&tx, &booking)?;
    tx.commit().context("failed to commit booking")?;

    tracing::info!(
        booking_id = %booking.id,
        provider_id = %booking.provider_id,
        date = %booking.booking_date,
        "booking created"
    );
    Ok(booking)
}

/// Moves a booking to a new date and time, re-running the same checks
/// as creation against the new slot (minus the booking's own row). A
/// booking that does not exist and a booking owned by someone else
/// both come back as `NotFound`.
pub fn reschedule_booking(
    conn: &mut Connection,
    travel: Option<&dyn TravelEstimator>,
    req: &RescheduleBooking,
) -> Result<Booking, BookingError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to begin reschedule transaction")?;

    let booking = queries::get_booking_for_customer(&tx, &req.booking_id, &req.customer_id)?
        .ok_or(BookingError::NotFound)?;
    if booking.status.is_terminal() {
        return Err(BookingError::AlreadyTerminal {
            status: booking.status,
        });
    }

    let provider = queries::get_provider(&tx, &booking.provider_id)?
        .ok_or(BookingError::ProviderNotFound)?;
    if !provider.reschedule_enabled {
        return Err(BookingError::RescheduleDisabled);
    }

    let service =
        queries::get_service(&tx, &booking.service_id)?.ok_or(BookingError::ServiceNotFound)?;

    let hours = effective_hours(&tx, &booking.provider_id, &req.new_date)?
        .ok_or(BookingError::Closed { date: req.new_date })?;
    let new_end = window_within_hours(req.new_start_time, service.duration_minutes, &hours)?;

    let existing = queries::get_active_bookings_for_day(&tx, &booking.provider_id, &req.new_date)?;
    if existing
        .iter()
        .any(|b| b.id != booking.id && b.overlaps(req.new_start_time, new_end))
    {
        return Err(BookingError::SlotTaken);
    }

    check_travel_buffer(
        &provider,
        travel,
        &existing,
        Some(&booking.id),
        req.new_start_time,
        new_end,
        booking.visit_coordinates(),
    )?;

    let new_status = if provider.reschedule_requires_reapproval {
        booking.status.reapproval_reset().unwrap_or(booking.status)
    } else {
        booking.status
    };

    let updated = queries::apply_reschedule(
        &tx,
        &booking.id,
        &req.customer_id,
        &req.new_date,
        &req.new_start_time,
        &new_end,
        new_status,
    )?;
    if !updated {
        return Err(BookingError::NotFound);
    }
    let result = queries::get_booking(&tx, &booking.id)?.ok_or(BookingError::NotFound)?;
    tx.commit().context("failed to commit reschedule")?;

    tracing::info!(
        booking_id = %result.id,
        date = %result.booking_date,
        reschedule_count = result.reschedule_count,
        "booking rescheduled"
    );
    Ok(result)
}

/// Cancels a booking on behalf of its customer or its provider. Once
/// cancelled, the interval stops blocking new bookings.
pub fn cancel_booking(
    conn: &Connection,
    booking_id: &str,
    actor_id: &str,
) -> Result<Booking, BookingError> {
    apply_status_change(conn, booking_id, actor_id, true, BookingStatus::Cancelled)
}

/// Provider accepts a pending booking.
pub fn confirm_booking(
    conn: &Connection,
    booking_id: &str,
    provider_id: &str,
) -> Result<Booking, BookingError> {
    apply_status_change(conn, booking_id, provider_id, false, BookingStatus::Confirmed)
}

/// Provider marks a confirmed booking as done.
pub fn complete_booking(
    conn: &Connection,
    booking_id: &str,
    provider_id: &str,
) -> Result<Booking, BookingError> {
    apply_status_change(conn, booking_id, provider_id, false, BookingStatus::Completed)
}

/// Booking detail, visible to either party of the appointment. Anyone
/// else gets `NotFound`, same as a booking that does not exist.
pub fn get_booking_for_actor(
    conn: &Connection,
    booking_id: &str,
    actor_id: &str,
) -> Result<Booking, BookingError> {
    queries::get_booking_for_party(conn, booking_id, actor_id)?.ok_or(BookingError::NotFound)
}

/// One conditional UPDATE whose predicate carries ownership and the
/// legal source statuses; a miss is then classified by a secondary
/// read purely to pick the right error.
fn apply_status_change(
    conn: &Connection,
    booking_id: &str,
    actor_id: &str,
    customer_may_act: bool,
    target: BookingStatus,
) -> Result<Booking, BookingError> {
    let changed =
        queries::transition_booking_status(conn, booking_id, actor_id, customer_may_act, target)?;
    if changed {
        let booking = queries::get_booking(conn, booking_id)?.ok_or(BookingError::NotFound)?;
        tracing::info!(booking_id, status = %target, "booking status changed");
        return Ok(booking);
    }

    let booking = queries::get_booking(conn, booking_id)?.ok_or(BookingError::NotFound)?;
    let authorized = if customer_may_act {
        booking.customer_id == actor_id || booking.provider_id == actor_id
    } else {
        booking.provider_id == actor_id
    };
    if !authorized {
        return Err(BookingError::NotOwner);
    }
    if booking.status.is_terminal() {
        return Err(BookingError::AlreadyTerminal {
            status: booking.status,
        });
    }
    match booking.status.transition_to(target) {
        Err(e) => Err(e.into()),
        // Legal and authorized would have updated; the row must have
        // changed between the UPDATE and the read.
        Ok(_) => Err(BookingError::Storage(anyhow::anyhow!(
            "booking {booking_id} changed concurrently"
        ))),
    }
}

fn window_within_hours(
    start: NaiveTime,
    duration_minutes: i32,
    hours: &DayHours,
) -> Result<NaiveTime, BookingError> {
    let (end, wrapped) = start.overflowing_add_signed(Duration::minutes(i64::from(duration_minutes)));
    if wrapped != 0 || start < hours.opens_at || end > hours.closes_at {
        return Err(BookingError::OutsideHours {
            opens_at: hours.opens_at,
            closes_at: hours.closes_at,
        });
    }
    Ok(end)
}

/// Travel buffer between the new slot and its chronological neighbours
/// on the same day. Only enforced for providers that require it; when
/// locations are unknown there is nothing to measure and the check is
/// skipped with a warning.
fn check_travel_buffer(
    provider: &Provider,
    travel: Option<&dyn TravelEstimator>,
    existing: &[Booking],
    exclude_id: Option<&str>,
    start: NaiveTime,
    end: NaiveTime,
    visit: Option<Coordinates>,
) -> Result<(), BookingError> {
    if !provider.requires_travel_buffer {
        return Ok(());
    }
    let estimator = travel.ok_or_else(|| {
        BookingError::Storage(anyhow::anyhow!(
            "provider {} requires a travel buffer but no travel estimator is configured",
            provider.id
        ))
    })?;
    let location = match visit.or_else(|| provider.base_coordinates()) {
        Some(location) => location,
        None => {
            tracing::warn!(
                provider_id = %provider.id,
                "no coordinates for the new booking, skipping travel buffer check"
            );
            return Ok(());
        }
    };

    let neighbours: Vec<&Booking> = existing
        .iter()
        .filter(|b| Some(b.id.as_str()) != exclude_id)
        .collect();
    let previous = neighbours
        .iter()
        .filter(|b| b.end_time <= start)
        .max_by_key(|b| b.end_time);
    let next = neighbours
        .iter()
        .filter(|b| b.start_time >= end)
        .min_by_key(|b| b.start_time);

    if let Some(previous) = previous {
        let gap = (start - previous.end_time).num_minutes();
        ensure_travel_gap(estimator, provider, previous, location, gap)?;
    }
    if let Some(next) = next {
        let gap = (next.start_time - end).num_minutes();
        ensure_travel_gap(estimator, provider, next, location, gap)?;
    }
    Ok(())
}

fn ensure_travel_gap(
    estimator: &dyn TravelEstimator,
    provider: &Provider,
    neighbour: &Booking,
    location: Coordinates,
    gap_minutes: i64,
) -> Result<(), BookingError> {
    let neighbour_location = match neighbour
        .visit_coordinates()
        .or_else(|| provider.base_coordinates())
    {
        Some(location) => location,
        None => return Ok(()),
    };
    let required_minutes = estimator
        .travel_minutes(neighbour_location, location)?
        .ceil() as i64;
    if gap_minutes < required_minutes {
        return Err(BookingError::InsufficientTravelTime {
            required_minutes,
            gap_minutes,
        });
    }
    Ok(())
}
