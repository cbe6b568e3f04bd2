use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::models::provider::Coordinates;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub customer_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: BookingStatus,
    pub horse_name: Option<String>,
    pub notes: Option<String>,
    pub booking_series_id: Option<String>,
    pub reschedule_count: i32,
    pub visit_lat: Option<f64>,
    pub visit_lng: Option<f64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// Half-open overlap with [start, end) on the same day.
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start_time < end && self.end_time > start
    }

    /// Where the provider travels for this appointment, when recorded.
    pub fn visit_coordinates(&self) -> Option<Coordinates> {
        match (self.visit_lat, self.visit_lng) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }
}

/// Booking lifecycle. Every status change in the system goes through
/// [`BookingStatus::transition_to`]; nothing else decides legality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

pub const ALL_STATUSES: [BookingStatus; 4] = [
    BookingStatus::Pending,
    BookingStatus::Confirmed,
    BookingStatus::Cancelled,
    BookingStatus::Completed,
];

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => BookingStatus::Confirmed,
            "cancelled" => BookingStatus::Cancelled,
            "completed" => BookingStatus::Completed,
            _ => BookingStatus::Pending,
        }
    }

    pub fn allowed_transitions(&self) -> &'static [BookingStatus] {
        match self {
            BookingStatus::Pending => &[BookingStatus::Confirmed, BookingStatus::Cancelled],
            BookingStatus::Confirmed => &[BookingStatus::Completed, BookingStatus::Cancelled],
            BookingStatus::Cancelled | BookingStatus::Completed => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Self-transitions are never legal.
    pub fn can_transition_to(&self, target: BookingStatus) -> bool {
        *self != target && self.allowed_transitions().contains(&target)
    }

    pub fn transition_to(&self, target: BookingStatus) -> Result<BookingStatus, InvalidTransition> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(InvalidTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Statuses from which `target` is reachable. Used to build the
    /// predicate of status-changing UPDATE statements so the writes
    /// stay consistent with the transition table.
    pub fn sources_of(target: BookingStatus) -> Vec<BookingStatus> {
        ALL_STATUSES
            .into_iter()
            .filter(|s| s.can_transition_to(target))
            .collect()
    }

    /// Policy reset applied when a provider requires re-approval after a
    /// reschedule. Only a confirmed booking goes back to pending; any
    /// other status stays where it is.
    pub fn reapproval_reset(&self) -> Option<BookingStatus> {
        match self {
            BookingStatus::Confirmed => Some(BookingStatus::Pending),
            _ => None,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal booking status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: BookingStatus,
    pub to: BookingStatus,
}
