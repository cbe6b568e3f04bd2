use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// An opening/closing pair for one day. `None` anywhere a day is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
}

/// One row of a provider's weekly schedule. Weekdays are 0-6 with
/// Sunday as 0, matching `chrono::Weekday::num_days_from_sunday`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyHours {
    pub provider_id: String,
    pub weekday: u32,
    pub hours: Option<DayHours>,
}

/// A date-specific override. Takes precedence over the weekly schedule
/// for its date: either closed outright or alternate hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityException {
    pub provider_id: String,
    pub date: NaiveDate,
    pub hours: Option<DayHours>,
    pub reason: Option<String>,
}

/// Calculator output. Never persisted; the booking service re-validates
/// at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
}
