use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSeries {
    pub id: String,
    pub customer_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub recurrence: Recurrence,
    pub status: SeriesStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesStatus {
    Active,
    Cancelled,
}

impl SeriesStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesStatus::Active => "active",
            SeriesStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "cancelled" => SeriesStatus::Cancelled,
            _ => SeriesStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Day,
    Week,
}

impl IntervalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Day => "day",
            IntervalUnit::Week => "week",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "day" => IntervalUnit::Day,
            _ => IntervalUnit::Week,
        }
    }

    fn days(&self) -> i64 {
        match self {
            IntervalUnit::Day => 1,
            IntervalUnit::Week => 7,
        }
    }
}

/// "Every `interval_count` `interval_unit`s", bounded by an occurrence
/// count, an end date, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub interval_unit: IntervalUnit,
    pub interval_count: u32,
    pub occurrences: Option<u32>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecurrenceError {
    #[error("recurrence needs an occurrence count or an end date")]
    Unbounded,
    #[error("recurrence interval must be at least 1")]
    ZeroInterval,
    #[error("occurrence count must be at least 1")]
    ZeroOccurrences,
    #[error("end date is before the start date")]
    EndBeforeStart,
    #[error("recurrence expands to more than {max} occurrences")]
    TooMany { max: usize },
}

impl Recurrence {
    /// Concrete occurrence dates starting at `start`, capped at `max`.
    /// When both bounds are present, the earlier one wins.
    pub fn expand(&self, start: NaiveDate, max: usize) -> Result<Vec<NaiveDate>, RecurrenceError> {
        if self.interval_count == 0 {
            return Err(RecurrenceError::ZeroInterval);
        }
        if self.occurrences.is_none() && self.end_date.is_none() {
            return Err(RecurrenceError::Unbounded);
        }
        if self.occurrences == Some(0) {
            return Err(RecurrenceError::ZeroOccurrences);
        }
        if let Some(n) = self.occurrences {
            if n as usize > max {
                return Err(RecurrenceError::TooMany { max });
            }
        }
        if let Some(until) = self.end_date {
            if until < start {
                return Err(RecurrenceError::EndBeforeStart);
            }
        }

        let step = Duration::days(self.interval_unit.days() * i64::from(self.interval_count));
        let mut dates = Vec::new();
        let mut date = start;
        loop {
            if let Some(until) = self.end_date {
                if date > until {
                    break;
                }
            }
            if let Some(n) = self.occurrences {
                if dates.len() == n as usize {
                    break;
                }
            }
            if dates.len() == max {
                return Err(RecurrenceError::TooMany { max });
            }
            dates.push(date);
            match date.checked_add_signed(step) {
                Some(next) => date = next,
                None => break,
            }
        }
        Ok(dates)
    }
}
