use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{DayHours, TimeSlot};
use crate::services::booking::BookingError;

/// Expands an opening window into the full grid of candidate slots.
///
/// Candidates start at `opening` and advance by `step_minutes` for as
/// long as start + duration fits before `closing`. Every candidate is
/// returned, available or not, so callers can render a complete grid.
/// A candidate is unavailable when its [start, end) interval overlaps a
/// booked interval under half-open semantics, or, when `past_cutoff`
/// is given, when its start instant on the target date is not after
/// "now". Pure: no clock, no I/O, same output for the same input.
pub fn calculate_available_slots(
    opening: NaiveTime,
    closing: NaiveTime,
    booked: &[(NaiveTime, NaiveTime)],
    duration_minutes: i32,
    step_minutes: i32,
    past_cutoff: Option<(NaiveDate, NaiveDateTime)>,
) -> Vec<TimeSlot> {
    if opening >= closing || duration_minutes <= 0 || step_minutes <= 0 {
        return Vec::new();
    }

    let duration = Duration::minutes(i64::from(duration_minutes));
    let step = Duration::minutes(i64::from(step_minutes));

    let mut slots = Vec::new();
    let mut start = opening;
    loop {
        let (end, wrapped) = start.overflowing_add_signed(duration);
        if wrapped != 0 || end > closing {
            break;
        }

        let mut is_available = !booked
            .iter()
            .any(|(booked_start, booked_end)| start < *booked_end && end > *booked_start);

        if let Some((date, now)) = past_cutoff {
            if date.and_time(start) <= now {
                is_available = false;
            }
        }

        slots.push(TimeSlot {
            start_time: start,
            end_time: end,
            is_available,
        });

        let (next, wrapped) = start.overflowing_add_signed(step);
        if wrapped != 0 {
            break;
        }
        start = next;
    }
    slots
}

/// Effective opening hours for a provider on a date: a date exception
/// wins over the weekly schedule; no weekly row means closed.
pub fn effective_hours(
    conn: &Connection,
    provider_id: &str,
    date: &NaiveDate,
) -> anyhow::Result<Option<DayHours>> {
    if let Some(exception) = queries::get_exception(conn, provider_id, date)? {
        return Ok(exception.hours);
    }
    let weekday = date.weekday().num_days_from_sunday();
    Ok(queries::get_weekly_hours_for_day(conn, provider_id, weekday)?.and_then(|row| row.hours))
}

/// Advisory slot grid for one provider, service and date. A closed day
/// yields an empty grid rather than an error; the authoritative checks
/// happen again at booking time.
pub fn slots_for_date(
    conn: &Connection,
    provider_id: &str,
    service_id: &str,
    date: &NaiveDate,
    step_minutes: i32,
    now: NaiveDateTime,
) -> Result<Vec<TimeSlot>, BookingError> {
    let service = queries::get_service(conn, service_id)?.ok_or(BookingError::ServiceNotFound)?;
    if service.provider_id != provider_id {
        return Err(BookingError::ServiceNotFound);
    }
    if !service.is_active {
        return Err(BookingError::ServiceInactive);
    }

    let hours = match effective_hours(conn, provider_id, date)? {
        Some(hours) => hours,
        None => return Ok(Vec::new()),
    };

    let booked: Vec<(NaiveTime, NaiveTime)> =
        queries::get_active_bookings_for_day(conn, provider_id, date)?
            .iter()
            .map(|b| (b.start_time, b.end_time))
            .collect();

    Ok(calculate_available_slots(
        hours.opens_at,
        hours.closes_at,
        &booked,
        service.duration_minutes,
        step_minutes,
        Some((*date, now)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_empty_iff_opening_not_before_closing() {
        assert!(calculate_available_slots(t("17:00"), t("09:00"), &[], 30, 15, None).is_empty());
        assert!(calculate_available_slots(t("09:00"), t("09:00"), &[], 30, 15, None).is_empty());
        assert!(!calculate_available_slots(t("09:00"), t("09:30"), &[], 30, 15, None).is_empty());
    }

    #[test]
    fn test_forty_five_minute_service_in_one_hour_window() {
        let slots = calculate_available_slots(t("09:00"), t("10:00"), &[], 45, 15, None);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].start_time, t("09:00"));
        assert_eq!(slots[0].end_time, t("09:45"));
        assert!(slots[0].is_available);
        assert_eq!(slots[1].start_time, t("09:15"));
        assert_eq!(slots[1].end_time, t("10:00"));
        assert!(slots[1].is_available);
        // 09:30 would end at 10:15, past closing.
    }

    #[test]
    fn test_booked_intervals_mark_slots_unavailable() {
        let booked = vec![(t("09:30"), t("10:00")), (t("10:00"), t("10:30"))];
        let slots = calculate_available_slots(t("09:00"), t("11:00"), &booked, 30, 30, None);
        assert_eq!(slots.len(), 4);
        assert_eq!(slots[0].start_time, t("09:00"));
        assert!(slots[0].is_available);
        assert!(!slots[1].is_available);
        assert!(!slots[2].is_available);
        assert_eq!(slots[3].start_time, t("10:30"));
        assert!(slots[3].is_available);
    }

    #[test]
    fn test_half_open_boundaries_do_not_conflict() {
        let booked = vec![(t("10:00"), t("11:00"))];
        let slots = calculate_available_slots(t("09:00"), t("12:00"), &booked, 60, 60, None);
        assert_eq!(slots.len(), 3);
        // Ends exactly when the booking starts.
        assert!(slots[0].is_available);
        assert!(!slots[1].is_available);
        // Starts exactly when the booking ends.
        assert!(slots[2].is_available);
    }

    #[test]
    fn test_every_slot_spans_duration_and_fits_closing() {
        let slots = calculate_available_slots(t("08:00"), t("12:20"), &[], 50, 20, None);
        assert!(!slots.is_empty());
        for slot in &slots {
            assert_eq!(slot.end_time - slot.start_time, Duration::minutes(50));
            assert!(slot.end_time <= t("12:20"));
        }
    }

    #[test]
    fn test_past_slots_filtered_on_non_future_dates() {
        let now = d("2026-03-02").and_time(t("10:00"));

        let today = calculate_available_slots(
            t("09:00"),
            t("12:00"),
            &[],
            60,
            60,
            Some((d("2026-03-02"), now)),
        );
        assert!(!today[0].is_available); // 09:00 already past
        assert!(!today[1].is_available); // 10:00 is "at or before" now
        assert!(today[2].is_available); // 11:00 still ahead

        let yesterday = calculate_available_slots(
            t("09:00"),
            t("12:00"),
            &[],
            60,
            60,
            Some((d("2026-03-01"), now)),
        );
        assert!(yesterday.iter().all(|s| !s.is_available));

        let tomorrow = calculate_available_slots(
            t("09:00"),
            t("12:00"),
            &[],
            60,
            60,
            Some((d("2026-03-03"), now)),
        );
        assert!(tomorrow.iter().all(|s| s.is_available));
    }

    #[test]
    fn test_deterministic_and_order_stable() {
        let booked = vec![(t("09:30"), t("10:15")), (t("13:00"), t("14:00"))];
        let first = calculate_available_slots(t("09:00"), t("17:00"), &booked, 45, 15, None);
        let second = calculate_available_slots(t("09:00"), t("17:00"), &booked, 45, 15, None);
        assert_eq!(first, second);
        let starts: Vec<_> = first.iter().map(|s| s.start_time).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn test_nonpositive_duration_or_step_yields_empty() {
        assert!(calculate_available_slots(t("09:00"), t("17:00"), &[], 0, 15, None).is_empty());
        assert!(calculate_available_slots(t("09:00"), t("17:00"), &[], 30, 0, None).is_empty());
    }

    mod effective_hours {
        use super::*;
        use crate::db;
        use crate::db::queries;
        use crate::models::{AvailabilityException, DayHours, Provider, WeeklyHours};
        use chrono::Utc;

        fn seed_provider(conn: &Connection, provider_id: &str) {
            let now = Utc::now().naive_utc();
            queries::upsert_provider(
                conn,
                &Provider {
                    id: provider_id.to_string(),
                    name: "Hooves & Co".to_string(),
                    is_active: true,
                    accepting_new_customers: true,
                    base_lat: None,
                    base_lng: None,
                    requires_travel_buffer: false,
                    reschedule_enabled: true,
                    reschedule_requires_reapproval: false,
                    max_series_occurrences: None,
                    created_at: now,
                    updated_at: now,
                },
            )
            .unwrap();
        }

        fn seed_weekday(conn: &Connection, provider_id: &str, weekday: u32) {
            seed_provider(conn, provider_id);
            queries::upsert_weekly_hours(
                conn,
                &WeeklyHours {
                    provider_id: provider_id.into(),
                    weekday,
                    hours: Some(DayHours {
                        opens_at: t("09:00"),
                        closes_at: t("17:00"),
                    }),
                },
            )
            .unwrap();
        }

        #[test]
        fn test_exception_overrides_weekly_schedule() {
            let conn = db::init_db(":memory:").unwrap();
            // 2026-03-02 is a Monday (weekday 1, Sunday-based).
            seed_weekday(&conn, "farrier-1", 1);

            assert_eq!(
                effective_hours(&conn, "farrier-1", &d("2026-03-02")).unwrap(),
                Some(DayHours {
                    opens_at: t("09:00"),
                    closes_at: t("17:00"),
                })
            );

            queries::upsert_exception(
                &conn,
                &AvailabilityException {
                    provider_id: "farrier-1".into(),
                    date: d("2026-03-02"),
                    hours: Some(DayHours {
                        opens_at: t("12:00"),
                        closes_at: t("15:00"),
                    }),
                    reason: Some("vet clinic in the morning".into()),
                },
            )
            .unwrap();

            assert_eq!(
                effective_hours(&conn, "farrier-1", &d("2026-03-02")).unwrap(),
                Some(DayHours {
                    opens_at: t("12:00"),
                    closes_at: t("15:00"),
                })
            );
        }

        #[test]
        fn test_closed_exception_and_missing_weekly_row() {
            let conn = db::init_db(":memory:").unwrap();
            seed_weekday(&conn, "farrier-1", 1);

            queries::upsert_exception(
                &conn,
                &AvailabilityException {
                    provider_id: "farrier-1".into(),
                    date: d("2026-03-02"),
                    hours: None,
                    reason: None,
                },
            )
            .unwrap();

            // Exception closes an otherwise open Monday.
            assert_eq!(
                effective_hours(&conn, "farrier-1", &d("2026-03-02")).unwrap(),
                None
            );
            // No weekly row for Tuesday means closed.
            assert_eq!(
                effective_hours(&conn, "farrier-1", &d("2026-03-03")).unwrap(),
                None
            );
        }
    }
}
