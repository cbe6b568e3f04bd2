use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{
    AvailabilityException, Booking, BookingSeries, BookingStatus, DayHours, GroupParticipant,
    GroupRequest, GroupStatus, IntervalUnit, ParticipantStatus, Provider, Recurrence,
    SeriesStatus, ServiceOffering, WeeklyHours,
};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_date(d: &NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

fn fmt_time(t: &NaiveTime) -> String {
    t.format(TIME_FMT).to_string()
}

fn fmt_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FMT).with_context(|| format!("bad date column: {s}"))
}

fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FMT).with_context(|| format!("bad time column: {s}"))
}

fn parse_datetime(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT)
        .with_context(|| format!("bad datetime column: {s}"))
}

fn now_string() -> String {
    fmt_datetime(&Utc::now().naive_utc())
}

/// Quoted IN-list for a set of statuses. The inputs are compile-time
/// constants from the transition table, never user input.
fn status_in_list(statuses: &[BookingStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Providers ──

pub fn upsert_provider(conn: &Connection, provider: &Provider) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO providers (id, name, is_active, accepting_new_customers, base_lat, base_lng,
                                requires_travel_buffer, reschedule_enabled, reschedule_requires_reapproval,
                                max_series_occurrences, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           is_active = excluded.is_active,
           accepting_new_customers = excluded.accepting_new_customers,
           base_lat = excluded.base_lat,
           base_lng = excluded.base_lng,
           requires_travel_buffer = excluded.requires_travel_buffer,
           reschedule_enabled = excluded.reschedule_enabled,
           reschedule_requires_reapproval = excluded.reschedule_requires_reapproval,
           max_series_occurrences = excluded.max_series_occurrences,
           updated_at = excluded.updated_at",
        params![
            provider.id,
            provider.name,
            provider.is_active as i32,
            provider.accepting_new_customers as i32,
            provider.base_lat,
            provider.base_lng,
            provider.requires_travel_buffer as i32,
            provider.reschedule_enabled as i32,
            provider.reschedule_requires_reapproval as i32,
            provider.max_series_occurrences.map(i64::from),
            now_string(),
        ],
    )?;
    Ok(())
}

pub fn get_provider(conn: &Connection, id: &str) -> anyhow::Result<Option<Provider>> {
    let result = conn.query_row(
        "SELECT id, name, is_active, accepting_new_customers, base_lat, base_lng,
                requires_travel_buffer, reschedule_enabled, reschedule_requires_reapproval,
                max_series_occurrences, created_at, updated_at
         FROM providers WHERE id = ?1",
        params![id],
        |row| Ok(parse_provider_row(row)),
    );

    match result {
        Ok(provider) => Ok(Some(provider?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_provider_row(row: &rusqlite::Row) -> anyhow::Result<Provider> {
    let created_at_str: String = row.get(10)?;
    let updated_at_str: String = row.get(11)?;
    Ok(Provider {
        id: row.get(0)?,
        name: row.get(1)?,
        is_active: row.get::<_, i32>(2)? != 0,
        accepting_new_customers: row.get::<_, i32>(3)? != 0,
        base_lat: row.get(4)?,
        base_lng: row.get(5)?,
        requires_travel_buffer: row.get::<_, i32>(6)? != 0,
        reschedule_enabled: row.get::<_, i32>(7)? != 0,
        reschedule_requires_reapproval: row.get::<_, i32>(8)? != 0,
        max_series_occurrences: row.get::<_, Option<i64>>(9)?.map(|v| v as u32),
        created_at: parse_datetime(&created_at_str)?,
        updated_at: parse_datetime(&updated_at_str)?,
    })
}

// ── Services ──

pub fn upsert_service(conn: &Connection, service: &ServiceOffering) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, provider_id, name, duration_minutes, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(id) DO UPDATE SET
           provider_id = excluded.provider_id,
           name = excluded.name,
           duration_minutes = excluded.duration_minutes,
           is_active = excluded.is_active,
           updated_at = excluded.updated_at",
        params![
            service.id,
            service.provider_id,
            service.name,
            service.duration_minutes,
            service.is_active as i32,
            now_string(),
        ],
    )?;
    Ok(())
}

pub fn get_service(conn: &Connection, id: &str) -> anyhow::Result<Option<ServiceOffering>> {
    let result = conn.query_row(
        "SELECT id, provider_id, name, duration_minutes, is_active, created_at, updated_at
         FROM services WHERE id = ?1",
        params![id],
        |row| {
            let created_at: String = row.get(5)?;
            let updated_at: String = row.get(6)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i32>(3)?,
                row.get::<_, i32>(4)?,
                created_at,
                updated_at,
            ))
        },
    );

    match result {
        Ok((id, provider_id, name, duration_minutes, is_active, created_at, updated_at)) => {
            Ok(Some(ServiceOffering {
                id,
                provider_id,
                name,
                duration_minutes,
                is_active: is_active != 0,
                created_at: parse_datetime(&created_at)?,
                updated_at: parse_datetime(&updated_at)?,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Availability ──

pub fn upsert_weekly_hours(conn: &Connection, hours: &WeeklyHours) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO availability_schedule (provider_id, weekday, is_closed, opens_at, closes_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(provider_id, weekday) DO UPDATE SET
           is_closed = excluded.is_closed,
           opens_at = excluded.opens_at,
           closes_at = excluded.closes_at",
        params![
            hours.provider_id,
            hours.weekday as i64,
            hours.hours.is_none() as i32,
            hours.hours.map(|h| fmt_time(&h.opens_at)),
            hours.hours.map(|h| fmt_time(&h.closes_at)),
        ],
    )?;
    Ok(())
}

pub fn get_weekly_hours(conn: &Connection, provider_id: &str) -> anyhow::Result<Vec<WeeklyHours>> {
    let mut stmt = conn.prepare(
        "SELECT provider_id, weekday, is_closed, opens_at, closes_at
         FROM availability_schedule WHERE provider_id = ?1 ORDER BY weekday ASC",
    )?;

    let rows = stmt.query_map(params![provider_id], |row| Ok(parse_weekly_row(row)))?;

    let mut schedule = vec![];
    for row in rows {
        schedule.push(row??);
    }
    Ok(schedule)
}

pub fn get_weekly_hours_for_day(
    conn: &Connection,
    provider_id: &str,
    weekday: u32,
) -> anyhow::Result<Option<WeeklyHours>> {
    let result = conn.query_row(
        "SELECT provider_id, weekday, is_closed, opens_at, closes_at
         FROM availability_schedule WHERE provider_id = ?1 AND weekday = ?2",
        params![provider_id, weekday as i64],
        |row| Ok(parse_weekly_row(row)),
    );

    match result {
        Ok(hours) => Ok(Some(hours?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_weekly_row(row: &rusqlite::Row) -> anyhow::Result<WeeklyHours> {
    let is_closed: bool = row.get::<_, i32>(2)? != 0;
    let opens_at: Option<String> = row.get(3)?;
    let closes_at: Option<String> = row.get(4)?;
    Ok(WeeklyHours {
        provider_id: row.get(0)?,
        weekday: row.get::<_, i64>(1)? as u32,
        hours: day_hours(is_closed, opens_at, closes_at)?,
    })
}

fn day_hours(
    is_closed: bool,
    opens_at: Option<String>,
    closes_at: Option<String>,
) -> anyhow::Result<Option<DayHours>> {
    if is_closed {
        return Ok(None);
    }
    match (opens_at, closes_at) {
        (Some(open), Some(close)) => Ok(Some(DayHours {
            opens_at: parse_time(&open)?,
            closes_at: parse_time(&close)?,
        })),
        _ => Ok(None),
    }
}

pub fn upsert_exception(conn: &Connection, exception: &AvailabilityException) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO availability_exceptions (provider_id, date, is_closed, opens_at, closes_at, reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(provider_id, date) DO UPDATE SET
           is_closed = excluded.is_closed,
           opens_at = excluded.opens_at,
           closes_at = excluded.closes_at,
           reason = excluded.reason",
        params![
            exception.provider_id,
            fmt_date(&exception.date),
            exception.hours.is_none() as i32,
            exception.hours.map(|h| fmt_time(&h.opens_at)),
            exception.hours.map(|h| fmt_time(&h.closes_at)),
            exception.reason,
        ],
    )?;
    Ok(())
}

pub fn get_exception(
    conn: &Connection,
    provider_id: &str,
    date: &NaiveDate,
) -> anyhow::Result<Option<AvailabilityException>> {
    let result = conn.query_row(
        "SELECT provider_id, date, is_closed, opens_at, closes_at, reason
         FROM availability_exceptions WHERE provider_id = ?1 AND date = ?2",
        params![provider_id, fmt_date(date)],
        |row| {
            let date_str: String = row.get(1)?;
            let is_closed: i32 = row.get(2)?;
            let opens_at: Option<String> = row.get(3)?;
            let closes_at: Option<String> = row.get(4)?;
            Ok((
                row.get::<_, String>(0)?,
                date_str,
                is_closed,
                opens_at,
                closes_at,
                row.get::<_, Option<String>>(5)?,
            ))
        },
    );

    match result {
        Ok((provider_id, date_str, is_closed, opens_at, closes_at, reason)) => {
            Ok(Some(AvailabilityException {
                provider_id,
                date: parse_date(&date_str)?,
                hours: day_hours(is_closed != 0, opens_at, closes_at)?,
                reason,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn delete_exception(
    conn: &Connection,
    provider_id: &str,
    date: &NaiveDate,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM availability_exceptions WHERE provider_id = ?1 AND date = ?2",
        params![provider_id, fmt_date(date)],
    )?;
    Ok(count > 0)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, customer_id, provider_id, service_id, booking_date, start_time, end_time, \
     status, horse_name, notes, booking_series_id, reschedule_count, visit_lat, visit_lng, \
     created_at, updated_at";

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, customer_id, provider_id, service_id, booking_date, start_time, end_time,
                               status, horse_name, notes, booking_series_id, reschedule_count,
                               visit_lat, visit_lng, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            booking.id,
            booking.customer_id,
            booking.provider_id,
            booking.service_id,
            fmt_date(&booking.booking_date),
            fmt_time(&booking.start_time),
            fmt_time(&booking.end_time),
            booking.status.as_str(),
            booking.horse_name,
            booking.notes,
            booking.booking_series_id,
            booking.reschedule_count,
            booking.visit_lat,
            booking.visit_lng,
            fmt_datetime(&booking.created_at),
            fmt_datetime(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Booking visible to `customer_id` only. Absent and not-owned are the
/// same `None` on purpose.
pub fn get_booking_for_customer(
    conn: &Connection,
    id: &str,
    customer_id: &str,
) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1 AND customer_id = ?2"),
        params![id, customer_id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Booking visible to either side of the appointment.
pub fn get_booking_for_party(
    conn: &Connection,
    id: &str,
    actor_id: &str,
) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE id = ?1 AND (customer_id = ?2 OR provider_id = ?2)"
        ),
        params![id, actor_id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Every booking still blocking the provider's calendar on `date`,
/// ordered by start time. Cancelled rows do not block.
pub fn get_active_bookings_for_day(
    conn: &Connection,
    provider_id: &str,
    date: &NaiveDate,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE provider_id = ?1 AND booking_date = ?2 AND status != 'cancelled'
         ORDER BY start_time ASC"
    ))?;

    let rows = stmt.query_map(params![provider_id, fmt_date(date)], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Moves a booking to a new date/time. The customer id sits in the
/// predicate so an unowned row is simply not updated.
pub fn apply_reschedule(
    conn: &Connection,
    id: &str,
    customer_id: &str,
    new_date: &NaiveDate,
    new_start: &NaiveTime,
    new_end: &NaiveTime,
    new_status: BookingStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings
         SET booking_date = ?3, start_time = ?4, end_time = ?5, status = ?6,
             reschedule_count = reschedule_count + 1, updated_at = ?7
         WHERE id = ?1 AND customer_id = ?2",
        params![
            id,
            customer_id,
            fmt_date(new_date),
            fmt_time(new_start),
            fmt_time(new_end),
            new_status.as_str(),
            now_string(),
        ],
    )?;
    Ok(count > 0)
}

/// Authorized atomic status change: ownership and the legal source
/// statuses (derived from the transition table) are part of the UPDATE
/// predicate, so check and write cannot race. Returns whether a row
/// was changed; the caller classifies a miss.
pub fn transition_booking_status(
    conn: &Connection,
    id: &str,
    actor_id: &str,
    allow_customer_actor: bool,
    to: BookingStatus,
) -> anyhow::Result<bool> {
    let sources = BookingStatus::sources_of(to);
    if sources.is_empty() {
        return Ok(false);
    }
    let owner_predicate = if allow_customer_actor {
        "(customer_id = ?2 OR provider_id = ?2)"
    } else {
        "provider_id = ?2"
    };
    let sql = format!(
        "UPDATE bookings SET status = ?3, updated_at = ?4
         WHERE id = ?1 AND {owner_predicate} AND status IN ({})",
        status_in_list(&sources)
    );
    let count = conn.execute(&sql, params![id, actor_id, to.as_str(), now_string()])?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let booking_date: String = row.get(4)?;
    let start_time: String = row.get(5)?;
    let end_time: String = row.get(6)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(14)?;
    let updated_at: String = row.get(15)?;

    Ok(Booking {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        provider_id: row.get(2)?,
        service_id: row.get(3)?,
        booking_date: parse_date(&booking_date)?,
        start_time: parse_time(&start_time)?,
        end_time: parse_time(&end_time)?,
        status: BookingStatus::parse(&status),
        horse_name: row.get(8)?,
        notes: row.get(9)?,
        booking_series_id: row.get(10)?,
        reschedule_count: row.get(11)?,
        visit_lat: row.get(12)?,
        visit_lng: row.get(13)?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

// ── Booking series ──

pub fn insert_series(conn: &Connection, series: &BookingSeries) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO booking_series (id, customer_id, provider_id, service_id, start_date, start_time,
                                     interval_unit, interval_count, occurrences, end_date, status,
                                     created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            series.id,
            series.customer_id,
            series.provider_id,
            series.service_id,
            fmt_date(&series.start_date),
            fmt_time(&series.start_time),
            series.recurrence.interval_unit.as_str(),
            i64::from(series.recurrence.interval_count),
            series.recurrence.occurrences.map(i64::from),
            series.recurrence.end_date.map(|d| fmt_date(&d)),
            series.status.as_str(),
            fmt_datetime(&series.created_at),
            fmt_datetime(&series.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_series(conn: &Connection, id: &str) -> anyhow::Result<Option<BookingSeries>> {
    let result = conn.query_row(
        "SELECT id, customer_id, provider_id, service_id, start_date, start_time,
                interval_unit, interval_count, occurrences, end_date, status, created_at, updated_at
         FROM booking_series WHERE id = ?1",
        params![id],
        |row| Ok(parse_series_row(row)),
    );

    match result {
        Ok(series) => Ok(Some(series?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_series_row(row: &rusqlite::Row) -> anyhow::Result<BookingSeries> {
    let start_date: String = row.get(4)?;
    let start_time: String = row.get(5)?;
    let interval_unit: String = row.get(6)?;
    let end_date: Option<String> = row.get(9)?;
    let status: String = row.get(10)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    Ok(BookingSeries {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        provider_id: row.get(2)?,
        service_id: row.get(3)?,
        start_date: parse_date(&start_date)?,
        start_time: parse_time(&start_time)?,
        recurrence: Recurrence {
            interval_unit: IntervalUnit::parse(&interval_unit),
            interval_count: row.get::<_, i64>(7)? as u32,
            occurrences: row.get::<_, Option<i64>>(8)?.map(|v| v as u32),
            end_date: end_date.as_deref().map(parse_date).transpose()?,
        },
        status: SeriesStatus::parse(&status),
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

pub fn update_series_status(
    conn: &Connection,
    id: &str,
    status: SeriesStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE booking_series SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, status.as_str(), now_string()],
    )?;
    Ok(count > 0)
}

/// Cancels every member of a series that the transition table still
/// allows to be cancelled. Terminal members are left alone.
pub fn cancel_series_members(conn: &Connection, series_id: &str) -> anyhow::Result<usize> {
    let sources = BookingStatus::sources_of(BookingStatus::Cancelled);
    let sql = format!(
        "UPDATE bookings SET status = 'cancelled', updated_at = ?2
         WHERE booking_series_id = ?1 AND status IN ({})",
        status_in_list(&sources)
    );
    let count = conn.execute(&sql, params![series_id, now_string()])?;
    Ok(count)
}

pub fn get_series_members(conn: &Connection, series_id: &str) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE booking_series_id = ?1 ORDER BY booking_date ASC, start_time ASC"
    ))?;

    let rows = stmt.query_map(params![series_id], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

// ── Group requests ──

pub fn insert_group_request(conn: &Connection, request: &GroupRequest) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO group_requests (id, creator_id, service_type, location, date_from, date_to,
                                     max_participants, status, invite_code, join_deadline,
                                     created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            request.id,
            request.creator_id,
            request.service_type,
            request.location,
            fmt_date(&request.date_from),
            fmt_date(&request.date_to),
            i64::from(request.max_participants),
            request.status.as_str(),
            request.invite_code,
            request.join_deadline.map(|dt| fmt_datetime(&dt)),
            fmt_datetime(&request.created_at),
            fmt_datetime(&request.updated_at),
        ],
    )?;
    Ok(())
}

const GROUP_REQUEST_COLUMNS: &str = "id, creator_id, service_type, location, date_from, date_to, \
     max_participants, status, invite_code, join_deadline, created_at, updated_at";

pub fn get_group_request(conn: &Connection, id: &str) -> anyhow::Result<Option<GroupRequest>> {
    let result = conn.query_row(
        &format!("SELECT {GROUP_REQUEST_COLUMNS} FROM group_requests WHERE id = ?1"),
        params![id],
        |row| Ok(parse_group_request_row(row)),
    );

    match result {
        Ok(request) => Ok(Some(request?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_group_request_by_code(
    conn: &Connection,
    invite_code: &str,
) -> anyhow::Result<Option<GroupRequest>> {
    let result = conn.query_row(
        &format!("SELECT {GROUP_REQUEST_COLUMNS} FROM group_requests WHERE invite_code = ?1"),
        params![invite_code],
        |row| Ok(parse_group_request_row(row)),
    );

    match result {
        Ok(request) => Ok(Some(request?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_group_request_row(row: &rusqlite::Row) -> anyhow::Result<GroupRequest> {
    let date_from: String = row.get(4)?;
    let date_to: String = row.get(5)?;
    let status: String = row.get(7)?;
    let join_deadline: Option<String> = row.get(9)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    Ok(GroupRequest {
        id: row.get(0)?,
        creator_id: row.get(1)?,
        service_type: row.get(2)?,
        location: row.get(3)?,
        date_from: parse_date(&date_from)?,
        date_to: parse_date(&date_to)?,
        max_participants: row.get::<_, i64>(6)? as u32,
        status: GroupStatus::parse(&status),
        invite_code: row.get(8)?,
        join_deadline: join_deadline.as_deref().map(parse_datetime).transpose()?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

/// Status change guarded by the current status in the predicate, so an
/// already-matched or cancelled request is not silently overwritten.
pub fn update_group_status(
    conn: &Connection,
    id: &str,
    from: GroupStatus,
    to: GroupStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE group_requests SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        params![id, from.as_str(), to.as_str(), now_string()],
    )?;
    Ok(count > 0)
}

// ── Group participants ──

pub fn insert_participant(conn: &Connection, participant: &GroupParticipant) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO group_participants (id, group_request_id, user_id, horse_name, notes, status,
                                         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            participant.id,
            participant.group_request_id,
            participant.user_id,
            participant.horse_name,
            participant.notes,
            participant.status.as_str(),
            fmt_datetime(&participant.created_at),
            fmt_datetime(&participant.updated_at),
        ],
    )?;
    Ok(())
}

const PARTICIPANT_COLUMNS: &str =
    "id, group_request_id, user_id, horse_name, notes, status, created_at, updated_at";

pub fn get_participant(conn: &Connection, id: &str) -> anyhow::Result<Option<GroupParticipant>> {
    let result = conn.query_row(
        &format!("SELECT {PARTICIPANT_COLUMNS} FROM group_participants WHERE id = ?1"),
        params![id],
        |row| Ok(parse_participant_row(row)),
    );

    match result {
        Ok(participant) => Ok(Some(participant?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_participant_for_user(
    conn: &Connection,
    group_request_id: &str,
    user_id: &str,
) -> anyhow::Result<Option<GroupParticipant>> {
    let result = conn.query_row(
        &format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM group_participants
             WHERE group_request_id = ?1 AND user_id = ?2"
        ),
        params![group_request_id, user_id],
        |row| Ok(parse_participant_row(row)),
    );

    match result {
        Ok(participant) => Ok(Some(participant?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_active_participants(
    conn: &Connection,
    group_request_id: &str,
) -> anyhow::Result<Vec<GroupParticipant>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM group_participants
         WHERE group_request_id = ?1 AND status = 'joined' ORDER BY rowid ASC"
    ))?;

    let rows = stmt.query_map(params![group_request_id], |row| {
        Ok(parse_participant_row(row))
    })?;

    let mut participants = vec![];
    for row in rows {
        participants.push(row??);
    }
    Ok(participants)
}

pub fn count_active_participants(
    conn: &Connection,
    group_request_id: &str,
) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM group_participants WHERE group_request_id = ?1 AND status = 'joined'",
        params![group_request_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn update_participant_status(
    conn: &Connection,
    id: &str,
    status: ParticipantStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE group_participants SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, status.as_str(), now_string()],
    )?;
    Ok(count > 0)
}

fn parse_participant_row(row: &rusqlite::Row) -> anyhow::Result<GroupParticipant> {
    let status: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok(GroupParticipant {
        id: row.get(0)?,
        group_request_id: row.get(1)?,
        user_id: row.get(2)?,
        horse_name: row.get(3)?,
        notes: row.get(4)?,
        status: ParticipantStatus::parse(&status),
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}
