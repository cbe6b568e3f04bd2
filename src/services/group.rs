use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::db::queries;
use crate::models::{
    Booking, GroupParticipant, GroupRequest, GroupStatus, ParticipantStatus,
};
use crate::services::booking::{self, BookingError, CreateBooking};
use crate::services::travel::TravelEstimator;

#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("group request not found")]
    NotFound,
    #[error("group request is not open")]
    NotOpen,
    #[error("already joined this group request")]
    AlreadyJoined,
    #[error("group request is full")]
    GroupFull,
    #[error("join deadline has passed")]
    JoinDeadlinePassed,
    #[error("participant not found")]
    ParticipantNotFound,
    #[error("not allowed to modify this group request")]
    NotOwner,
    #[error("date range is invalid")]
    InvalidDateRange,
    #[error("max participants must be at least 1")]
    InvalidMaxParticipants,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct CreateGroupRequest {
    pub creator_id: String,
    pub service_type: String,
    pub location: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub max_participants: u32,
    pub join_deadline: Option<NaiveDateTime>,
}

pub fn create_group_request(
    conn: &Connection,
    req: &CreateGroupRequest,
) -> Result<GroupRequest, GroupError> {
    if req.date_from > req.date_to {
        return Err(GroupError::InvalidDateRange);
    }
    if req.max_participants == 0 {
        return Err(GroupError::InvalidMaxParticipants);
    }

    let now = Utc::now().naive_utc();
    let request = GroupRequest {
        id: Uuid::new_v4().to_string(),
        creator_id: req.creator_id.clone(),
        service_type: req.service_type.clone(),
        location: req.location.clone(),
        date_from: req.date_from,
        date_to: req.date_to,
        max_participants: req.max_participants,
        status: GroupStatus::Open,
        invite_code: invite_code(),
        join_deadline: req.join_deadline,
        created_at: now,
        updated_at: now,
    };
    queries::insert_group_request(conn, &request)?;

    tracing::info!(group_request_id = %request.id, "group request created");
    Ok(request)
}

/// Short shareable code; uppercased for easier reading off a yard
/// notice board.
fn invite_code() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

#[derive(Debug, Clone)]
pub struct JoinGroup {
    pub invite_code: String,
    pub user_id: String,
    pub horse_name: Option<String>,
    pub notes: Option<String>,
}

pub fn join_group(conn: &mut Connection, req: &JoinGroup) -> Result<GroupParticipant, GroupError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to begin join transaction")?;

    let request = queries::get_group_request_by_code(&tx, &req.invite_code)?
        .ok_or(GroupError::NotFound)?;
    if request.status != GroupStatus::Open {
        return Err(GroupError::NotOpen);
    }
    if let Some(deadline) = request.join_deadline {
        if Utc::now().naive_utc() > deadline {
            return Err(GroupError::JoinDeadlinePassed);
        }
    }

    let existing = queries::get_participant_for_user(&tx, &request.id, &req.user_id)?;
    if let Some(participant) = &existing {
        if participant.status == ParticipantStatus::Joined {
            return Err(GroupError::AlreadyJoined);
        }
    }

    let active = queries::count_active_participants(&tx, &request.id)?;
    if active >= i64::from(request.max_participants) {
        return Err(GroupError::GroupFull);
    }

    let participant = match existing {
        // A previous leaver rejoins on their old row.
        Some(participant) => {
            queries::update_participant_status(&tx, &participant.id, ParticipantStatus::Joined)?;
            queries::get_participant(&tx, &participant.id)?.ok_or(GroupError::ParticipantNotFound)?
        }
        None => {
            let now = Utc::now().naive_utc();
            let participant = GroupParticipant {
                id: Uuid::new_v4().to_string(),
                group_request_id: request.id.clone(),
                user_id: req.user_id.clone(),
                horse_name: req.horse_name.clone(),
                notes: req.notes.clone(),
                status: ParticipantStatus::Joined,
                created_at: now,
                updated_at: now,
            };
            queries::insert_participant(&tx, &participant)?;
            participant
        }
    };
    tx.commit().context("failed to commit join")?;

    tracing::info!(
        group_request_id = %request.id,
        participant_id = %participant.id,
        "participant joined group request"
    );
    Ok(participant)
}

#[derive(Debug)]
pub struct LeaveOutcome {
    pub participant: GroupParticipant,
    /// True when this leave emptied the request and auto-cancelled it.
    pub request_cancelled: bool,
}

/// A participant (or the request's creator) withdraws. When the last
/// active participant leaves, the request cancels itself; that is a
/// side effect, not an error.
pub fn leave_group(
    conn: &mut Connection,
    participant_id: &str,
    actor_id: &str,
) -> Result<LeaveOutcome, GroupError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to begin leave transaction")?;

    let participant =
        queries::get_participant(&tx, participant_id)?.ok_or(GroupError::ParticipantNotFound)?;
    let request = queries::get_group_request(&tx, &participant.group_request_id)?
        .ok_or_else(|| anyhow::anyhow!("participant {participant_id} has no group request"))
        .map_err(GroupError::Storage)?;
    if participant.user_id != actor_id && request.creator_id != actor_id {
        return Err(GroupError::NotOwner);
    }

    if participant.status == ParticipantStatus::Cancelled {
        // Nothing to do; report the current state of the request.
        return Ok(LeaveOutcome {
            participant,
            request_cancelled: request.status == GroupStatus::Cancelled,
        });
    }

    queries::update_participant_status(&tx, &participant.id, ParticipantStatus::Cancelled)?;
    let remaining = queries::count_active_participants(&tx, &request.id)?;
    let mut request_cancelled = false;
    if remaining == 0 && request.status == GroupStatus::Open {
        request_cancelled =
            queries::update_group_status(&tx, &request.id, GroupStatus::Open, GroupStatus::Cancelled)?;
    }
    let participant =
        queries::get_participant(&tx, participant_id)?.ok_or(GroupError::ParticipantNotFound)?;
    tx.commit().context("failed to commit leave")?;

    if request_cancelled {
        tracing::info!(group_request_id = %request.id, "last participant left, group request cancelled");
    }
    Ok(LeaveOutcome {
        participant,
        request_cancelled,
    })
}

#[derive(Debug, Clone)]
pub struct MatchGroup {
    pub group_request_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

#[derive(Debug)]
pub struct ParticipantError {
    pub user_id: String,
    pub error: BookingError,
}

#[derive(Debug)]
pub struct MatchOutcome {
    pub bookings: Vec<Booking>,
    pub errors: Vec<ParticipantError>,
}

/// A provider commits one visit to an open group request: participants
/// are booked back-to-back from `start_time`, one service-length
/// appointment each. Each create is its own transaction, so one
/// participant's failure cannot undo or block the others; the request
/// is marked matched either way and the caller reads the error list.
pub fn match_group_request(
    conn: &mut Connection,
    travel: Option<&dyn TravelEstimator>,
    req: &MatchGroup,
) -> Result<MatchOutcome, GroupError> {
    let request =
        queries::get_group_request(conn, &req.group_request_id)?.ok_or(GroupError::NotFound)?;
    if request.status != GroupStatus::Open {
        return Err(GroupError::NotOpen);
    }

    let participants = queries::get_active_participants(conn, &request.id)?;
    let mut bookings: Vec<Booking> = Vec::new();
    let mut errors = Vec::new();
    let mut next_start = req.start_time;
    for participant in participants {
        let create = CreateBooking {
            customer_id: participant.user_id.clone(),
            provider_id: req.provider_id.clone(),
            service_id: req.service_id.clone(),
            date: req.date,
            start_time: next_start,
            horse_name: participant.horse_name.clone(),
            notes: participant.notes.clone(),
            visit: None,
        };
        match booking::create_booking(conn, travel, &create) {
            Ok(booking) => {
                next_start = booking.end_time;
                bookings.push(booking);
            }
            Err(error) => {
                tracing::warn!(
                    group_request_id = %request.id,
                    user_id = %participant.user_id,
                    %error,
                    "group participant could not be booked"
                );
                errors.push(ParticipantError {
                    user_id: participant.user_id,
                    error,
                });
            }
        }
    }

    queries::update_group_status(conn, &request.id, GroupStatus::Open, GroupStatus::Matched)?;

    tracing::info!(
        group_request_id = %request.id,
        booked = bookings.len(),
        failed = errors.len(),
        "group request matched"
    );
    Ok(MatchOutcome { bookings, errors })
}
