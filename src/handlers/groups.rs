use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::handlers::bookings::BookingResponse;
use crate::handlers::{actor_id, fmt_date, fmt_datetime, parse_date, parse_datetime, parse_time};
use crate::models::{GroupParticipant, GroupRequest};
use crate::services::group;
use crate::state::AppState;

#[derive(Serialize)]
pub struct GroupRequestResponse {
    id: String,
    creator_id: String,
    service_type: String,
    location: String,
    date_from: String,
    date_to: String,
    max_participants: u32,
    status: String,
    invite_code: String,
    join_deadline: Option<String>,
}

impl From<GroupRequest> for GroupRequestResponse {
    fn from(r: GroupRequest) -> Self {
        Self {
            id: r.id,
            creator_id: r.creator_id,
            service_type: r.service_type,
            location: r.location,
            date_from: fmt_date(&r.date_from),
            date_to: fmt_date(&r.date_to),
            max_participants: r.max_participants,
            status: r.status.as_str().to_string(),
            invite_code: r.invite_code,
            join_deadline: r.join_deadline.map(|dt| fmt_datetime(&dt)),
        }
    }
}

#[derive(Serialize)]
pub struct ParticipantResponse {
    id: String,
    group_request_id: String,
    user_id: String,
    horse_name: Option<String>,
    notes: Option<String>,
    status: String,
}

impl From<GroupParticipant> for ParticipantResponse {
    fn from(p: GroupParticipant) -> Self {
        Self {
            id: p.id,
            group_request_id: p.group_request_id,
            user_id: p.user_id,
            horse_name: p.horse_name,
            notes: p.notes,
            status: p.status.as_str().to_string(),
        }
    }
}

// POST /api/groups
#[derive(Deserialize)]
pub struct CreateGroupRequestBody {
    pub service_type: String,
    pub location: String,
    pub date_from: String,
    pub date_to: String,
    pub max_participants: u32,
    pub join_deadline: Option<String>,
}

pub async fn create_group(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateGroupRequestBody>,
) -> Result<(StatusCode, Json<GroupRequestResponse>), AppError> {
    let creator_id = actor_id(&headers)?;
    let create = group::CreateGroupRequest {
        creator_id,
        service_type: req.service_type,
        location: req.location,
        date_from: parse_date(&req.date_from)?,
        date_to: parse_date(&req.date_to)?,
        max_participants: req.max_participants,
        join_deadline: req
            .join_deadline
            .as_deref()
            .map(parse_datetime)
            .transpose()?,
    };

    let request = {
        let db = state.db.lock().unwrap();
        group::create_group_request(&db, &create)?
    };
    Ok((StatusCode::CREATED, Json(request.into())))
}

// POST /api/groups/join
#[derive(Deserialize)]
pub struct JoinGroupRequest {
    pub invite_code: String,
    pub horse_name: Option<String>,
    pub notes: Option<String>,
}

pub async fn join_group(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<JoinGroupRequest>,
) -> Result<Json<ParticipantResponse>, AppError> {
    let user_id = actor_id(&headers)?;
    let join = group::JoinGroup {
        invite_code: req.invite_code,
        user_id,
        horse_name: req.horse_name,
        notes: req.notes,
    };

    let participant = {
        let mut db = state.db.lock().unwrap();
        group::join_group(&mut db, &join)?
    };
    Ok(Json(participant.into()))
}

// POST /api/groups/participants/:id/leave
#[derive(Serialize)]
pub struct LeaveResponse {
    participant: ParticipantResponse,
    request_cancelled: bool,
}

pub async fn leave_group(
    State(state): State<Arc<AppState>>,
    Path(participant_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<LeaveResponse>, AppError> {
    let actor = actor_id(&headers)?;
    let outcome = {
        let mut db = state.db.lock().unwrap();
        group::leave_group(&mut db, &participant_id, &actor)?
    };
    Ok(Json(LeaveResponse {
        participant: outcome.participant.into(),
        request_cancelled: outcome.request_cancelled,
    }))
}

// POST /api/groups/:id/match
#[derive(Deserialize)]
pub struct MatchGroupRequest {
    pub provider_id: String,
    pub service_id: String,
    pub date: String,
    pub start_time: String,
}

#[derive(Serialize)]
pub struct ParticipantErrorResponse {
    user_id: String,
    error: String,
    code: String,
}

#[derive(Serialize)]
pub struct MatchResponse {
    bookings_created: usize,
    bookings: Vec<BookingResponse>,
    errors: Vec<ParticipantErrorResponse>,
}

pub async fn match_group(
    State(state): State<Arc<AppState>>,
    Path(group_request_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MatchGroupRequest>,
) -> Result<Json<MatchResponse>, AppError> {
    // The committing actor must be the provider whose calendar the
    // bookings land on.
    if actor_id(&headers)? != req.provider_id {
        return Err(AppError::Forbidden);
    }
    let matched = group::MatchGroup {
        group_request_id,
        provider_id: req.provider_id,
        service_id: req.service_id,
        date: parse_date(&req.date)?,
        start_time: parse_time(&req.start_time)?,
    };

    let outcome = {
        let mut db = state.db.lock().unwrap();
        group::match_group_request(&mut db, state.travel.as_deref(), &matched)?
    };

    Ok(Json(MatchResponse {
        bookings_created: outcome.bookings.len(),
        bookings: outcome.bookings.into_iter().map(Into::into).collect(),
        errors: outcome
            .errors
            .into_iter()
            .map(|e| ParticipantErrorResponse {
                user_id: e.user_id,
                error: e.error.to_string(),
                code: crate::errors::booking_error_code(&e.error).to_string(),
            })
            .collect(),
    }))
}
