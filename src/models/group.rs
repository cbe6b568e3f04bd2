use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A coordination record letting several horse owners at one location
/// request the same provider visit. Matched by a provider committing a
/// single shared time slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRequest {
    pub id: String,
    pub creator_id: String,
    pub service_type: String,
    pub location: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub max_participants: u32,
    pub status: GroupStatus,
    pub invite_code: String,
    pub join_deadline: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Open,
    Matched,
    Cancelled,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Open => "open",
            GroupStatus::Matched => "matched",
            GroupStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "matched" => GroupStatus::Matched,
            "cancelled" => GroupStatus::Cancelled,
            _ => GroupStatus::Open,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupParticipant {
    pub id: String,
    pub group_request_id: String,
    pub user_id: String,
    pub horse_name: Option<String>,
    pub notes: Option<String>,
    pub status: ParticipantStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Joined,
    Cancelled,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Joined => "joined",
            ParticipantStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "cancelled" => ParticipantStatus::Cancelled,
            _ => ParticipantStatus::Joined,
        }
    }
}
