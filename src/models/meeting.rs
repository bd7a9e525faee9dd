//! Meeting aggregate: a meeting owns ordered agenda points, each agenda
//! point owns ordered completion notes.

use serde::{Deserialize, Serialize};

use crate::db::MutableField;

/// Reserved PATCH key that carries a full agenda replacement.
pub const AGENDA_POINTS_KEY: &str = "agendaPoints";

/// Attributes a client may change on a meeting through PATCH. Identifiers,
/// `createdBy` and timestamps are immutable once created.
pub const MEETING_MUTABLE_FIELDS: &[MutableField] = &[
    MutableField {
        api_name: "title",
        column: "title",
    },
    MutableField {
        api_name: "location",
        column: "location",
    },
    MutableField {
        api_name: "scheduledFor",
        column: "scheduled_for",
    },
    MutableField {
        api_name: "status",
        column: "status",
    },
];

/// Lifecycle status of a meeting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Scheduled,
    InProgress,
    Closed,
    Cancelled,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Scheduled => "scheduled",
            MeetingStatus::InProgress => "in_progress",
            MeetingStatus::Closed => "closed",
            MeetingStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(MeetingStatus::Scheduled),
            "in_progress" => Some(MeetingStatus::InProgress),
            "closed" => Some(MeetingStatus::Closed),
            "cancelled" => Some(MeetingStatus::Cancelled),
            _ => None,
        }
    }
}

impl Default for MeetingStatus {
    fn default() -> Self {
        MeetingStatus::Scheduled
    }
}

/// A remark recorded against an agenda point after it was handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionNote {
    pub id: String,
    pub agenda_point_id: String,
    pub body: String,
    pub author: String,
    pub created_at: String,
}

/// A single item on a meeting's agenda.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaPoint {
    pub id: String,
    pub meeting_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presenter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub notes: Vec<CompletionNote>,
    pub created_at: String,
}

/// A meeting with its composed agenda.
///
/// List endpoints return meetings in shallow form: `agendaPoints` is an
/// empty placeholder and only detail fetches compose the full aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<String>,
    pub status: MeetingStatus,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub agenda_points: Vec<AgendaPoint>,
}

/// Request body for creating a new meeting.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeetingRequest {
    pub title: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub scheduled_for: Option<String>,
    #[serde(default)]
    pub status: Option<MeetingStatus>,
    pub created_by: String,
}

/// A submitted agenda point inside a full agenda replacement.
///
/// Carries no identifier: new and edited points are indistinguishable to
/// the client, so the server assigns fresh ids on every replace.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaPointInput {
    pub title: String,
    #[serde(default)]
    pub presenter: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub notes: Vec<CompletionNoteInput>,
}

/// A submitted completion note inside a full agenda replacement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionNoteInput {
    pub body: String,
    pub author: String,
}
