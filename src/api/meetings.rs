//! Meeting API endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{Map, Value};

use super::DeleteResponse;
use crate::db::FieldPatch;
use crate::errors::AppError;
use crate::models::{
    AgendaPointInput, CreateMeetingRequest, Meeting, MeetingStatus, AGENDA_POINTS_KEY,
    MEETING_MUTABLE_FIELDS,
};
use crate::AppState;

/// GET /api/meetings - List all meetings (shallow, empty agendas).
pub async fn list_meetings(State(state): State<AppState>) -> Result<Json<Vec<Meeting>>, AppError> {
    let meetings = state.repo.list_meetings().await?;
    Ok(Json(meetings))
}

/// GET /api/meetings/:id - Get a single meeting with its full agenda.
pub async fn get_meeting(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Meeting>, AppError> {
    let meeting = state
        .repo
        .get_meeting(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Meeting {} not found", id)))?;
    Ok(Json(meeting))
}

/// POST /api/meetings - Create a new meeting.
pub async fn create_meeting(
    State(state): State<AppState>,
    Json(request): Json<CreateMeetingRequest>,
) -> Result<(StatusCode, Json<Meeting>), AppError> {
    // Validate required fields
    if request.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if request.created_by.trim().is_empty() {
        return Err(AppError::Validation("Creator (createdBy) is required".to_string()));
    }

    let meeting = state.repo.create_meeting(&request).await?;
    Ok((StatusCode::CREATED, Json(meeting)))
}

/// PATCH /api/meetings/:id - Apply a sparse patch, and/or replace the whole
/// agenda when the reserved `agendaPoints` key is present.
pub async fn update_meeting(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut body): Json<Map<String, Value>>,
) -> Result<Json<Meeting>, AppError> {
    let agenda = match body.remove(AGENDA_POINTS_KEY) {
        Some(value) => Some(parse_agenda(value)?),
        None => None,
    };

    validate_meeting_patch(&body)?;

    let patch = match FieldPatch::from_input(MEETING_MUTABLE_FIELDS, &body) {
        Ok(patch) => Some(patch),
        // A pure agenda replacement carries no scalar fields.
        Err(AppError::NoMutableFields) if agenda.is_some() => None,
        Err(e) => return Err(e),
    };

    let meeting = state
        .repo
        .update_meeting(&id, patch.as_ref(), agenda.as_deref())
        .await?;
    Ok(Json(meeting))
}

/// DELETE /api/meetings/:id - Delete a meeting and its descendants.
pub async fn delete_meeting(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.repo.delete_meeting(&id).await?;
    Ok(Json(DeleteResponse::ok()))
}

fn parse_agenda(value: Value) -> Result<Vec<AgendaPointInput>, AppError> {
    let points: Vec<AgendaPointInput> = serde_json::from_value(value)
        .map_err(|e| AppError::Validation(format!("Invalid agenda points payload: {}", e)))?;

    for point in &points {
        if point.title.trim().is_empty() {
            return Err(AppError::Validation(
                "Agenda point title is required".to_string(),
            ));
        }
        for note in &point.notes {
            if note.body.trim().is_empty() {
                return Err(AppError::Validation(
                    "Completion note body is required".to_string(),
                ));
            }
        }
    }

    Ok(points)
}

/// The patch builder passes values through unchanged, so type and enum
/// checks happen here, before any store access.
fn validate_meeting_patch(body: &Map<String, Value>) -> Result<(), AppError> {
    if let Some(title) = body.get("title") {
        match title.as_str() {
            Some(t) if !t.trim().is_empty() => {}
            _ => return Err(AppError::Validation("Title cannot be empty".to_string())),
        }
    }
    if let Some(status) = body.get("status") {
        if status.as_str().and_then(MeetingStatus::from_str).is_none() {
            return Err(AppError::Validation(format!(
                "Unknown meeting status: {}",
                status
            )));
        }
    }
    Ok(())
}
