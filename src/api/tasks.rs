//! Task API endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{Map, Value};

use super::DeleteResponse;
use crate::db::FieldPatch;
use crate::errors::AppError;
use crate::models::{CreateTaskRequest, Task, TaskStatus, TASK_MUTABLE_FIELDS};
use crate::AppState;

/// GET /api/tasks - List all tasks.
pub async fn list_tasks(State(state): State<AppState>) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = state.repo.list_tasks().await?;
    Ok(Json(tasks))
}

/// GET /api/tasks/:id - Get a single task.
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    let task = state
        .repo
        .get_task(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task {} not found", id)))?;
    Ok(Json(task))
}

/// POST /api/tasks - Create a new task.
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    // Validate required fields
    if request.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if request.created_by.trim().is_empty() {
        return Err(AppError::Validation("Creator (createdBy) is required".to_string()));
    }

    let task = state.repo.create_task(&request).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// PATCH /api/tasks/:id - Apply a sparse whitelisted patch.
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Task>, AppError> {
    validate_task_patch(&body)?;

    let patch = FieldPatch::from_input(TASK_MUTABLE_FIELDS, &body)?;
    let task = state.repo.patch_task(&id, &patch).await?;
    Ok(Json(task))
}

/// DELETE /api/tasks/:id - Delete a task.
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.repo.delete_task(&id).await?;
    Ok(Json(DeleteResponse::ok()))
}

/// The patch builder passes values through unchanged, so type and enum
/// checks happen here, before any store access.
fn validate_task_patch(body: &Map<String, Value>) -> Result<(), AppError> {
    if let Some(title) = body.get("title") {
        match title.as_str() {
            Some(t) if !t.trim().is_empty() => {}
            _ => return Err(AppError::Validation("Title cannot be empty".to_string())),
        }
    }
    if let Some(status) = body.get("status") {
        if status.as_str().and_then(TaskStatus::from_str).is_none() {
            return Err(AppError::Validation(format!("Unknown task status: {}", status)));
        }
    }
    if let Some(priority) = body.get("priority") {
        if !priority.is_null() && !priority.is_i64() {
            return Err(AppError::Validation(
                "Priority must be an integer or null".to_string(),
            ));
        }
    }
    Ok(())
}
