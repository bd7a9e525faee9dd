//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity. Reads
//! compose aggregates root-to-leaf; writes persist leaf-to-root inside a
//! single transaction.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::db::FieldPatch;
use crate::errors::AppError;
use crate::models::{
    AgendaPoint, AgendaPointInput, CompletionNote, CreateMeetingRequest, CreateTaskRequest,
    Meeting, MeetingStatus, Task, TaskStatus,
};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== MEETING OPERATIONS ====================

    /// List all meetings in shallow form: agenda collections stay empty so
    /// the list endpoint does not fan out into per-root child queries.
    pub async fn list_meetings(&self) -> Result<Vec<Meeting>, AppError> {
        let rows = sqlx::query(
            "SELECT id, title, location, scheduled_for, status, created_by, created_at, updated_at
             FROM meetings ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(meeting_from_row).collect())
    }

    /// Get a meeting with its fully composed agenda.
    pub async fn get_meeting(&self, id: &str) -> Result<Option<Meeting>, AppError> {
        let row = sqlx::query(
            "SELECT id, title, location, scheduled_for, status, created_by, created_at, updated_at
             FROM meetings WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut meeting = meeting_from_row(&row);
        meeting.agenda_points = self.load_agenda_points(id).await?;
        Ok(Some(meeting))
    }

    /// Create a new meeting with an empty agenda.
    pub async fn create_meeting(&self, request: &CreateMeetingRequest) -> Result<Meeting, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let status = request.status.clone().unwrap_or_default();

        sqlx::query(
            "INSERT INTO meetings (id, title, location, scheduled_for, status, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.title)
        .bind(&request.location)
        .bind(&request.scheduled_for)
        .bind(status.as_str())
        .bind(&request.created_by)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Meeting {
            id,
            title: request.title.clone(),
            location: request.location.clone(),
            scheduled_for: request.scheduled_for.clone(),
            status,
            created_by: request.created_by.clone(),
            created_at: now.clone(),
            updated_at: now,
            agenda_points: Vec::new(),
        })
    }

    /// Apply a sparse scalar patch and/or a full agenda replacement.
    ///
    /// Both run in one transaction: a failed agenda insert rolls back the
    /// scalar patch too, and the meeting's prior state stays untouched.
    pub async fn update_meeting(
        &self,
        id: &str,
        patch: Option<&FieldPatch>,
        agenda: Option<&[AgendaPointInput]>,
    ) -> Result<Meeting, AppError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT id FROM meetings WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("Meeting {} not found", id)));
        }

        let now = Utc::now().to_rfc3339();

        if let Some(patch) = patch {
            let sql = format!(
                "UPDATE meetings SET {}, updated_at = ? WHERE id = ?",
                patch.set_clause()
            );
            patch
                .bind_values(sqlx::query(&sql))
                .bind(&now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("UPDATE meetings SET updated_at = ? WHERE id = ?")
                .bind(&now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(points) = agenda {
            replace_agenda_points(&mut tx, id, points, &now).await?;
        }

        tx.commit().await?;

        self.get_meeting(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Meeting {} not found", id)))
    }

    /// Delete a meeting; agenda points and their notes cascade.
    pub async fn delete_meeting(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM meetings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Meeting {} not found", id)));
        }

        Ok(())
    }

    /// Load the ordered agenda with completion notes grouped per point.
    async fn load_agenda_points(&self, meeting_id: &str) -> Result<Vec<AgendaPoint>, AppError> {
        let point_rows = sqlx::query(
            "SELECT id, meeting_id, title, presenter, duration_minutes, created_at
             FROM agenda_points WHERE meeting_id = ? ORDER BY created_at, position",
        )
        .bind(meeting_id)
        .fetch_all(&self.pool)
        .await?;

        // One scoped query for all grandchildren instead of one per point.
        let note_rows = sqlx::query(
            "SELECT n.id, n.agenda_point_id, n.body, n.author, n.created_at
             FROM completion_notes n
             JOIN agenda_points p ON p.id = n.agenda_point_id
             WHERE p.meeting_id = ? ORDER BY n.created_at, n.position",
        )
        .bind(meeting_id)
        .fetch_all(&self.pool)
        .await?;

        let mut notes_by_point: HashMap<String, Vec<CompletionNote>> = HashMap::new();
        for row in &note_rows {
            let note = note_from_row(row);
            notes_by_point
                .entry(note.agenda_point_id.clone())
                .or_default()
                .push(note);
        }

        Ok(point_rows
            .iter()
            .map(|row| {
                let mut point = agenda_point_from_row(row);
                point.notes = notes_by_point.remove(&point.id).unwrap_or_default();
                point
            })
            .collect())
    }

    // ==================== TASK OPERATIONS ====================

    /// List all tasks.
    pub async fn list_tasks(&self) -> Result<Vec<Task>, AppError> {
        let rows = sqlx::query(
            "SELECT id, title, description, status, assignee, due_date, priority, created_by, created_at, updated_at
             FROM tasks ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(task_from_row).collect())
    }

    /// Get a task by ID.
    pub async fn get_task(&self, id: &str) -> Result<Option<Task>, AppError> {
        let row = sqlx::query(
            "SELECT id, title, description, status, assignee, due_date, priority, created_by, created_at, updated_at
             FROM tasks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(task_from_row))
    }

    /// Create a new task.
    pub async fn create_task(&self, request: &CreateTaskRequest) -> Result<Task, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let status = request.status.clone().unwrap_or_default();

        sqlx::query(
            "INSERT INTO tasks (id, title, description, status, assignee, due_date, priority, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(status.as_str())
        .bind(&request.assignee)
        .bind(&request.due_date)
        .bind(request.priority)
        .bind(&request.created_by)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Task {
            id,
            title: request.title.clone(),
            description: request.description.clone(),
            status,
            assignee: request.assignee.clone(),
            due_date: request.due_date.clone(),
            priority: request.priority,
            created_by: request.created_by.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Apply a sparse whitelisted patch to a task.
    pub async fn patch_task(&self, id: &str, patch: &FieldPatch) -> Result<Task, AppError> {
        if self.get_task(id).await?.is_none() {
            return Err(AppError::NotFound(format!("Task {} not found", id)));
        }

        let now = Utc::now().to_rfc3339();
        let sql = format!(
            "UPDATE tasks SET {}, updated_at = ? WHERE id = ?",
            patch.set_clause()
        );
        patch
            .bind_values(sqlx::query(&sql))
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.get_task(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task {} not found", id)))
    }

    /// Delete a task.
    pub async fn delete_task(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Task {} not found", id)));
        }

        Ok(())
    }
}

/// Replace a meeting's agenda inside an open transaction.
///
/// Discards the existing collection (notes cascade away with their points),
/// then re-inserts the submitted points in client order. Ids are always
/// freshly assigned; old point ids do not survive a replace.
async fn replace_agenda_points(
    tx: &mut Transaction<'_, Sqlite>,
    meeting_id: &str,
    points: &[AgendaPointInput],
    now: &str,
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM agenda_points WHERE meeting_id = ?")
        .bind(meeting_id)
        .execute(&mut **tx)
        .await?;

    for (index, point) in points.iter().enumerate() {
        let point_id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO agenda_points (id, meeting_id, position, title, presenter, duration_minutes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&point_id)
        .bind(meeting_id)
        .bind(index as i64)
        .bind(&point.title)
        .bind(&point.presenter)
        .bind(point.duration_minutes)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        for (note_index, note) in point.notes.iter().enumerate() {
            sqlx::query(
                "INSERT INTO completion_notes (id, agenda_point_id, position, body, author, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&point_id)
            .bind(note_index as i64)
            .bind(&note.body)
            .bind(&note.author)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}

// Helper functions for row conversion

fn meeting_from_row(row: &sqlx::sqlite::SqliteRow) -> Meeting {
    let status: String = row.get("status");
    Meeting {
        id: row.get("id"),
        title: row.get("title"),
        location: row.get("location"),
        scheduled_for: row.get("scheduled_for"),
        status: MeetingStatus::from_str(&status).unwrap_or_default(),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        agenda_points: Vec::new(),
    }
}

fn agenda_point_from_row(row: &sqlx::sqlite::SqliteRow) -> AgendaPoint {
    AgendaPoint {
        id: row.get("id"),
        meeting_id: row.get("meeting_id"),
        title: row.get("title"),
        presenter: row.get("presenter"),
        duration_minutes: row.get("duration_minutes"),
        notes: Vec::new(),
        created_at: row.get("created_at"),
    }
}

fn note_from_row(row: &sqlx::sqlite::SqliteRow) -> CompletionNote {
    CompletionNote {
        id: row.get("id"),
        agenda_point_id: row.get("agenda_point_id"),
        body: row.get("body"),
        author: row.get("author"),
        created_at: row.get("created_at"),
    }
}

fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> Task {
    let status: String = row.get("status");
    Task {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        status: TaskStatus::from_str(&status).unwrap_or_default(),
        assignee: row.get("assignee"),
        due_date: row.get("due_date"),
        priority: row.get("priority"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
