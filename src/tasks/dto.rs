use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::tasks::repo_types::{AssignedTask, Assignment, Task};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateTaskRequest {
    pub parent_task_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub estimated_hours: Option<f64>,
    #[serde(with = "iso_date::option")]
    pub start_date: Option<Date>,
    #[serde(with = "iso_date::option")]
    pub due_date: Option<Date>,
}

/// Absent fields keep their current value. The parent cannot be changed.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub estimated_hours: Option<f64>,
    #[serde(with = "iso_date::option")]
    pub start_date: Option<Date>,
    #[serde(with = "iso_date::option")]
    pub due_date: Option<Date>,
}

/// `parent_task_id=null` selects top-level tasks only.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub parent_task_id: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub parent_task_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub estimated_hours: Option<f64>,
    #[serde(with = "iso_date::option")]
    pub start_date: Option<Date>,
    #[serde(with = "iso_date::option")]
    pub due_date: Option<Date>,
    pub created_by: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            parent_task_id: task.parent_task_id,
            title: task.title,
            description: task.description,
            priority: task.priority,
            status: task.status,
            estimated_hours: task.estimated_hours,
            start_date: task.start_date,
            due_date: task.due_date,
            created_by: task.created_by,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// A task as listed for the caller, with the caller's own assignment.
#[derive(Debug, Serialize)]
pub struct AssignedTaskResponse {
    #[serde(flatten)]
    pub task: TaskResponse,
    pub assigned_hours: Option<f64>,
    pub role: String,
}

impl From<AssignedTask> for AssignedTaskResponse {
    fn from(row: AssignedTask) -> Self {
        Self {
            task: row.task.into(),
            assigned_hours: row.assigned_hours,
            role: row.role,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateAssignmentRequest {
    pub user_id: Option<Uuid>,
    pub role: Option<String>,
    pub assigned_hours: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub assigned_hours: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub assigned_at: OffsetDateTime,
}

impl From<Assignment> for AssignmentResponse {
    fn from(a: Assignment) -> Self {
        Self {
            id: a.id,
            task_id: a.task_id,
            user_id: a.user_id,
            role: a.role,
            assigned_hours: a.assigned_hours,
            assigned_at: a.assigned_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CalendarTaskResponse {
    pub task_id: Uuid,
    pub title: String,
    #[serde(with = "iso_date::option")]
    pub start_date: Option<Date>,
    #[serde(with = "iso_date::option")]
    pub end_date: Option<Date>,
    pub allocated_hours: Option<f64>,
    pub role: String,
}

impl From<AssignedTask> for CalendarTaskResponse {
    fn from(row: AssignedTask) -> Self {
        Self {
            task_id: row.task.id,
            title: row.task.title,
            start_date: row.task.start_date,
            end_date: row.task.due_date,
            allocated_hours: row.assigned_hours,
            role: row.role,
        }
    }
}
