use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// One row of `task`. A task with a parent is a subtask.
#[derive(Debug, Clone, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub parent_task_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub estimated_hours: Option<f64>,
    pub start_date: Option<Date>,
    pub due_date: Option<Date>,
    pub created_by: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A task seen through one user's assignment.
#[derive(Debug, Clone, FromRow)]
pub struct AssignedTask {
    #[sqlx(flatten)]
    pub task: Task,
    pub assigned_hours: Option<f64>,
    pub role: String,
}

/// One row of `task_assignment`.
#[derive(Debug, Clone, FromRow)]
pub struct Assignment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub assigned_hours: Option<f64>,
    pub assigned_at: OffsetDateTime,
}

impl Assignment {
    pub fn is_owner(&self) -> bool {
        self.role == TaskRole::Owner.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskRole {
    Owner,
    #[default]
    Contributor,
    Viewer,
}

impl TaskRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Contributor => "contributor",
            Self::Viewer => "viewer",
        }
    }
}

impl fmt::Display for TaskRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "contributor" => Ok(Self::Contributor),
            "viewer" => Ok(Self::Viewer),
            _ => Err(()),
        }
    }
}

/// Validated fields of a task about to be inserted.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub parent_task_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub estimated_hours: Option<f64>,
    pub start_date: Option<Date>,
    pub due_date: Option<Date>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub role: TaskRole,
    pub assigned_hours: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentFilter {
    Any,
    /// Only top-level tasks.
    Root,
    Child(Uuid),
}

#[derive(Debug, Clone)]
pub struct TaskFilter {
    pub parent: ParentFilter,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub limit: i64,
    pub offset: i64,
}
