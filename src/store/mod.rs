use axum::async_trait;
use time::Date;
use uuid::Uuid;

use crate::auth::repo_types::User;
use crate::tasks::repo_types::{
    AssignedTask, Assignment, NewAssignment, NewTask, Task, TaskFilter,
};
use crate::users::repo_types::{WorkDay, WorkScheduleEntry};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("user is already assigned to the task")]
    DuplicateAssignment,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Fields of a user row that the caller provides at registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub phone: Option<String>,
    pub telegram: Option<String>,
    pub locale: String,
}

/// Persistence for user accounts and their weekly work schedule.
///
/// Multi-row writes (`create_user`, `replace_work_schedule`) are atomic:
/// either every row lands or none does.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Insert the account together with its initial schedule rows.
    async fn create_user(&self, user: NewUser, schedule: &[WorkDay]) -> Result<User, StoreError>;

    async fn search_users(&self, query: &str, limit: i64) -> Result<Vec<User>, StoreError>;

    /// Entries ordered by weekday.
    async fn work_schedule(&self, user_id: Uuid) -> Result<Vec<WorkScheduleEntry>, StoreError>;

    /// Delete every entry of the user, then insert `days`.
    async fn replace_work_schedule(
        &self,
        user_id: Uuid,
        days: &[WorkDay],
    ) -> Result<Vec<WorkScheduleEntry>, StoreError>;
}

/// Persistence for tasks and their assignments.
///
/// Deleting a task removes its subtasks and every assignment below it.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert the task and the creator's `owner` assignment in one unit.
    async fn create_task(&self, task: NewTask) -> Result<Task, StoreError>;

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;

    /// Overwrite the editable fields of an existing task.
    async fn update_task(&self, task: &Task) -> Result<Option<Task>, StoreError>;

    async fn delete_task(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Tasks the user is assigned to, newest first.
    async fn assigned_tasks(
        &self,
        user_id: Uuid,
        filter: &TaskFilter,
    ) -> Result<Vec<AssignedTask>, StoreError>;

    /// Assigned tasks whose `[start_date, due_date]` overlaps `[from, to]`.
    async fn calendar_tasks(
        &self,
        user_id: Uuid,
        from: Date,
        to: Date,
    ) -> Result<Vec<AssignedTask>, StoreError>;

    async fn create_assignment(&self, assignment: NewAssignment)
        -> Result<Assignment, StoreError>;

    async fn find_assignment(&self, id: Uuid) -> Result<Option<Assignment>, StoreError>;

    async fn assignment_for(
        &self,
        task_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Assignment>, StoreError>;

    /// Newest first.
    async fn assignments(&self, task_id: Uuid) -> Result<Vec<Assignment>, StoreError>;

    async fn delete_assignment(&self, id: Uuid) -> Result<bool, StoreError>;
}
