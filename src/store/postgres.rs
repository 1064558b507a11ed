use anyhow::Context;
use axum::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use time::Date;
use uuid::Uuid;

use super::{CredentialStore, NewUser, StoreError, TaskStore};
use crate::auth::repo_types::User;
use crate::tasks::repo_types::{
    AssignedTask, Assignment, NewAssignment, NewTask, ParentFilter, Task, TaskFilter, TaskRole,
};
use crate::users::repo_types::{WorkDay, WorkScheduleEntry};

const EMAIL_UNIQUE_CONSTRAINT: &str = "app_user_email_key";
const ASSIGNMENT_UNIQUE_CONSTRAINT: &str = "task_assignment_task_id_user_id_key";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_insert_user_error(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() && db_err.constraint() == Some(EMAIL_UNIQUE_CONSTRAINT) {
            return StoreError::DuplicateEmail;
        }
    }
    StoreError::Backend(anyhow::Error::new(err).context("insert app_user"))
}

fn map_insert_assignment_error(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() && db_err.constraint() == Some(ASSIGNMENT_UNIQUE_CONSTRAINT)
        {
            return StoreError::DuplicateAssignment;
        }
    }
    StoreError::Backend(anyhow::Error::new(err).context("insert task_assignment"))
}

/// `%` and `_` typed by the user are matched literally.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Insert one schedule row within a transaction.
async fn insert_work_day_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    day: &WorkDay,
) -> anyhow::Result<WorkScheduleEntry> {
    let entry = sqlx::query_as::<_, WorkScheduleEntry>(
        r#"
        INSERT INTO user_work_schedule (id, user_id, weekday, start_time, end_time)
        VALUES ($1, $2, $3, $4::time, $5::time)
        RETURNING id, user_id, weekday,
                  to_char(start_time, 'HH24:MI') AS start_time,
                  to_char(end_time, 'HH24:MI') AS end_time
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(day.weekday)
    .bind(day.start_time.as_deref())
    .bind(day.end_time.as_deref())
    .fetch_one(&mut **tx)
    .await
    .with_context(|| format!("insert work schedule weekday {}", day.weekday))?;
    Ok(entry)
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, display_name, name, surname, phone,
                   telegram, locale, created_at, updated_at
            FROM app_user
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, display_name, name, surname, phone,
                   telegram, locale, created_at, updated_at
            FROM app_user
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser, schedule: &[WorkDay]) -> Result<User, StoreError> {
        // Dropping `tx` on an early return rolls the whole unit back.
        let mut tx = self.pool.begin().await.context("begin tx")?;

        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO app_user (id, email, password_hash, display_name, name, surname,
                                  phone, telegram, locale)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, email, password_hash, display_name, name, surname, phone,
                      telegram, locale, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.name)
        .bind(&user.surname)
        .bind(&user.phone)
        .bind(&user.telegram)
        .bind(&user.locale)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_user_error)?;

        for day in schedule {
            insert_work_day_tx(&mut tx, created.id, day).await?;
        }

        tx.commit().await.context("commit tx")?;
        Ok(created)
    }

    async fn search_users(&self, query: &str, limit: i64) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, display_name, name, surname, phone,
                   telegram, locale, created_at, updated_at
            FROM app_user
            WHERE email ILIKE $1
               OR display_name ILIKE $1
               OR name ILIKE $1
               OR surname ILIKE $1
            ORDER BY display_name, email
            LIMIT $2
            "#,
        )
        .bind(like_pattern(query))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("search users")?;
        Ok(rows)
    }

    async fn work_schedule(&self, user_id: Uuid) -> Result<Vec<WorkScheduleEntry>, StoreError> {
        let rows = sqlx::query_as::<_, WorkScheduleEntry>(
            r#"
            SELECT id, user_id, weekday,
                   to_char(start_time, 'HH24:MI') AS start_time,
                   to_char(end_time, 'HH24:MI') AS end_time
            FROM user_work_schedule
            WHERE user_id = $1
            ORDER BY weekday ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("list work schedule")?;
        Ok(rows)
    }

    async fn replace_work_schedule(
        &self,
        user_id: Uuid,
        days: &[WorkDay],
    ) -> Result<Vec<WorkScheduleEntry>, StoreError> {
        let mut tx = self.pool.begin().await.context("begin tx")?;

        sqlx::query("DELETE FROM user_work_schedule WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("delete work schedule")?;

        let mut entries = Vec::with_capacity(days.len());
        for day in days {
            entries.push(insert_work_day_tx(&mut tx, user_id, day).await?);
        }

        tx.commit().await.context("commit tx")?;
        entries.sort_by_key(|e| e.weekday);
        Ok(entries)
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn create_task(&self, task: NewTask) -> Result<Task, StoreError> {
        let mut tx = self.pool.begin().await.context("begin tx")?;

        let created = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO task (id, parent_task_id, title, description, priority, status,
                              estimated_hours, start_date, due_date, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, parent_task_id, title, description, priority, status,
                      estimated_hours, start_date, due_date, created_by, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(task.parent_task_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.priority)
        .bind(&task.status)
        .bind(task.estimated_hours)
        .bind(task.start_date)
        .bind(task.due_date)
        .bind(task.created_by)
        .fetch_one(&mut *tx)
        .await
        .context("insert task")?;

        sqlx::query(
            r#"
            INSERT INTO task_assignment (id, task_id, user_id, role)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(created.id)
        .bind(task.created_by)
        .bind(TaskRole::Owner.as_str())
        .execute(&mut *tx)
        .await
        .context("insert owner assignment")?;

        tx.commit().await.context("commit tx")?;
        Ok(created)
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, parent_task_id, title, description, priority, status,
                   estimated_hours, start_date, due_date, created_by, created_at, updated_at
            FROM task
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("find task")?;
        Ok(task)
    }

    async fn update_task(&self, task: &Task) -> Result<Option<Task>, StoreError> {
        let updated = sqlx::query_as::<_, Task>(
            r#"
            UPDATE task
            SET title = $2, description = $3, priority = $4, status = $5,
                estimated_hours = $6, start_date = $7, due_date = $8, updated_at = now()
            WHERE id = $1
            RETURNING id, parent_task_id, title, description, priority, status,
                      estimated_hours, start_date, due_date, created_by, created_at, updated_at
            "#,
        )
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.priority)
        .bind(&task.status)
        .bind(task.estimated_hours)
        .bind(task.start_date)
        .bind(task.due_date)
        .fetch_optional(&self.pool)
        .await
        .context("update task")?;
        Ok(updated)
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool, StoreError> {
        // Subtasks and assignments go with it via ON DELETE CASCADE.
        let res = sqlx::query("DELETE FROM task WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("delete task")?;
        Ok(res.rows_affected() > 0)
    }

    async fn assigned_tasks(
        &self,
        user_id: Uuid,
        filter: &TaskFilter,
    ) -> Result<Vec<AssignedTask>, StoreError> {
        let (parent_id, roots_only) = match filter.parent {
            ParentFilter::Any => (None, false),
            ParentFilter::Root => (None, true),
            ParentFilter::Child(id) => (Some(id), false),
        };
        let rows = sqlx::query_as::<_, AssignedTask>(
            r#"
            SELECT t.id, t.parent_task_id, t.title, t.description, t.priority, t.status,
                   t.estimated_hours, t.start_date, t.due_date, t.created_by,
                   t.created_at, t.updated_at,
                   a.assigned_hours, a.role
            FROM task t
            JOIN task_assignment a ON a.task_id = t.id
            WHERE a.user_id = $1
              AND ($2::uuid IS NULL OR t.parent_task_id = $2)
              AND (NOT $3 OR t.parent_task_id IS NULL)
              AND ($4::text IS NULL OR t.status = $4)
              AND ($5::text IS NULL OR t.priority = $5)
            ORDER BY t.created_at DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(user_id)
        .bind(parent_id)
        .bind(roots_only)
        .bind(&filter.status)
        .bind(&filter.priority)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .context("list assigned tasks")?;
        Ok(rows)
    }

    async fn calendar_tasks(
        &self,
        user_id: Uuid,
        from: Date,
        to: Date,
    ) -> Result<Vec<AssignedTask>, StoreError> {
        let rows = sqlx::query_as::<_, AssignedTask>(
            r#"
            SELECT t.id, t.parent_task_id, t.title, t.description, t.priority, t.status,
                   t.estimated_hours, t.start_date, t.due_date, t.created_by,
                   t.created_at, t.updated_at,
                   a.assigned_hours, a.role
            FROM task t
            JOIN task_assignment a ON a.task_id = t.id AND a.user_id = $1
            WHERE t.start_date <= $3
              AND t.due_date >= $2
            ORDER BY t.start_date, t.title
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .context("list calendar tasks")?;
        Ok(rows)
    }

    async fn create_assignment(
        &self,
        assignment: NewAssignment,
    ) -> Result<Assignment, StoreError> {
        let created = sqlx::query_as::<_, Assignment>(
            r#"
            INSERT INTO task_assignment (id, task_id, user_id, role, assigned_hours)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, task_id, user_id, role, assigned_hours, assigned_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(assignment.task_id)
        .bind(assignment.user_id)
        .bind(assignment.role.as_str())
        .bind(assignment.assigned_hours)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_assignment_error)?;
        Ok(created)
    }

    async fn find_assignment(&self, id: Uuid) -> Result<Option<Assignment>, StoreError> {
        let row = sqlx::query_as::<_, Assignment>(
            r#"
            SELECT id, task_id, user_id, role, assigned_hours, assigned_at
            FROM task_assignment
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("find assignment")?;
        Ok(row)
    }

    async fn assignment_for(
        &self,
        task_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Assignment>, StoreError> {
        let row = sqlx::query_as::<_, Assignment>(
            r#"
            SELECT id, task_id, user_id, role, assigned_hours, assigned_at
            FROM task_assignment
            WHERE task_id = $1 AND user_id = $2
            "#,
        )
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("find assignment for user")?;
        Ok(row)
    }

    async fn assignments(&self, task_id: Uuid) -> Result<Vec<Assignment>, StoreError> {
        let rows = sqlx::query_as::<_, Assignment>(
            r#"
            SELECT id, task_id, user_id, role, assigned_hours, assigned_at
            FROM task_assignment
            WHERE task_id = $1
            ORDER BY assigned_at DESC
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .context("list assignments")?;
        Ok(rows)
    }

    async fn delete_assignment(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM task_assignment WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("delete assignment")?;
        Ok(res.rows_affected() > 0)
    }
}
