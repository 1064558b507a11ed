use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use axum::async_trait;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::{CredentialStore, NewUser, StoreError, TaskStore};
use crate::auth::repo_types::User;
use crate::tasks::repo_types::{
    AssignedTask, Assignment, NewAssignment, NewTask, ParentFilter, Task, TaskFilter, TaskRole,
};
use crate::users::repo_types::{WorkDay, WorkScheduleEntry};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    schedule: Vec<WorkScheduleEntry>,
    tasks: Vec<Task>,
    assignments: Vec<Assignment>,
}

impl Tables {
    /// Insert one schedule row, enforcing unique `(user_id, weekday)`.
    fn insert_work_day(&mut self, user_id: Uuid, day: &WorkDay) -> Result<WorkScheduleEntry, StoreError> {
        if self
            .schedule
            .iter()
            .any(|e| e.user_id == user_id && e.weekday == day.weekday)
        {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "duplicate key value violates unique constraint user_work_schedule_user_id_weekday_key"
            )));
        }
        let entry = WorkScheduleEntry {
            id: Uuid::new_v4(),
            user_id,
            weekday: day.weekday,
            start_time: day.start_time.clone(),
            end_time: day.end_time.clone(),
        };
        self.schedule.push(entry.clone());
        Ok(entry)
    }

    fn assigned(&self, user_id: Uuid) -> impl Iterator<Item = AssignedTask> + '_ {
        self.assignments
            .iter()
            .filter(move |a| a.user_id == user_id)
            .filter_map(move |a| {
                self.tasks.iter().find(|t| t.id == a.task_id).map(|t| AssignedTask {
                    task: t.clone(),
                    assigned_hours: a.assigned_hours,
                    role: a.role.clone(),
                })
            })
    }
}

/// In-process store for handler tests; mirrors the constraints of the SQL schema.
///
/// Multi-row writes stage rows one at a time and undo them on failure, the
/// way a dropped transaction would.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_schedule_writes: AtomicBool,
    miss_email_lookups: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.tables.lock().unwrap().users.len()
    }

    pub fn schedule_row_count(&self) -> usize {
        self.tables.lock().unwrap().schedule.len()
    }

    pub fn task_count(&self) -> usize {
        self.tables.lock().unwrap().tasks.len()
    }

    pub fn assignment_count(&self) -> usize {
        self.tables.lock().unwrap().assignments.len()
    }

    pub fn remove_user(&self, id: Uuid) {
        let mut tables = self.tables.lock().unwrap();
        tables.users.retain(|u| u.id != id);
        tables.schedule.retain(|e| e.user_id != id);
        tables.assignments.retain(|a| a.user_id != id);
    }

    /// Make every schedule row insert fail, as a broken connection would.
    pub fn fail_schedule_writes(&self) {
        self.fail_schedule_writes.store(true, Ordering::SeqCst);
    }

    /// Make `find_user_by_email` miss, as when a concurrent registration
    /// commits between the lookup and the insert.
    pub fn miss_email_lookups(&self) {
        self.miss_email_lookups.store(true, Ordering::SeqCst);
    }

    fn schedule_write_fault(&self) -> Result<(), StoreError> {
        if self.fail_schedule_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "connection reset while inserting user_work_schedule"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        if self.miss_email_lookups.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(&self, user: NewUser, schedule: &[WorkDay]) -> Result<User, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }

        let now = OffsetDateTime::now_utc();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            display_name: user.display_name,
            name: user.name,
            surname: user.surname,
            phone: user.phone,
            telegram: user.telegram,
            locale: user.locale,
            created_at: now,
            updated_at: now,
        };

        let users_before = tables.users.len();
        let schedule_before = tables.schedule.len();
        tables.users.push(created.clone());

        for day in schedule {
            let staged = self
                .schedule_write_fault()
                .and_then(|()| tables.insert_work_day(created.id, day));
            if let Err(e) = staged {
                tables.users.truncate(users_before);
                tables.schedule.truncate(schedule_before);
                return Err(e);
            }
        }
        Ok(created)
    }

    async fn search_users(&self, query: &str, limit: i64) -> Result<Vec<User>, StoreError> {
        let needle = query.to_lowercase();
        let matches = |field: Option<&str>| {
            field
                .map(|f| f.to_lowercase().contains(&needle))
                .unwrap_or(false)
        };
        let tables = self.tables.lock().unwrap();
        let mut found: Vec<User> = tables
            .users
            .iter()
            .filter(|u| {
                matches(Some(&u.email))
                    || matches(Some(&u.display_name))
                    || matches(u.name.as_deref())
                    || matches(u.surname.as_deref())
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| (&a.display_name, &a.email).cmp(&(&b.display_name, &b.email)));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn work_schedule(&self, user_id: Uuid) -> Result<Vec<WorkScheduleEntry>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<WorkScheduleEntry> = tables
            .schedule
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.weekday);
        Ok(rows)
    }

    async fn replace_work_schedule(
        &self,
        user_id: Uuid,
        days: &[WorkDay],
    ) -> Result<Vec<WorkScheduleEntry>, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let snapshot = tables.schedule.clone();
        tables.schedule.retain(|e| e.user_id != user_id);

        let mut entries = Vec::with_capacity(days.len());
        for day in days {
            let staged = self
                .schedule_write_fault()
                .and_then(|()| tables.insert_work_day(user_id, day));
            match staged {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tables.schedule = snapshot;
                    return Err(e);
                }
            }
        }
        entries.sort_by_key(|e| e.weekday);
        Ok(entries)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_task(&self, task: NewTask) -> Result<Task, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(parent) = task.parent_task_id {
            if !tables.tasks.iter().any(|t| t.id == parent) {
                return Err(StoreError::Backend(anyhow::anyhow!(
                    "insert or update on table task violates foreign key constraint"
                )));
            }
        }
        let now = OffsetDateTime::now_utc();
        let created = Task {
            id: Uuid::new_v4(),
            parent_task_id: task.parent_task_id,
            title: task.title,
            description: task.description,
            priority: task.priority,
            status: task.status,
            estimated_hours: task.estimated_hours,
            start_date: task.start_date,
            due_date: task.due_date,
            created_by: task.created_by,
            created_at: now,
            updated_at: now,
        };
        tables.tasks.push(created.clone());
        tables.assignments.push(Assignment {
            id: Uuid::new_v4(),
            task_id: created.id,
            user_id: created.created_by,
            role: TaskRole::Owner.as_str().to_string(),
            assigned_hours: None,
            assigned_at: now,
        });
        Ok(created)
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn update_task(&self, task: &Task) -> Result<Option<Task>, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(row) = tables.tasks.iter_mut().find(|t| t.id == task.id) else {
            return Ok(None);
        };
        row.title = task.title.clone();
        row.description = task.description.clone();
        row.priority = task.priority.clone();
        row.status = task.status.clone();
        row.estimated_hours = task.estimated_hours;
        row.start_date = task.start_date;
        row.due_date = task.due_date;
        row.updated_at = OffsetDateTime::now_utc();
        Ok(Some(row.clone()))
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.tasks.iter().any(|t| t.id == id) {
            return Ok(false);
        }
        let mut doomed = vec![id];
        let mut i = 0;
        while i < doomed.len() {
            let parent = doomed[i];
            doomed.extend(
                tables
                    .tasks
                    .iter()
                    .filter(|t| t.parent_task_id == Some(parent))
                    .map(|t| t.id),
            );
            i += 1;
        }
        tables.tasks.retain(|t| !doomed.contains(&t.id));
        tables.assignments.retain(|a| !doomed.contains(&a.task_id));
        Ok(true)
    }

    async fn assigned_tasks(
        &self,
        user_id: Uuid,
        filter: &TaskFilter,
    ) -> Result<Vec<AssignedTask>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<AssignedTask> = tables
            .assigned(user_id)
            .filter(|row| match filter.parent {
                ParentFilter::Any => true,
                ParentFilter::Root => row.task.parent_task_id.is_none(),
                ParentFilter::Child(id) => row.task.parent_task_id == Some(id),
            })
            .filter(|row| filter.status.is_none() || row.task.status == filter.status)
            .filter(|row| filter.priority.is_none() || row.task.priority == filter.priority)
            .collect();
        // Later inserts first when timestamps tie.
        rows.reverse();
        rows.sort_by(|a, b| b.task.created_at.cmp(&a.task.created_at));
        Ok(rows
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn calendar_tasks(
        &self,
        user_id: Uuid,
        from: Date,
        to: Date,
    ) -> Result<Vec<AssignedTask>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<AssignedTask> = tables
            .assigned(user_id)
            .filter(|row| match (row.task.start_date, row.task.due_date) {
                (Some(start), Some(due)) => start <= to && due >= from,
                _ => false,
            })
            .collect();
        rows.sort_by(|a, b| {
            (a.task.start_date, &a.task.title).cmp(&(b.task.start_date, &b.task.title))
        });
        Ok(rows)
    }

    async fn create_assignment(
        &self,
        assignment: NewAssignment,
    ) -> Result<Assignment, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if tables
            .assignments
            .iter()
            .any(|a| a.task_id == assignment.task_id && a.user_id == assignment.user_id)
        {
            return Err(StoreError::DuplicateAssignment);
        }
        let created = Assignment {
            id: Uuid::new_v4(),
            task_id: assignment.task_id,
            user_id: assignment.user_id,
            role: assignment.role.as_str().to_string(),
            assigned_hours: assignment.assigned_hours,
            assigned_at: OffsetDateTime::now_utc(),
        };
        tables.assignments.push(created.clone());
        Ok(created)
    }

    async fn find_assignment(&self, id: Uuid) -> Result<Option<Assignment>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.assignments.iter().find(|a| a.id == id).cloned())
    }

    async fn assignment_for(
        &self,
        task_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Assignment>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .assignments
            .iter()
            .find(|a| a.task_id == task_id && a.user_id == user_id)
            .cloned())
    }

    async fn assignments(&self, task_id: Uuid) -> Result<Vec<Assignment>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Assignment> = tables
            .assignments
            .iter()
            .filter(|a| a.task_id == task_id)
            .cloned()
            .collect();
        rows.reverse();
        rows.sort_by(|a, b| b.assigned_at.cmp(&a.assigned_at));
        Ok(rows)
    }

    async fn delete_assignment(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.assignments.len();
        tables.assignments.retain(|a| a.id != id);
        Ok(tables.assignments.len() != before)
    }
}
