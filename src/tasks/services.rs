use time::{macros::format_description, Date};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
    tasks::{
        dto::{
            AssignedTaskResponse, AssignmentResponse, CalendarQuery, CalendarTaskResponse,
            CreateAssignmentRequest, CreateTaskRequest, TaskListQuery, TaskResponse,
            UpdateTaskRequest,
        },
        repo_types::{NewAssignment, NewTask, ParentFilter, Task, TaskFilter, TaskRole},
    },
};

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 2000;

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_hours(hours: Option<f64>, field: &str) -> AppResult<Option<f64>> {
    match hours {
        Some(h) if !h.is_finite() || h < 0.0 => Err(AppError::validation(format!(
            "{field} must be a non-negative number"
        ))),
        other => Ok(other),
    }
}

fn check_dates(start: Option<Date>, due: Option<Date>) -> AppResult<()> {
    if let (Some(start), Some(due)) = (start, due) {
        if start > due {
            return Err(AppError::validation(
                "start_date must be earlier or equal to due_date",
            ));
        }
    }
    Ok(())
}

fn parse_date(raw: &str) -> Option<Date> {
    Date::parse(raw, format_description!("[year]-[month]-[day]")).ok()
}

fn parent_filter(raw: Option<&str>) -> AppResult<ParentFilter> {
    match raw.map(str::trim) {
        None | Some("") => Ok(ParentFilter::Any),
        Some("null") => Ok(ParentFilter::Root),
        Some(id) => Uuid::parse_str(id)
            .map(ParentFilter::Child)
            .map_err(|_| AppError::validation("Invalid parent_task_id")),
    }
}

/// Unparsable paging values fall back to the defaults.
fn task_filter(q: TaskListQuery) -> AppResult<TaskFilter> {
    let limit = q
        .limit
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|v| v.clamp(1, MAX_LIST_LIMIT))
        .unwrap_or(DEFAULT_LIST_LIMIT);
    let offset = q
        .offset
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|v| v.max(0))
        .unwrap_or(0);
    Ok(TaskFilter {
        parent: parent_filter(q.parent_task_id.as_deref())?,
        status: trimmed(q.status),
        priority: trimmed(q.priority),
        limit,
        offset,
    })
}

async fn load_task(state: &AppState, id: Uuid) -> AppResult<Task> {
    state
        .tasks
        .find_task(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))
}

/// The creator, or anyone holding an `owner` assignment, owns the task.
async fn is_owner(state: &AppState, task: &Task, user_id: Uuid) -> AppResult<bool> {
    if task.created_by == user_id {
        return Ok(true);
    }
    let assignment = state.tasks.assignment_for(task.id, user_id).await?;
    Ok(assignment.is_some_and(|a| a.is_owner()))
}

async fn require_owner(state: &AppState, task: &Task, user_id: Uuid) -> AppResult<()> {
    if is_owner(state, task, user_id).await? {
        Ok(())
    } else {
        warn!(task_id = %task.id, user_id = %user_id, "non-owner task write");
        Err(AppError::Forbidden("Only the task owner can do this".into()))
    }
}

pub async fn create_task(
    state: &AppState,
    requester: Uuid,
    req: CreateTaskRequest,
) -> AppResult<TaskResponse> {
    let title = trimmed(req.title).ok_or_else(|| AppError::validation("Missing or invalid title"))?;
    let estimated_hours = check_hours(req.estimated_hours, "estimated_hours")?;
    check_dates(req.start_date, req.due_date)?;

    if let Some(parent) = req.parent_task_id {
        if state.tasks.find_task(parent).await?.is_none() {
            return Err(AppError::validation("parent_task_id not found"));
        }
    }

    let task = state
        .tasks
        .create_task(NewTask {
            parent_task_id: req.parent_task_id,
            title,
            description: trimmed(req.description),
            priority: trimmed(req.priority),
            status: trimmed(req.status),
            estimated_hours,
            start_date: req.start_date,
            due_date: req.due_date,
            created_by: requester,
        })
        .await?;
    info!(task_id = %task.id, user_id = %requester, "task created");
    Ok(task.into())
}

pub async fn list_tasks(
    state: &AppState,
    requester: Uuid,
    q: TaskListQuery,
) -> AppResult<Vec<AssignedTaskResponse>> {
    let filter = task_filter(q)?;
    let rows = state.tasks.assigned_tasks(requester, &filter).await?;
    Ok(rows.into_iter().map(AssignedTaskResponse::from).collect())
}

pub async fn update_task(
    state: &AppState,
    requester: Uuid,
    id: Uuid,
    req: UpdateTaskRequest,
) -> AppResult<TaskResponse> {
    let mut task = load_task(state, id).await?;
    require_owner(state, &task, requester).await?;

    if let Some(title) = req.title {
        task.title = trimmed(Some(title))
            .ok_or_else(|| AppError::validation("Missing or invalid title"))?;
    }
    if req.description.is_some() {
        task.description = trimmed(req.description);
    }
    if req.priority.is_some() {
        task.priority = trimmed(req.priority);
    }
    if req.status.is_some() {
        task.status = trimmed(req.status);
    }
    if req.estimated_hours.is_some() {
        task.estimated_hours = check_hours(req.estimated_hours, "estimated_hours")?;
    }
    task.start_date = req.start_date.or(task.start_date);
    task.due_date = req.due_date.or(task.due_date);
    check_dates(task.start_date, task.due_date)?;

    let updated = state
        .tasks
        .update_task(&task)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))?;
    info!(task_id = %id, user_id = %requester, "task updated");
    Ok(updated.into())
}

pub async fn delete_task(state: &AppState, requester: Uuid, id: Uuid) -> AppResult<()> {
    let task = load_task(state, id).await?;
    require_owner(state, &task, requester).await?;
    if !state.tasks.delete_task(id).await? {
        return Err(AppError::NotFound("Task not found".into()));
    }
    info!(task_id = %id, user_id = %requester, "task deleted");
    Ok(())
}

/// Direct children of `parent_id` that the caller is assigned to.
pub async fn subtasks(
    state: &AppState,
    requester: Uuid,
    parent_id: Uuid,
) -> AppResult<Vec<AssignedTaskResponse>> {
    load_task(state, parent_id).await?;
    let filter = TaskFilter {
        parent: ParentFilter::Child(parent_id),
        status: None,
        priority: None,
        limit: MAX_LIST_LIMIT,
        offset: 0,
    };
    let rows = state.tasks.assigned_tasks(requester, &filter).await?;
    Ok(rows.into_iter().map(AssignedTaskResponse::from).collect())
}

pub async fn create_assignment(
    state: &AppState,
    requester: Uuid,
    task_id: Uuid,
    req: CreateAssignmentRequest,
) -> AppResult<AssignmentResponse> {
    let task = load_task(state, task_id).await?;
    require_owner(state, &task, requester).await?;

    let user_id = req
        .user_id
        .ok_or_else(|| AppError::validation("Missing user_id"))?;
    let role = match trimmed(req.role) {
        None => TaskRole::default(),
        Some(raw) => raw.parse::<TaskRole>().map_err(|()| {
            AppError::validation("role must be one of owner, contributor, viewer")
        })?,
    };
    let assigned_hours = check_hours(req.assigned_hours, "assigned_hours")?;

    if state.store.find_user_by_id(user_id).await?.is_none() {
        return Err(AppError::NotFound("User not found".into()));
    }

    let assignment = state
        .tasks
        .create_assignment(NewAssignment {
            task_id,
            user_id,
            role,
            assigned_hours,
        })
        .await?;
    info!(task_id = %task_id, user_id = %user_id, role = %role, "user assigned to task");
    Ok(assignment.into())
}

/// Visible to the creator and to anyone assigned to the task.
pub async fn list_assignments(
    state: &AppState,
    requester: Uuid,
    task_id: Uuid,
) -> AppResult<Vec<AssignmentResponse>> {
    let task = load_task(state, task_id).await?;
    if task.created_by != requester
        && state.tasks.assignment_for(task_id, requester).await?.is_none()
    {
        return Err(AppError::Forbidden("Not assigned to this task".into()));
    }
    let rows = state.tasks.assignments(task_id).await?;
    Ok(rows.into_iter().map(AssignmentResponse::from).collect())
}

pub async fn delete_assignment(
    state: &AppState,
    requester: Uuid,
    assignment_id: Uuid,
) -> AppResult<()> {
    let assignment = state
        .tasks
        .find_assignment(assignment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Assignment not found".into()))?;
    let task = load_task(state, assignment.task_id).await?;
    require_owner(state, &task, requester).await?;

    if !state.tasks.delete_assignment(assignment_id).await? {
        return Err(AppError::NotFound("Assignment not found".into()));
    }
    info!(assignment_id = %assignment_id, task_id = %task.id, "assignment removed");
    Ok(())
}

/// Tasks assigned to the caller that overlap `[start_date, end_date]`.
pub async fn calendar(
    state: &AppState,
    requester: Uuid,
    q: CalendarQuery,
) -> AppResult<Vec<CalendarTaskResponse>> {
    let (Some(start), Some(end)) = (trimmed(q.start_date), trimmed(q.end_date)) else {
        return Err(AppError::validation("Missing start_date or end_date"));
    };
    let (Some(from), Some(to)) = (parse_date(&start), parse_date(&end)) else {
        return Err(AppError::validation(
            "Invalid date format (expected YYYY-MM-DD)",
        ));
    };
    if from > to {
        return Err(AppError::validation(
            "start_date must be earlier or equal to end_date",
        ));
    }
    let rows = state.tasks.calendar_tasks(requester, from, to).await?;
    Ok(rows.into_iter().map(CalendarTaskResponse::from).collect())
}
