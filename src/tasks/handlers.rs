use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::{require_identity, AuthUser},
    error::AppResult,
    state::AppState,
    tasks::{
        dto::{
            AssignedTaskResponse, AssignmentResponse, CalendarQuery, CalendarTaskResponse,
            CreateAssignmentRequest, CreateTaskRequest, TaskListQuery, TaskResponse,
            UpdateTaskRequest,
        },
        services,
    },
};

/// Every task route requires a verified identity.
pub fn task_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/:id", put(update_task).delete(delete_task))
        .route("/tasks/:id/subtasks", get(list_subtasks))
        .route(
            "/tasks/:id/assignments",
            get(list_assignments).post(create_assignment),
        )
        .route("/assignments/:id", delete(delete_assignment))
        .route("/calendar/tasks", get(calendar_tasks))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_identity))
}

#[instrument(skip(state, payload))]
pub async fn create_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<TaskResponse>)> {
    let Json(payload) = payload?;
    let task = services::create_task(&state, user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(skip(state))]
pub async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<TaskListQuery>,
) -> AppResult<Json<Vec<AssignedTaskResponse>>> {
    Ok(Json(services::list_tasks(&state, user_id, q).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> AppResult<Json<TaskResponse>> {
    let Json(payload) = payload?;
    Ok(Json(services::update_task(&state, user_id, id, payload).await?))
}

#[instrument(skip(state))]
pub async fn delete_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    services::delete_task(&state, user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_subtasks(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<AssignedTaskResponse>>> {
    Ok(Json(services::subtasks(&state, user_id, id).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_assignment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<Uuid>,
    payload: Result<Json<CreateAssignmentRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<AssignmentResponse>)> {
    let Json(payload) = payload?;
    let assignment = services::create_assignment(&state, user_id, task_id, payload).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

#[instrument(skip(state))]
pub async fn list_assignments(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<Vec<AssignmentResponse>>> {
    Ok(Json(services::list_assignments(&state, user_id, task_id).await?))
}

#[instrument(skip(state))]
pub async fn delete_assignment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    services::delete_assignment(&state, user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn calendar_tasks(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<CalendarQuery>,
) -> AppResult<Json<Vec<CalendarTaskResponse>>> {
    Ok(Json(services::calendar(&state, user_id, q).await?))
}
