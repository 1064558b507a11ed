use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::{
        dto::PublicUser,
        extractors::{require_identity, AuthUser},
    },
    error::AppResult,
    state::AppState,
    users::{
        dto::{ScheduleDayRequest, ScheduleDayResponse, SearchQuery},
        services,
    },
};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(search_users))
        .route("/users/:id", get(get_user))
        .route("/users/:id/work-schedule", get(get_work_schedule))
}

pub fn write_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/users/:id/work-schedule", post(set_work_schedule))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_identity))
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn search_users(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> AppResult<Json<Vec<PublicUser>>> {
    Ok(Json(services::search_users(&state, &q.search).await?))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PublicUser>> {
    Ok(Json(services::user_profile(&state, id).await?))
}

#[instrument(skip(state))]
pub async fn get_work_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<ScheduleDayResponse>>> {
    Ok(Json(services::work_schedule(&state, id).await?))
}

/// Replaces the whole week of the caller.
#[instrument(skip(state, payload))]
pub async fn set_work_schedule(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<Vec<ScheduleDayRequest>>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Vec<ScheduleDayResponse>>)> {
    let Json(items) = payload?;
    let rows = services::replace_work_schedule(&state, requester, id, &items).await?;
    Ok((StatusCode::CREATED, Json(rows)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{app::build_app, state::AppState, store::memory::MemoryStore};

    fn app() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::fake_with_store(store.clone());
        (build_app(state), store)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).expect("request")
    }

    /// Registers a user and returns `(id, token)`.
    async fn register(app: &Router, email: &str, display_name: &str) -> (String, String) {
        let (status, body) = send(
            app,
            post_json(
                "/api/auth/register",
                None,
                json!({ "email": email, "password": "password123", "display_name": display_name }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        (
            body["user"]["id"].as_str().expect("id").to_string(),
            body["token"].as_str().expect("token").to_string(),
        )
    }

    fn week() -> Value {
        json!([
            { "day_of_week": 1, "is_working_day": true, "start_time": "09:00", "end_time": "18:00" },
            { "day_of_week": 2, "is_working_day": true, "start_time": "09:00", "end_time": "18:00" },
            { "day_of_week": 3, "is_working_day": true, "start_time": "09:00", "end_time": "18:00" },
            { "day_of_week": 4, "is_working_day": true, "start_time": "09:00", "end_time": "18:00" },
            { "day_of_week": 5, "is_working_day": true, "start_time": "10:00", "end_time": "16:00" },
            { "day_of_week": 6, "is_working_day": false },
            { "day_of_week": 7, "is_working_day": false }
        ])
    }

    #[tokio::test]
    async fn owner_replaces_schedule() {
        let (app, store) = app();
        let (id, token) = register(&app, "a@x.com", "A").await;
        let uri = format!("/api/users/{id}/work-schedule");

        let (status, body) = send(&app, post_json(&uri, Some(&token), week())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.as_array().expect("array").len(), 7);
        assert_eq!(store.schedule_row_count(), 7);

        // Replacing again keeps exactly one row per weekday.
        let (status, _) = send(&app, post_json(&uri, Some(&token), week())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(store.schedule_row_count(), 7);

        let (status, body) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["day_of_week"], 1);
        assert_eq!(body[4]["start_time"], "10:00");
        assert_eq!(body[5]["is_working_day"], false);
        assert_eq!(body[5]["start_time"], Value::Null);
    }

    #[tokio::test]
    async fn schedule_write_requires_token() {
        let (app, store) = app();
        let (id, _) = register(&app, "a@x.com", "A").await;
        let (status, body) = send(
            &app,
            post_json(&format!("/api/users/{id}/work-schedule"), None, week()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing_authorization");
        assert_eq!(store.schedule_row_count(), 0);
    }

    #[tokio::test]
    async fn cannot_write_someone_elses_schedule() {
        let (app, store) = app();
        let (owner, _) = register(&app, "a@x.com", "A").await;
        let (_, intruder_token) = register(&app, "b@x.com", "B").await;
        let (status, body) = send(
            &app,
            post_json(&format!("/api/users/{owner}/work-schedule"), Some(&intruder_token), week()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");
        assert_eq!(store.schedule_row_count(), 0);
    }

    #[tokio::test]
    async fn invalid_week_leaves_existing_schedule_untouched() {
        let (app, store) = app();
        let (id, token) = register(&app, "a@x.com", "A").await;
        let uri = format!("/api/users/{id}/work-schedule");
        send(&app, post_json(&uri, Some(&token), week())).await;

        let mut bad = week();
        bad[6]["day_of_week"] = json!(1);
        let (status, _) = send(&app, post_json(&uri, Some(&token), bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.schedule_row_count(), 7);
    }

    #[tokio::test]
    async fn profile_and_search() {
        let (app, _) = app();
        let (id, _) = register(&app, "anna@x.com", "Anna").await;
        register(&app, "bob@x.com", "Bob").await;

        let (status, body) = send(&app, get(&format!("/api/users/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["display_name"], "Anna");

        let (status, body) = send(&app, get("/api/users?search=ANN")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().expect("array").len(), 1);
        assert_eq!(body[0]["email"], "anna@x.com");

        let (_, body) = send(&app, get("/api/users")).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn unknown_profile_is_not_found() {
        let (app, _) = app();
        let (status, body) = send(&app, get(&format!("/api/users/{}", uuid::Uuid::new_v4()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }
}
