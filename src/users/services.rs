use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::dto::PublicUser,
    error::{AppError, AppResult},
    state::AppState,
    users::{
        dto::{ScheduleDayRequest, ScheduleDayResponse},
        repo_types::WorkDay,
    },
};

pub const DAYS_PER_WEEK: usize = 7;
const SEARCH_LIMIT: i64 = 20;

pub(crate) fn is_valid_time(t: &str) -> bool {
    lazy_static! {
        static ref TIME_RE: Regex = Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").unwrap();
    }
    TIME_RE.is_match(t)
}

fn validate_day(item: &ScheduleDayRequest) -> AppResult<WorkDay> {
    let weekday = item
        .day_of_week
        .ok_or_else(|| AppError::validation("Each element must have integer day_of_week"))?;
    if !(1..=7).contains(&weekday) {
        return Err(AppError::validation("day_of_week must be in range 1..7"));
    }

    let working = item
        .is_working_day
        .unwrap_or(item.start_time.is_some() || item.end_time.is_some());

    if !working {
        if item.start_time.is_some() || item.end_time.is_some() {
            return Err(AppError::validation(
                "Non-working day should not include start_time or end_time",
            ));
        }
        return Ok(WorkDay::day_off(weekday));
    }

    let (Some(start), Some(end)) = (item.start_time.as_deref(), item.end_time.as_deref()) else {
        return Err(AppError::validation(
            "Working day entries must include start_time and end_time",
        ));
    };
    if !is_valid_time(start) || !is_valid_time(end) {
        return Err(AppError::validation(
            "start_time and end_time must be in HH:MM format",
        ));
    }
    // Zero-padded HH:MM compares correctly as text.
    if start >= end {
        return Err(AppError::validation(
            "start_time must be earlier than end_time",
        ));
    }
    Ok(WorkDay::working(weekday, start, end))
}

/// Validate a submitted schedule. A full week is required when replacing.
pub fn validate_schedule(
    items: &[ScheduleDayRequest],
    require_full_week: bool,
) -> AppResult<Vec<WorkDay>> {
    if require_full_week && items.len() != DAYS_PER_WEEK {
        return Err(AppError::validation(
            "Array must contain 7 elements (one per weekday)",
        ));
    }
    if items.len() > DAYS_PER_WEEK {
        return Err(AppError::validation(
            "work_schedule cannot contain more than 7 elements",
        ));
    }

    let mut days: Vec<WorkDay> = Vec::with_capacity(items.len());
    for item in items {
        let day = validate_day(item)?;
        if days.iter().any(|d| d.weekday == day.weekday) {
            return Err(AppError::validation(
                "Duplicate day_of_week values are not allowed",
            ));
        }
        days.push(day);
    }
    Ok(days)
}

pub async fn search_users(state: &AppState, query: &str) -> AppResult<Vec<PublicUser>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let users = state.store.search_users(query, SEARCH_LIMIT).await?;
    Ok(users.into_iter().map(PublicUser::from).collect())
}

pub async fn user_profile(state: &AppState, user_id: Uuid) -> AppResult<PublicUser> {
    state
        .store
        .find_user_by_id(user_id)
        .await?
        .map(PublicUser::from)
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

pub async fn work_schedule(state: &AppState, user_id: Uuid) -> AppResult<Vec<ScheduleDayResponse>> {
    let rows = state.store.work_schedule(user_id).await?;
    Ok(rows.into_iter().map(ScheduleDayResponse::from).collect())
}

/// Replace the owner's whole week in one transaction.
pub async fn replace_work_schedule(
    state: &AppState,
    requester: Uuid,
    user_id: Uuid,
    items: &[ScheduleDayRequest],
) -> AppResult<Vec<ScheduleDayResponse>> {
    if requester != user_id {
        return Err(AppError::Forbidden(
            "Cannot set schedule for another user".into(),
        ));
    }
    let days = validate_schedule(items, true)?;

    if state.store.find_user_by_id(user_id).await?.is_none() {
        return Err(AppError::NotFound("User not found".into()));
    }

    let rows = state.store.replace_work_schedule(user_id, &days).await?;
    info!(user_id = %user_id, days = rows.len(), "work schedule replaced");
    Ok(rows.into_iter().map(ScheduleDayResponse::from).collect())
}
