use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
        password::{hash_password_blocking, verify_password_blocking, MIN_PASSWORD_LEN},
        repo_types::User,
    },
    error::{AppError, AppResult},
    state::AppState,
    store::NewUser,
    users::{dto::ScheduleDayResponse, services::validate_schedule},
};

const DEFAULT_LOCALE: &str = "ru-RU";
const INVALID_CREDENTIALS: &str = "Invalid email or password";

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Trimmed value, or `None` when absent or blank.
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn invalid_credentials() -> AppError {
    AppError::unauthorized("invalid_credentials", INVALID_CREDENTIALS)
}

fn auth_response(
    state: &AppState,
    user: User,
    work_schedule: Vec<ScheduleDayResponse>,
) -> AppResult<AuthResponse> {
    let token = state.keys.sign(user.id)?;
    Ok(AuthResponse {
        token,
        token_type: "Bearer",
        expires_in: state.keys.ttl().as_secs(),
        user: PublicUser::from(user),
        work_schedule,
    })
}

pub async fn register(state: &AppState, payload: RegisterRequest) -> AppResult<AuthResponse> {
    let (Some(email), Some(password), Some(display_name)) = (
        present(payload.email),
        payload.password.filter(|p| !p.is_empty()),
        present(payload.display_name),
    ) else {
        return Err(AppError::validation(
            "Email, password and display name are required",
        ));
    };

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::validation("Invalid email format"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::validation(
            "Password must be at least 8 characters",
        ));
    }
    let schedule = validate_schedule(payload.work_schedule.as_deref().unwrap_or_default(), false)?;

    // Ensure email is not taken
    if state.store.find_user_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password_blocking(password).await?;
    let new_user = NewUser {
        email,
        password_hash,
        display_name,
        name: present(payload.name),
        surname: present(payload.surname),
        phone: present(payload.phone),
        telegram: present(payload.telegram),
        locale: present(payload.locale).unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
    };

    // A concurrent registration can still win the race; the store reports it as a conflict.
    let user = state.store.create_user(new_user, &schedule).await?;
    let work_schedule = if schedule.is_empty() {
        Vec::new()
    } else {
        state
            .store
            .work_schedule(user.id)
            .await?
            .into_iter()
            .map(ScheduleDayResponse::from)
            .collect()
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    auth_response(state, user, work_schedule)
}

pub async fn login(state: &AppState, payload: LoginRequest) -> AppResult<AuthResponse> {
    let (Some(email), Some(password)) = (
        present(payload.email),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::validation("Email and password are required"));
    };

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        let _ = verify_password_blocking(password, state.decoy_hash.to_string()).await?;
        warn!(email = %email, "login unknown email");
        return Err(invalid_credentials());
    };

    if !verify_password_blocking(password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(invalid_credentials());
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    auth_response(state, user, Vec::new())
}

/// Profile of the caller. The token was valid, so a missing row means the
/// account disappeared between verification and lookup.
pub async fn me(state: &AppState, user_id: Uuid) -> AppResult<PublicUser> {
    match state.store.find_user_by_id(user_id).await? {
        Some(user) => Ok(PublicUser::from(user)),
        None => {
            warn!(user_id = %user_id, "authenticated user no longer exists");
            Err(AppError::NotFound("User not found".into()))
        }
    }
}
