use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::session;
use crate::db::models::UserProfile;
use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::extractors::{extract_session_token, JsonBody};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

// -- Request / response types --

#[derive(Deserialize)]
pub struct SignUpRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct SignInRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(email)
}

async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(AppError::from)
}

async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(AppError::from)
}

fn signed_in(state: &AppState, status: StatusCode, token: String, user: UserProfile) -> Response {
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &token,
        state.config.auth.session_hours,
    );
    (
        status,
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(AuthResponse { token, user }),
    )
        .into_response()
}

// -- Handlers --

/// POST /auth/sign-up: create an account and sign it in
pub async fn sign_up(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SignUpRequest>,
) -> AppResult<Response> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request(
            "MISSING_NAME",
            "Name is required and must not be empty",
        ));
    }
    let email = normalize_email(&req.email)
        .ok_or_else(|| AppError::bad_request("INVALID_EMAIL", "A valid email is required"))?;
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(
            "WEAK_PASSWORD",
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }

    {
        let conn = state.db.get()?;
        if users::email_taken(&conn, &email)? {
            return Err(AppError::Conflict {
                code: "EMAIL_TAKEN",
                message: "An account with this email already exists".into(),
            });
        }
    }

    let password_hash = hash_password(req.password, state.config.auth.bcrypt_cost).await?;

    let (user, token) = {
        let conn = state.db.get()?;
        let user = users::insert_user(&conn, &name, &email, &password_hash)?;
        let token = session::create_session(&conn, &user.id, state.config.auth.session_hours)?;
        (user, token)
    };

    tracing::info!(user_id = %user.id, "Account created");
    Ok(signed_in(&state, StatusCode::CREATED, token, user))
}

/// POST /auth/sign-in: exchange credentials for a session
pub async fn sign_in(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SignInRequest>,
) -> AppResult<Response> {
    let invalid = || AppError::Unauthorized {
        code: "INVALID_CREDENTIALS",
        message: "Invalid email or password".into(),
    };

    let email = normalize_email(&req.email).ok_or_else(invalid)?;
    let credentials = {
        let conn = state.db.get()?;
        users::get_credentials_by_email(&conn, &email)?
    }
    .ok_or_else(invalid)?;

    if !verify_password(req.password, credentials.password_hash).await? {
        return Err(invalid());
    }

    let user = credentials.profile;
    let token = {
        let conn = state.db.get()?;
        session::create_session(&conn, &user.id, state.config.auth.session_hours)?
    };

    tracing::info!(user_id = %user.id, "Signed in");
    Ok(signed_in(&state, StatusCode::OK, token, user))
}

/// POST /auth/sign-out: drop the caller's session, if any
pub async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;
    if let Some(token) = extract_session_token(&headers, cookie_name) {
        let conn = state.db.get()?;
        session::delete_session(&conn, token)?;
    }

    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie(cookie_name))]),
    )
        .into_response())
}
