use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{RequireUser, TokenGenerator};
use crate::error::Error;
use crate::server::dto::{
    AuthResponse, LoginRequest, MessageResponse, PasswordResetRequest, RegisterRequest,
    ResetPasswordRequest, ResetTokenResponse,
};
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::{validate_email, validate_password, validate_username};
use crate::server::{AppState, PasswordReset};
use crate::store::UserPatch;
use crate::types::{Role, Session, User};

const RESET_TOKEN_TTL_HOURS: i64 = 1;
const MAX_SESSION_RETRIES: u32 = 3;

/// Mints a bearer session for the user, retrying on the (unlikely) lookup
/// collision. Returns the raw token, which is never stored.
fn issue_session(state: &Arc<AppState>, user_id: &str) -> Result<String, ApiError> {
    let generator = TokenGenerator::new();

    for _ in 0..MAX_SESSION_RETRIES {
        let (raw_token, lookup, hash) = generator.generate()?;

        let session = Session {
            id: Uuid::new_v4().to_string(),
            token_hash: hash,
            token_lookup: lookup,
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        };

        match state.store.create_session(&session) {
            Ok(()) => return Ok(raw_token),
            Err(Error::Conflict(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::internal("Failed to create session after retries"))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    validate_email(&req.email)?;
    validate_username(&req.username)?;
    validate_password(&req.password)?;

    let store = state.store.as_ref();
    if store.get_user_by_email(&req.email)?.is_some()
        || store.get_user_by_username(&req.username)?.is_some()
    {
        return Err(ApiError::conflict("User already exists"));
    }

    let generator = TokenGenerator::new();
    let password_hash = generator.hash(&req.password)?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        email: req.email,
        username: req.username,
        password_hash,
        role: Role::User,
        points: 0,
        badges: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    store.create_user(&user)?;

    let token = issue_session(&state, &user.id)?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(AuthResponse { user, token })),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Please provide email and password"));
    }

    let Some(user) = state.store.get_user_by_email(&req.email)? else {
        return Err(ApiError::unauthorized("Invalid credentials"));
    };

    let generator = TokenGenerator::new();
    if !generator.verify(&req.password, &user.password_hash)? {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = issue_session(&state, &user.id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(AuthResponse { user, token })))
}

pub async fn profile(auth: RequireUser) -> impl IntoResponse {
    Json(ApiResponse::success(auth.user))
}

pub async fn logout(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    state.store.delete_session(&auth.session.id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(MessageResponse {
        message: "Logged out",
    })))
}

pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetRequest>,
) -> impl IntoResponse {
    if req.email.is_empty() {
        return Err(ApiError::bad_request("Please provide email"));
    }

    // The response never reveals whether the account exists, but the token
    // is echoed back when it does so the flow is drivable without a mailer.
    let token = match state.store.get_user_by_email(&req.email)? {
        Some(user) => {
            let token = Uuid::new_v4().to_string();
            let mut tokens = state
                .reset_tokens
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            tokens.insert(
                token.clone(),
                PasswordReset {
                    user_id: user.id,
                    expires_at: Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS),
                },
            );
            Some(token)
        }
        None => None,
    };

    Ok::<_, ApiError>(Json(ApiResponse::success(ResetTokenResponse {
        message: "Password reset link generated",
        token,
    })))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> impl IntoResponse {
    if req.token.is_empty() {
        return Err(ApiError::bad_request("Token and new password are required"));
    }
    validate_password(&req.new_password)?;

    let entry = {
        let tokens = state
            .reset_tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        tokens.get(&req.token).cloned()
    };
    let Some(entry) = entry else {
        return Err(ApiError::bad_request("Invalid or expired token"));
    };
    if entry.expires_at < Utc::now() {
        remove_reset_token(&state, &req.token);
        return Err(ApiError::bad_request("Invalid or expired token"));
    }

    let Some(user) = state.store.get_user(&entry.user_id)? else {
        remove_reset_token(&state, &req.token);
        return Err(ApiError::not_found("User not found"));
    };

    let generator = TokenGenerator::new();
    let password_hash = generator.hash(&req.new_password)?;
    state.store.update_user(
        &user.id,
        &UserPatch {
            password_hash: Some(password_hash),
            ..Default::default()
        },
    )?;

    remove_reset_token(&state, &req.token);

    Ok::<_, ApiError>(Json(ApiResponse::success(MessageResponse {
        message: "Password has been reset",
    })))
}

fn remove_reset_token(state: &Arc<AppState>, token: &str) {
    let mut tokens = state
        .reset_tokens
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    tokens.remove(token);
}
