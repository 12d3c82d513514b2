use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::helpers::{SessionValidationError, ValidatedSession, validate_session};
use crate::server::AppState;
use crate::types::{Role, Session, User};

/// Extractor that requires a valid bearer session.
pub struct RequireUser {
    pub session: Session,
    pub user: User,
}

/// Extractor that requires a session belonging to a global ADMIN.
pub struct RequireAdmin {
    pub session: Session,
    pub user: User,
}

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    NotAdmin,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                "Bearer realm=\"studyconnect\"".parse().unwrap(),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = extract_and_validate(parts, state)?;
        Ok(RequireUser {
            session: validated.session,
            user: validated.user,
        })
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = extract_and_validate(parts, state)?;

        if validated.user.role != Role::Admin {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin {
            session: validated.session,
            user: validated.user,
        })
    }
}

fn extract_and_validate(
    parts: &mut Parts,
    state: &Arc<AppState>,
) -> Result<ValidatedSession, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let raw_token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => {
            header.strip_prefix("Bearer ").unwrap_or_default()
        }
        Some(_) => return Err(AuthError::InvalidScheme),
        None => return Err(AuthError::MissingAuth),
    };

    validate_session(state, raw_token).map_err(|e| match e {
        SessionValidationError::InvalidToken => AuthError::InvalidToken,
        SessionValidationError::TokenExpired => AuthError::TokenExpired,
        SessionValidationError::InternalError => AuthError::InternalError,
    })
}
