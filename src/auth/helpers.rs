use std::sync::Arc;

use chrono::Utc;

use super::{TokenGenerator, parse_token};
use crate::server::AppState;
use crate::types::{Session, User};

#[derive(Debug)]
pub enum SessionValidationError {
    InvalidToken,
    TokenExpired,
    InternalError,
}

pub struct ValidatedSession {
    pub session: Session,
    pub user: User,
}

/// Validates a raw bearer token against the store and resolves the account
/// it belongs to.
pub fn validate_session(
    state: &Arc<AppState>,
    raw_token: &str,
) -> Result<ValidatedSession, SessionValidationError> {
    let (lookup, _secret) =
        parse_token(raw_token).map_err(|_| SessionValidationError::InvalidToken)?;

    let session = state
        .store
        .get_session_by_lookup(&lookup)
        .map_err(|_| SessionValidationError::InternalError)?
        .ok_or(SessionValidationError::InvalidToken)?;

    let generator = TokenGenerator::new();
    if !generator
        .verify(raw_token, &session.token_hash)
        .map_err(|_| SessionValidationError::InternalError)?
    {
        return Err(SessionValidationError::InvalidToken);
    }

    if let Some(expires_at) = &session.expires_at {
        if expires_at < &Utc::now() {
            return Err(SessionValidationError::TokenExpired);
        }
    }

    let user = state
        .store
        .get_user(&session.user_id)
        .map_err(|_| SessionValidationError::InternalError)?
        .ok_or(SessionValidationError::InvalidToken)?;

    if let Err(e) = state.store.update_session_last_used(&session.id) {
        tracing::warn!("Failed to update session last_used_at: {e}");
    }

    Ok(ValidatedSession { session, user })
}
