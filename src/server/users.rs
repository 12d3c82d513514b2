use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::auth::{RequireAdmin, RequireUser};
use crate::server::AppState;
use crate::server::audit;
use crate::server::dto::{UpdateUserRequest, UserListResponse, UserProfileResponse};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt};
use crate::server::validation::validate_username;
use crate::store::{TaskFilter, UserPatch};
use crate::types::{EntityType, Role};
use crate::views::TaskSummary;

pub async fn list_users(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let mut users = state.store.list_users()?;
    users.sort_by(|a, b| b.points.cmp(&a.points));

    Ok::<_, ApiError>(Json(ApiResponse::success(UserListResponse {
        results: users.len(),
        users,
    })))
}

pub async fn get_user(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let user = store.get_user(&id)?.or_not_found("User not found")?;

    let assigned_tasks: Vec<TaskSummary> = store
        .list_tasks(&TaskFilter {
            assignee_id: Some(id),
            ..Default::default()
        })?
        .iter()
        .map(TaskSummary::from)
        .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(UserProfileResponse {
        user,
        assigned_tasks,
    })))
}

pub async fn update_user(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    // Users can only update their own profile unless they're admin.
    if id != auth.user.id && auth.user.role != Role::Admin {
        return Err(ApiError::forbidden("Not authorized to update this user"));
    }

    if let Some(username) = &req.username {
        validate_username(username)?;
        if let Some(taken) = store.get_user_by_username(username)? {
            if taken.id != id {
                return Err(ApiError::conflict("Username already taken"));
            }
        }
    }

    let user = store
        .update_user(
            &id,
            &UserPatch {
                username: req.username,
                badges: req.badges,
                ..Default::default()
            },
        )?
        .or_not_found("User not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

pub async fn delete_user(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    if id != auth.user.id && auth.user.role != Role::Admin {
        return Err(ApiError::forbidden("Not authorized to delete this user"));
    }
    store.get_user(&id)?.or_not_found("User not found")?;

    store.delete_user(&id)?;
    audit::record(
        store,
        &auth.user.id,
        EntityType::User,
        &id,
        "deleted",
        json!({}),
    );

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
