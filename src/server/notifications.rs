use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{
    CreateNotificationRequest, ListNotificationsParams, NotificationListResponse,
};
use crate::server::response::{ApiError, ApiResponse};
use crate::types::Notification;

pub async fn list_notifications(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListNotificationsParams>,
) -> impl IntoResponse {
    let unread_only = params.unread_only.unwrap_or(false);
    let notifications = state
        .store
        .list_notifications(&auth.user.id, unread_only)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(NotificationListResponse {
        results: notifications.len(),
        notifications,
    })))
}

pub async fn create_notification(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateNotificationRequest>,
) -> impl IntoResponse {
    if req.title.is_empty() || req.message.is_empty() {
        return Err(ApiError::bad_request("title and message are required"));
    }

    let notification = Notification {
        id: Uuid::new_v4().to_string(),
        user_id: req.user_id.unwrap_or(auth.user.id),
        kind: req.kind,
        title: req.title,
        message: req.message,
        read: false,
        task_id: req.task_id,
        created_at: Utc::now(),
    };
    state.store.create_notification(&notification)?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(notification)),
    ))
}

pub async fn mark_notification_read(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    // only the owner's notifications are addressable
    let owned = store
        .list_notifications(&auth.user.id, false)?
        .into_iter()
        .any(|n| n.id == id);
    if !owned {
        return Err(ApiError::not_found("Notification not found"));
    }

    store.mark_notification_read(&id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(serde_json::json!({ "id": id }))))
}
