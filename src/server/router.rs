use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};

use super::{auth, groups, notifications, tasks, users};
use crate::store::Store;

/// An outstanding password-reset grant.
#[derive(Debug, Clone)]
pub struct PasswordReset {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Reset tokens are process-scoped; they do not survive a restart.
    pub reset_tokens: Mutex<HashMap<String, PasswordReset>>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            reset_tokens: Mutex::new(HashMap::new()),
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Auth routes
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/profile", get(auth::profile))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/reset-request", post(auth::request_password_reset))
        .route("/auth/reset", post(auth::reset_password))
        // Task routes
        .route("/tasks", post(tasks::create_task))
        .route("/tasks", get(tasks::list_tasks))
        .route("/tasks/my", get(tasks::list_my_tasks))
        .route("/tasks/{id}", get(tasks::get_task))
        .route("/tasks/{id}", put(tasks::update_task))
        .route("/tasks/{id}", delete(tasks::delete_task))
        .route("/tasks/{id}/comments", post(tasks::create_comment))
        .route("/tasks/{id}/comments", get(tasks::list_comments))
        .route(
            "/tasks/{id}/comments/{comment_id}",
            delete(tasks::delete_comment),
        )
        .route("/tasks/{id}/audit", get(tasks::list_audit))
        // Group routes
        .route("/groups", post(groups::create_group))
        .route("/groups", get(groups::list_my_groups))
        .route("/groups/all", get(groups::list_all_groups))
        .route("/groups/{id}", get(groups::get_group))
        .route("/groups/{id}", put(groups::update_group))
        .route("/groups/{id}", delete(groups::delete_group))
        .route("/groups/{id}/join", post(groups::join_group))
        .route("/groups/{id}/leave", post(groups::leave_group))
        .route("/groups/{id}/members", post(groups::add_member))
        .route(
            "/groups/{id}/members/{user_id}",
            delete(groups::remove_member),
        )
        // User routes
        .route("/users", get(users::list_users))
        .route("/users/{id}", get(users::get_user))
        .route("/users/{id}", put(users::update_user))
        .route("/users/{id}", delete(users::delete_user))
        // Notification routes
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications", post(notifications::create_notification))
        .route(
            "/notifications/{id}/read",
            post(notifications::mark_notification_read),
        )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
