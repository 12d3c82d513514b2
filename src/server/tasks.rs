use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::rules::{badges, lifecycle};
use crate::server::AppState;
use crate::server::audit;
use crate::server::dto::{
    AuditListResponse, CommentListResponse, CreateCommentRequest, CreateTaskRequest,
    ListTasksParams, TaskListResponse, TaskUpdateResponse, UpdateTaskRequest,
};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt};
use crate::server::validation::validate_task_title;
use crate::store::{Store, TaskFilter, TaskPatch};
use crate::types::{EntityType, Notification, NotificationKind, Role, Task, TaskComment,
    TaskPriority, TaskStatus};
use crate::views::{self, TaskWithRelations};

const DEFAULT_TASK_POINTS: i64 = 10;

/// Tells the assignee about a task landing on their plate. Best effort.
fn notify_assignment(store: &dyn Store, task: &Task, actor_id: &str) {
    let Some(assignee_id) = &task.assignee_id else {
        return;
    };
    if assignee_id == actor_id {
        return;
    }
    let notification = Notification {
        id: Uuid::new_v4().to_string(),
        user_id: assignee_id.clone(),
        kind: NotificationKind::Assignment,
        title: "New task assignment".to_string(),
        message: format!("You have been assigned the task '{}'", task.title),
        read: false,
        task_id: Some(task.id.clone()),
        created_at: Utc::now(),
    };
    if let Err(e) = store.create_notification(&notification) {
        tracing::warn!("Failed to create assignment notification: {e}");
    }
}

pub async fn create_task(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    validate_task_title(&req.title)?;

    if let Some(group_id) = &req.group_id {
        store.get_group(group_id)?.or_not_found("Group not found")?;
    }
    if let Some(assignee_id) = &req.assignee_id {
        store.get_user(assignee_id)?.or_not_found("Assignee not found")?;
    }

    let now = Utc::now();
    let task = Task {
        id: Uuid::new_v4().to_string(),
        title: req.title,
        description: req.description,
        status: TaskStatus::Open,
        priority: req.priority.unwrap_or(TaskPriority::Medium),
        due_date: req.due_date,
        points: req.points.unwrap_or(DEFAULT_TASK_POINTS),
        creator_id: auth.user.id.clone(),
        assignee_id: req.assignee_id.or(Some(auth.user.id.clone())),
        group_id: req.group_id,
        category: req.category,
        notes: req.notes,
        created_at: now,
        updated_at: now,
    };
    store.create_task(&task)?;

    notify_assignment(store, &task, &auth.user.id);
    audit::record(
        store,
        &auth.user.id,
        EntityType::Task,
        &task.id,
        "created",
        json!({ "title": &task.title, "status": task.status }),
    );

    let view = views::task_with_relations(store, &task.id)?
        .or_not_found("Task not found")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(view))))
}

pub async fn list_tasks(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTasksParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    lifecycle::sweep_overdue(store, Utc::now())?;

    let filter = TaskFilter {
        group_id: params.group_id,
        status: params.status,
        priority: params.priority,
        ..Default::default()
    };
    let tasks = views::tasks_with_relations(store, &filter)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(TaskListResponse {
        results: tasks.len(),
        tasks,
    })))
}

pub async fn list_my_tasks(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    lifecycle::sweep_overdue(store, Utc::now())?;

    let created = views::tasks_with_relations(
        store,
        &TaskFilter {
            creator_id: Some(auth.user.id.clone()),
            ..Default::default()
        },
    )?;
    let assigned = views::tasks_with_relations(
        store,
        &TaskFilter {
            assignee_id: Some(auth.user.id.clone()),
            ..Default::default()
        },
    )?;

    let mut tasks: Vec<TaskWithRelations> = Vec::new();
    for view in created.into_iter().chain(assigned) {
        if !tasks.iter().any(|t| t.task.id == view.task.id) {
            tasks.push(view);
        }
    }
    tasks.sort_by(|a, b| b.task.created_at.cmp(&a.task.created_at));

    Ok::<_, ApiError>(Json(ApiResponse::success(TaskListResponse {
        results: tasks.len(),
        tasks,
    })))
}

pub async fn get_task(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let view = views::task_with_relations(state.store.as_ref(), &id)?
        .or_not_found("Task not found")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(view)))
}

pub async fn update_task(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    if let Some(title) = &req.title {
        validate_task_title(title)?;
    }
    if let Some(Some(assignee_id)) = &req.assignee_id {
        store.get_user(assignee_id)?.or_not_found("Assignee not found")?;
    }

    let existing = store.get_task(&id)?.or_not_found("Task not found")?;

    let mut changes = serde_json::Map::new();
    if let Some(title) = &req.title {
        changes.insert("title".into(), json!(title));
    }
    if let Some(description) = &req.description {
        changes.insert("description".into(), json!(description));
    }
    if let Some(status) = req.status {
        changes.insert("status".into(), json!(status));
    }
    if let Some(priority) = req.priority {
        changes.insert("priority".into(), json!(priority));
    }
    if let Some(due_date) = &req.due_date {
        changes.insert("due_date".into(), json!(due_date));
    }
    if let Some(assignee_id) = &req.assignee_id {
        changes.insert("assignee_id".into(), json!(assignee_id));
    }

    let patch = TaskPatch {
        title: req.title,
        description: req.description,
        status: req.status,
        priority: req.priority,
        due_date: req.due_date,
        assignee_id: req.assignee_id.clone(),
        category: req.category,
        notes: req.notes,
    };

    let outcome = lifecycle::apply_update(store, &id, &patch)?
        .or_not_found("Task not found")?;

    let new_badges = match &outcome.beneficiary {
        Some(user_id) => badges::evaluate(store, user_id)?,
        None => Vec::new(),
    };

    if let Some(Some(new_assignee)) = &req.assignee_id {
        if existing.assignee_id.as_deref() != Some(new_assignee.as_str()) {
            notify_assignment(store, &outcome.task, &auth.user.id);
        }
    }
    audit::record(
        store,
        &auth.user.id,
        EntityType::Task,
        &id,
        "updated",
        serde_json::Value::Object(changes),
    );

    let task = views::task_with_relations(store, &id)?
        .or_not_found("Task not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(TaskUpdateResponse {
        task,
        points_awarded: outcome.points_awarded,
        new_badges,
    })))
}

pub async fn delete_task(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let task = store.get_task(&id)?.or_not_found("Task not found")?;

    if task.creator_id != auth.user.id && auth.user.role != Role::Admin {
        return Err(ApiError::forbidden("Not authorized to delete this task"));
    }

    store.delete_task(&id)?;
    audit::record(
        store,
        &auth.user.id,
        EntityType::Task,
        &id,
        "deleted",
        json!({}),
    );

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn create_comment(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("Comment content is required"));
    }
    store.get_task(&id)?.or_not_found("Task not found")?;

    let now = Utc::now();
    let comment = TaskComment {
        id: Uuid::new_v4().to_string(),
        task_id: id,
        user_id: auth.user.id.clone(),
        content: req.content,
        created_at: now,
        updated_at: now,
    };
    store.create_task_comment(&comment)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(comment))))
}

pub async fn list_comments(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    store.get_task(&id)?.or_not_found("Task not found")?;

    let comments = store.list_task_comments(&id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(CommentListResponse {
        results: comments.len(),
        comments,
    })))
}

pub async fn delete_comment(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((task_id, comment_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let comment = store
        .get_task_comment(&comment_id)?
        .filter(|c| c.task_id == task_id)
        .or_not_found("Comment not found")?;

    if comment.user_id != auth.user.id && auth.user.role != Role::Admin {
        return Err(ApiError::forbidden("Not authorized to delete this comment"));
    }

    store.delete_task_comment(&comment_id)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_audit(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    store.get_task(&id)?.or_not_found("Task not found")?;

    let entries = store.list_audit_logs(EntityType::Task, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(AuditListResponse {
        results: entries.len(),
        entries,
    })))
}
