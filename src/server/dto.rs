use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{AuditLog, Group, GroupMember, Notification, NotificationKind, Role,
    TaskComment, TaskPriority, TaskStatus, User};
use crate::views::{GroupDetail, GroupDirectoryEntry, TaskSummary, TaskWithRelations, UserSummary};

/// Distinguishes an absent field from an explicit null: absent stays the
/// outer `None`, null becomes `Some(None)`.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

// Auth

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ResetTokenResponse {
    pub message: &'static str,
    /// Present only when the email matched an account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

// Tasks

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub assignee_id: Option<Option<String>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTasksParams {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub results: usize,
    pub tasks: Vec<TaskWithRelations>,
}

#[derive(Debug, Serialize)]
pub struct TaskUpdateResponse {
    pub task: TaskWithRelations,
    pub points_awarded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub new_badges: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct CommentListResponse {
    pub results: usize,
    pub comments: Vec<TaskComment>,
}

#[derive(Debug, Serialize)]
pub struct AuditListResponse {
    pub results: usize,
    pub entries: Vec<AuditLog>,
}

// Groups

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateGroupRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct GroupWithCreator {
    #[serde(flatten)]
    pub group: Group,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    #[serde(flatten)]
    pub member: GroupMember,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
pub struct GroupListResponse {
    pub results: usize,
    pub groups: Vec<GroupDetail>,
}

#[derive(Debug, Serialize)]
pub struct GroupDirectoryResponse {
    pub results: usize,
    pub groups: Vec<GroupDirectoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// Users

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub badges: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub results: usize,
    pub users: Vec<User>,
}

#[derive(Debug, Serialize)]
pub struct UserProfileResponse {
    #[serde(flatten)]
    pub user: User,
    pub assigned_tasks: Vec<TaskSummary>,
}

// Notifications

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub task_id: Option<String>,
    /// Defaults to the calling user.
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListNotificationsParams {
    #[serde(default)]
    pub unread_only: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub results: usize,
    pub notifications: Vec<Notification>,
}
