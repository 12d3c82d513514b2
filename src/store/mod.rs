mod memory;
mod schema;
mod sqlite;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

/// Filter for task queries. All provided fields must match (AND semantics).
/// The due-date bounds are exclusive; tasks without a due date never match
/// either bound.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub creator_id: Option<String>,
    pub assignee_id: Option<String>,
    pub group_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub category: Option<String>,
    pub due_before: Option<DateTime<Utc>>,
    pub due_after: Option<DateTime<Utc>>,
}

/// Filter for the bulk status rewrite. A task matches when its status equals
/// the status filter (if any) AND its due date is strictly before the cutoff
/// (if any); tasks with no due date never match a cutoff.
#[derive(Debug, Clone, Default)]
pub struct BulkTaskFilter {
    pub status: Option<TaskStatus>,
    pub due_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub points: Option<i64>,
    pub badges: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct GroupPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Partial task update. The doubled options distinguish "leave unchanged"
/// (outer None) from "clear the field" (Some(None)).
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub assignee_id: Option<Option<String>>,
    pub category: Option<String>,
    pub notes: Option<String>,
}

impl UserPatch {
    /// Applies the patch in place and re-stamps `updated_at`.
    pub(crate) fn apply(&self, user: &mut User) {
        if let Some(username) = &self.username {
            user.username = username.clone();
        }
        if let Some(hash) = &self.password_hash {
            user.password_hash = hash.clone();
        }
        if let Some(points) = self.points {
            user.points = points;
        }
        if let Some(badges) = &self.badges {
            user.badges = badges.clone();
        }
        user.updated_at = Utc::now();
    }
}

impl GroupPatch {
    pub(crate) fn apply(&self, group: &mut Group) {
        if let Some(name) = &self.name {
            group.name = name.clone();
        }
        if let Some(description) = &self.description {
            group.description = Some(description.clone());
        }
        group.updated_at = Utc::now();
    }
}

impl TaskPatch {
    pub(crate) fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = Some(description.clone());
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(assignee_id) = &self.assignee_id {
            task.assignee_id = assignee_id.clone();
        }
        if let Some(category) = &self.category {
            task.category = Some(category.clone());
        }
        if let Some(notes) = &self.notes {
            task.notes = Some(notes.clone());
        }
        task.updated_at = Utc::now();
    }
}

/// Store defines the storage interface. It owns no business rules: callers
/// supply fully-stamped entities and interpret the results.
///
/// Updates and deletes on a missing id report absence (`Ok(None)` /
/// `Ok(false)`) rather than erroring; updates re-stamp `updated_at`.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn list_users(&self) -> Result<Vec<User>>;
    fn update_user(&self, id: &str, patch: &UserPatch) -> Result<Option<User>>;
    /// Deletes a user and cascades: memberships, sessions, comments and
    /// notifications go with the user, as do tasks and groups the user
    /// created. Tasks merely assigned to the user keep existing with the
    /// assignee cleared.
    fn delete_user(&self, id: &str) -> Result<bool>;
    fn has_admin_user(&self) -> Result<bool>;

    // Group operations
    fn create_group(&self, group: &Group) -> Result<()>;
    /// Creates a group and its creator's membership as one atomic write, so
    /// a group can never be observed without an admin member.
    fn create_group_with_member(&self, group: &Group, member: &GroupMember) -> Result<()>;
    fn get_group(&self, id: &str) -> Result<Option<Group>>;
    /// All groups, newest first.
    fn list_groups(&self) -> Result<Vec<Group>>;
    fn update_group(&self, id: &str, patch: &GroupPatch) -> Result<Option<Group>>;
    /// Deletes a group and cascades to its memberships and tasks.
    fn delete_group(&self, id: &str) -> Result<bool>;

    // Group membership operations
    /// Fails with `Error::Conflict` if the (user_id, group_id) pair already
    /// has a membership row.
    fn create_group_member(&self, member: &GroupMember) -> Result<()>;
    fn get_group_member(&self, user_id: &str, group_id: &str) -> Result<Option<GroupMember>>;
    fn list_group_members(&self, group_id: &str) -> Result<Vec<GroupMember>>;
    fn list_user_memberships(&self, user_id: &str) -> Result<Vec<GroupMember>>;
    fn delete_group_member(&self, user_id: &str, group_id: &str) -> Result<bool>;

    // Task operations
    fn create_task(&self, task: &Task) -> Result<()>;
    fn get_task(&self, id: &str) -> Result<Option<Task>>;
    /// Matching tasks, newest first.
    fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;
    fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Option<Task>>;
    /// Rewrites the status of every task matching the filter, returning the
    /// number of rows touched.
    fn update_many_tasks(&self, filter: &BulkTaskFilter, status: TaskStatus) -> Result<u64>;
    /// Deletes a task and its comments.
    fn delete_task(&self, id: &str) -> Result<bool>;

    // Task comment operations
    fn create_task_comment(&self, comment: &TaskComment) -> Result<()>;
    fn get_task_comment(&self, id: &str) -> Result<Option<TaskComment>>;
    /// Comments for a task, oldest first.
    fn list_task_comments(&self, task_id: &str) -> Result<Vec<TaskComment>>;
    fn delete_task_comment(&self, id: &str) -> Result<bool>;

    // Notification operations
    fn create_notification(&self, notification: &Notification) -> Result<()>;
    /// Notifications for a user, newest first.
    fn list_notifications(&self, user_id: &str, unread_only: bool) -> Result<Vec<Notification>>;
    fn mark_notification_read(&self, id: &str) -> Result<bool>;

    // Audit log operations
    fn create_audit_log(&self, entry: &AuditLog) -> Result<()>;
    fn list_audit_logs(&self, entity_type: EntityType, entity_id: &str) -> Result<Vec<AuditLog>>;

    // Session operations
    fn create_session(&self, session: &Session) -> Result<()>;
    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>>;
    fn update_session_last_used(&self, id: &str) -> Result<()>;
    fn delete_session(&self, id: &str) -> Result<bool>;
}
