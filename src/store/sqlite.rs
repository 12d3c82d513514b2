use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::schema::SCHEMA;
use super::{BulkTaskFilter, GroupPatch, Store, TaskFilter, TaskPatch, UserPatch};
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_opt_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_datetime(&s))
}

fn format_opt_datetime(dt: Option<&DateTime<Utc>>) -> Option<String> {
    dt.map(format_datetime)
}

fn parse_enum<T: FromStr>(idx: usize, s: String) -> rusqlite::Result<T> {
    s.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid enum value: {s}").into(),
        )
    })
}

/// Maps UNIQUE/FK violations to a Conflict so callers see the taxonomy
/// instead of a raw driver error.
fn constraint_to_conflict(err: rusqlite::Error, message: &str) -> Error {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Conflict(message.to_string())
        }
        other => Error::from(other),
    }
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        role: parse_enum(4, row.get::<_, String>(4)?)?,
        points: row.get(5)?,
        badges: serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or_else(|e| {
            tracing::error!("Invalid badges JSON in database: {}", e);
            Vec::new()
        }),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

const USER_COLUMNS: &str =
    "id, email, username, password_hash, role, points, badges, created_at, updated_at";

fn group_from_row(row: &Row) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        creator_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

const GROUP_COLUMNS: &str = "id, name, description, creator_id, created_at, updated_at";

fn member_from_row(row: &Row) -> rusqlite::Result<GroupMember> {
    Ok(GroupMember {
        id: row.get(0)?,
        user_id: row.get(1)?,
        group_id: row.get(2)?,
        role: parse_enum(3, row.get::<_, String>(3)?)?,
        joined_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

const MEMBER_COLUMNS: &str = "id, user_id, group_id, role, joined_at";

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: parse_enum(3, row.get::<_, String>(3)?)?,
        priority: parse_enum(4, row.get::<_, String>(4)?)?,
        due_date: parse_opt_datetime(row.get(5)?),
        points: row.get(6)?,
        creator_id: row.get(7)?,
        assignee_id: row.get(8)?,
        group_id: row.get(9)?,
        category: row.get(10)?,
        notes: row.get(11)?,
        created_at: parse_datetime(&row.get::<_, String>(12)?),
        updated_at: parse_datetime(&row.get::<_, String>(13)?),
    })
}

const TASK_COLUMNS: &str = "id, title, description, status, priority, due_date, points, \
     creator_id, assignee_id, group_id, category, notes, created_at, updated_at";

fn comment_from_row(row: &Row) -> rusqlite::Result<TaskComment> {
    Ok(TaskComment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        user_id: row.get(2)?,
        content: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn notification_from_row(row: &Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: parse_enum(2, row.get::<_, String>(2)?)?,
        title: row.get(3)?,
        message: row.get(4)?,
        read: row.get(5)?,
        task_id: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn audit_from_row(row: &Row) -> rusqlite::Result<AuditLog> {
    Ok(AuditLog {
        id: row.get(0)?,
        entity_type: parse_enum(1, row.get::<_, String>(1)?)?,
        entity_id: row.get(2)?,
        action: row.get(3)?,
        changes: serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_else(|e| {
            tracing::error!("Invalid audit changes JSON in database: {}", e);
            serde_json::json!({})
        }),
        user_id: row.get(5)?,
        timestamp: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        user_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        expires_at: parse_opt_datetime(row.get(5)?),
        last_used_at: parse_opt_datetime(row.get(6)?),
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let badges = serde_json::to_string(&user.badges).unwrap_or_else(|_| "[]".to_string());
        self.conn()
            .execute(
                "INSERT INTO users (id, email, username, password_hash, role, points, badges, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    user.id,
                    user.email,
                    user.username,
                    user.password_hash,
                    user.role.as_str(),
                    user.points,
                    badges,
                    format_datetime(&user.created_at),
                    format_datetime(&user.updated_at),
                ],
            )
            .map_err(|e| constraint_to_conflict(e, "email or username already taken"))?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at"))?;
        let rows = stmt.query_map([], user_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_user(&self, id: &str, patch: &UserPatch) -> Result<Option<User>> {
        let conn = self.conn();
        let existing = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()?;
        let Some(mut user) = existing else {
            return Ok(None);
        };

        patch.apply(&mut user);

        let badges = serde_json::to_string(&user.badges).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "UPDATE users SET username = ?1, password_hash = ?2, points = ?3, badges = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                user.username,
                user.password_hash,
                user.points,
                badges,
                format_datetime(&user.updated_at),
                id,
            ],
        )
        .map_err(|e| constraint_to_conflict(e, "username already taken"))?;

        Ok(Some(user))
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        // FK cascades take memberships, sessions, comments, notifications,
        // created tasks and created groups; assigned tasks get SET NULL.
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn has_admin_user(&self) -> Result<bool> {
        let conn = self.conn();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE role = 'ADMIN')",
            [],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    // Group operations

    fn create_group(&self, group: &Group) -> Result<()> {
        self.conn().execute(
            "INSERT INTO groups (id, name, description, creator_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                group.id,
                group.name,
                group.description,
                group.creator_id,
                format_datetime(&group.created_at),
                format_datetime(&group.updated_at),
            ],
        )?;
        Ok(())
    }

    fn create_group_with_member(&self, group: &Group, member: &GroupMember) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO groups (id, name, description, creator_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                group.id,
                group.name,
                group.description,
                group.creator_id,
                format_datetime(&group.created_at),
                format_datetime(&group.updated_at),
            ],
        )?;
        tx.execute(
            "INSERT INTO group_members (id, user_id, group_id, role, joined_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                member.id,
                member.user_id,
                member.group_id,
                member.role.as_str(),
                format_datetime(&member.joined_at),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_group(&self, id: &str) -> Result<Option<Group>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = ?1"),
            params![id],
            group_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_groups(&self) -> Result<Vec<Group>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], group_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_group(&self, id: &str, patch: &GroupPatch) -> Result<Option<Group>> {
        let conn = self.conn();
        let existing = conn
            .query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = ?1"),
                params![id],
                group_from_row,
            )
            .optional()?;
        let Some(mut group) = existing else {
            return Ok(None);
        };

        patch.apply(&mut group);

        conn.execute(
            "UPDATE groups SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                group.name,
                group.description,
                format_datetime(&group.updated_at),
                id,
            ],
        )?;

        Ok(Some(group))
    }

    fn delete_group(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM groups WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Group membership operations

    fn create_group_member(&self, member: &GroupMember) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO group_members (id, user_id, group_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    member.id,
                    member.user_id,
                    member.group_id,
                    member.role.as_str(),
                    format_datetime(&member.joined_at),
                ],
            )
            .map_err(|e| constraint_to_conflict(e, "user is already a member of this group"))?;
        Ok(())
    }

    fn get_group_member(&self, user_id: &str, group_id: &str) -> Result<Option<GroupMember>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {MEMBER_COLUMNS} FROM group_members WHERE user_id = ?1 AND group_id = ?2"
            ),
            params![user_id, group_id],
            member_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_group_members(&self, group_id: &str) -> Result<Vec<GroupMember>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBER_COLUMNS} FROM group_members WHERE group_id = ?1 ORDER BY joined_at"
        ))?;
        let rows = stmt.query_map(params![group_id], member_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_user_memberships(&self, user_id: &str) -> Result<Vec<GroupMember>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBER_COLUMNS} FROM group_members WHERE user_id = ?1 ORDER BY joined_at"
        ))?;
        let rows = stmt.query_map(params![user_id], member_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_group_member(&self, user_id: &str, group_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM group_members WHERE user_id = ?1 AND group_id = ?2",
            params![user_id, group_id],
        )?;
        Ok(rows > 0)
    }

    // Task operations

    fn create_task(&self, task: &Task) -> Result<()> {
        self.conn().execute(
            "INSERT INTO tasks (id, title, description, status, priority, due_date, points, \
             creator_id, assignee_id, group_id, category, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                task.id,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                format_opt_datetime(task.due_date.as_ref()),
                task.points,
                task.creator_id,
                task.assignee_id,
                task.group_id,
                task.category,
                task.notes,
                format_datetime(&task.created_at),
                format_datetime(&task.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            params![id],
            task_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE (?1 IS NULL OR creator_id = ?1)
               AND (?2 IS NULL OR assignee_id = ?2)
               AND (?3 IS NULL OR group_id = ?3)
               AND (?4 IS NULL OR status = ?4)
               AND (?5 IS NULL OR priority = ?5)
               AND (?6 IS NULL OR category = ?6)
               AND (?7 IS NULL OR (due_date IS NOT NULL AND due_date < ?7))
               AND (?8 IS NULL OR (due_date IS NOT NULL AND due_date > ?8))
             ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map(
            params![
                filter.creator_id,
                filter.assignee_id,
                filter.group_id,
                filter.status.map(TaskStatus::as_str),
                filter.priority.map(TaskPriority::as_str),
                filter.category,
                format_opt_datetime(filter.due_before.as_ref()),
                format_opt_datetime(filter.due_after.as_ref()),
            ],
            task_from_row,
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Option<Task>> {
        let conn = self.conn();
        let existing = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                task_from_row,
            )
            .optional()?;
        let Some(mut task) = existing else {
            return Ok(None);
        };

        patch.apply(&mut task);

        conn.execute(
            "UPDATE tasks SET title = ?1, description = ?2, status = ?3, priority = ?4, \
             due_date = ?5, assignee_id = ?6, category = ?7, notes = ?8, updated_at = ?9
             WHERE id = ?10",
            params![
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                format_opt_datetime(task.due_date.as_ref()),
                task.assignee_id,
                task.category,
                task.notes,
                format_datetime(&task.updated_at),
                id,
            ],
        )?;

        Ok(Some(task))
    }

    fn update_many_tasks(&self, filter: &BulkTaskFilter, status: TaskStatus) -> Result<u64> {
        let rows = self.conn().execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2
             WHERE (?3 IS NULL OR status = ?3)
               AND (?4 IS NULL OR (due_date IS NOT NULL AND due_date < ?4))",
            params![
                status.as_str(),
                format_datetime(&Utc::now()),
                filter.status.map(TaskStatus::as_str),
                format_opt_datetime(filter.due_before.as_ref()),
            ],
        )?;
        Ok(rows as u64)
    }

    fn delete_task(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Task comment operations

    fn create_task_comment(&self, comment: &TaskComment) -> Result<()> {
        self.conn().execute(
            "INSERT INTO task_comments (id, task_id, user_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                comment.id,
                comment.task_id,
                comment.user_id,
                comment.content,
                format_datetime(&comment.created_at),
                format_datetime(&comment.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_task_comment(&self, id: &str) -> Result<Option<TaskComment>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, task_id, user_id, content, created_at, updated_at
             FROM task_comments WHERE id = ?1",
            params![id],
            comment_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_task_comments(&self, task_id: &str) -> Result<Vec<TaskComment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, user_id, content, created_at, updated_at
             FROM task_comments WHERE task_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![task_id], comment_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_task_comment(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM task_comments WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Notification operations

    fn create_notification(&self, notification: &Notification) -> Result<()> {
        self.conn().execute(
            "INSERT INTO notifications (id, user_id, kind, title, message, read, task_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                notification.id,
                notification.user_id,
                notification.kind.as_str(),
                notification.title,
                notification.message,
                notification.read,
                notification.task_id,
                format_datetime(&notification.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_notifications(&self, user_id: &str, unread_only: bool) -> Result<Vec<Notification>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, kind, title, message, read, task_id, created_at
             FROM notifications
             WHERE user_id = ?1 AND (?2 = 0 OR read = 0)
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id, unread_only], notification_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn mark_notification_read(&self, id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(rows > 0)
    }

    // Audit log operations

    fn create_audit_log(&self, entry: &AuditLog) -> Result<()> {
        let changes = serde_json::to_string(&entry.changes).unwrap_or_else(|_| "{}".to_string());
        self.conn().execute(
            "INSERT INTO audit_logs (id, entity_type, entity_id, action, changes, user_id, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id,
                entry.entity_type.as_str(),
                entry.entity_id,
                entry.action,
                changes,
                entry.user_id,
                format_datetime(&entry.timestamp),
            ],
        )?;
        Ok(())
    }

    fn list_audit_logs(&self, entity_type: EntityType, entity_id: &str) -> Result<Vec<AuditLog>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, entity_type, entity_id, action, changes, user_id, timestamp
             FROM audit_logs WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY timestamp",
        )?;
        let rows = stmt.query_map(params![entity_type.as_str(), entity_id], audit_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Session operations

    fn create_session(&self, session: &Session) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO sessions (id, token_hash, token_lookup, user_id, created_at, expires_at, last_used_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session.id,
                    session.token_hash,
                    session.token_lookup,
                    session.user_id,
                    format_datetime(&session.created_at),
                    format_opt_datetime(session.expires_at.as_ref()),
                    format_opt_datetime(session.last_used_at.as_ref()),
                ],
            )
            .map_err(|e| constraint_to_conflict(e, "session lookup collision"))?;
        Ok(())
    }

    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, token_hash, token_lookup, user_id, created_at, expires_at, last_used_at
             FROM sessions WHERE token_lookup = ?1",
            params![lookup],
            session_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_session_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE sessions SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    fn delete_session(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}
