use std::sync::Mutex;

use chrono::Utc;

use super::{BulkTaskFilter, GroupPatch, Store, TaskFilter, TaskPatch, UserPatch};
use crate::error::{Error, Result};
use crate::types::*;

#[derive(Default)]
struct Collections {
    users: Vec<User>,
    groups: Vec<Group>,
    members: Vec<GroupMember>,
    tasks: Vec<Task>,
    comments: Vec<TaskComment>,
    notifications: Vec<Notification>,
    audit_logs: Vec<AuditLog>,
    sessions: Vec<Session>,
}

/// In-memory store. Every operation takes the single lock, so each call is
/// atomic with respect to every other; cascade rules match `SqliteStore`'s
/// foreign-key behavior.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn matches_filter(task: &Task, filter: &TaskFilter) -> bool {
    if let Some(creator_id) = &filter.creator_id {
        if task.creator_id != *creator_id {
            return false;
        }
    }
    if let Some(assignee_id) = &filter.assignee_id {
        if task.assignee_id.as_deref() != Some(assignee_id.as_str()) {
            return false;
        }
    }
    if let Some(group_id) = &filter.group_id {
        if task.group_id.as_deref() != Some(group_id.as_str()) {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if task.status != status {
            return false;
        }
    }
    if let Some(priority) = filter.priority {
        if task.priority != priority {
            return false;
        }
    }
    if let Some(category) = &filter.category {
        if task.category.as_deref() != Some(category.as_str()) {
            return false;
        }
    }
    if let Some(due_before) = filter.due_before {
        match task.due_date {
            Some(due) if due < due_before => {}
            _ => return false,
        }
    }
    if let Some(due_after) = filter.due_after {
        match task.due_date {
            Some(due) if due > due_after => {}
            _ => return false,
        }
    }
    true
}

impl Store for MemoryStore {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let mut inner = self.inner();
        if inner
            .users
            .iter()
            .any(|u| u.email == user.email || u.username == user.username)
        {
            return Err(Error::Conflict("email or username already taken".into()));
        }
        inner.users.push(user.clone());
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.inner().users.iter().find(|u| u.id == id).cloned())
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.inner().users.iter().find(|u| u.email == email).cloned())
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .inner()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.inner().users.clone())
    }

    fn update_user(&self, id: &str, patch: &UserPatch) -> Result<Option<User>> {
        let mut inner = self.inner();
        if let Some(username) = &patch.username {
            if inner
                .users
                .iter()
                .any(|u| u.id != id && u.username == *username)
            {
                return Err(Error::Conflict("username already taken".into()));
            }
        }
        let Some(user) = inner.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        patch.apply(user);
        Ok(Some(user.clone()))
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner();
        let Some(pos) = inner.users.iter().position(|u| u.id == id) else {
            return Ok(false);
        };
        inner.users.remove(pos);

        // Groups the user created go away with everything in them.
        let doomed_groups: Vec<String> = inner
            .groups
            .iter()
            .filter(|g| g.creator_id == id)
            .map(|g| g.id.clone())
            .collect();
        inner.groups.retain(|g| g.creator_id != id);
        inner
            .members
            .retain(|m| m.user_id != id && !doomed_groups.contains(&m.group_id));

        // Created tasks are deleted; merely-assigned tasks lose the assignee.
        inner.tasks.retain(|t| {
            t.creator_id != id
                && !t
                    .group_id
                    .as_ref()
                    .is_some_and(|gid| doomed_groups.contains(gid))
        });
        for task in &mut inner.tasks {
            if task.assignee_id.as_deref() == Some(id) {
                task.assignee_id = None;
            }
        }

        let surviving: Vec<String> = inner.tasks.iter().map(|t| t.id.clone()).collect();
        inner
            .comments
            .retain(|c| c.user_id != id && surviving.contains(&c.task_id));
        inner.notifications.retain(|n| n.user_id != id);
        for notification in &mut inner.notifications {
            let dangling = notification
                .task_id
                .as_ref()
                .is_some_and(|task_id| !surviving.contains(task_id));
            if dangling {
                notification.task_id = None;
            }
        }
        inner.sessions.retain(|s| s.user_id != id);
        Ok(true)
    }

    fn has_admin_user(&self) -> Result<bool> {
        Ok(self.inner().users.iter().any(|u| u.role == Role::Admin))
    }

    // Group operations

    fn create_group(&self, group: &Group) -> Result<()> {
        self.inner().groups.push(group.clone());
        Ok(())
    }

    fn create_group_with_member(&self, group: &Group, member: &GroupMember) -> Result<()> {
        let mut inner = self.inner();
        inner.groups.push(group.clone());
        inner.members.push(member.clone());
        Ok(())
    }

    fn get_group(&self, id: &str) -> Result<Option<Group>> {
        Ok(self.inner().groups.iter().find(|g| g.id == id).cloned())
    }

    fn list_groups(&self) -> Result<Vec<Group>> {
        let mut groups = self.inner().groups.clone();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(groups)
    }

    fn update_group(&self, id: &str, patch: &GroupPatch) -> Result<Option<Group>> {
        let mut inner = self.inner();
        let Some(group) = inner.groups.iter_mut().find(|g| g.id == id) else {
            return Ok(None);
        };
        patch.apply(group);
        Ok(Some(group.clone()))
    }

    fn delete_group(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner();
        let Some(pos) = inner.groups.iter().position(|g| g.id == id) else {
            return Ok(false);
        };
        inner.groups.remove(pos);
        inner.members.retain(|m| m.group_id != id);

        let doomed_tasks: Vec<String> = inner
            .tasks
            .iter()
            .filter(|t| t.group_id.as_deref() == Some(id))
            .map(|t| t.id.clone())
            .collect();
        inner.tasks.retain(|t| t.group_id.as_deref() != Some(id));
        inner.comments.retain(|c| !doomed_tasks.contains(&c.task_id));
        for notification in &mut inner.notifications {
            let dangling = notification
                .task_id
                .as_ref()
                .is_some_and(|task_id| doomed_tasks.contains(task_id));
            if dangling {
                notification.task_id = None;
            }
        }
        Ok(true)
    }

    // Group membership operations

    fn create_group_member(&self, member: &GroupMember) -> Result<()> {
        let mut inner = self.inner();
        if inner
            .members
            .iter()
            .any(|m| m.user_id == member.user_id && m.group_id == member.group_id)
        {
            return Err(Error::Conflict(
                "user is already a member of this group".into(),
            ));
        }
        inner.members.push(member.clone());
        Ok(())
    }

    fn get_group_member(&self, user_id: &str, group_id: &str) -> Result<Option<GroupMember>> {
        Ok(self
            .inner()
            .members
            .iter()
            .find(|m| m.user_id == user_id && m.group_id == group_id)
            .cloned())
    }

    fn list_group_members(&self, group_id: &str) -> Result<Vec<GroupMember>> {
        Ok(self
            .inner()
            .members
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect())
    }

    fn list_user_memberships(&self, user_id: &str) -> Result<Vec<GroupMember>> {
        Ok(self
            .inner()
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    fn delete_group_member(&self, user_id: &str, group_id: &str) -> Result<bool> {
        let mut inner = self.inner();
        let Some(pos) = inner
            .members
            .iter()
            .position(|m| m.user_id == user_id && m.group_id == group_id)
        else {
            return Ok(false);
        };
        inner.members.remove(pos);
        Ok(true)
    }

    // Task operations

    fn create_task(&self, task: &Task) -> Result<()> {
        self.inner().tasks.push(task.clone());
        Ok(())
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.inner().tasks.iter().find(|t| t.id == id).cloned())
    }

    fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .inner()
            .tasks
            .iter()
            .filter(|t| matches_filter(t, filter))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Option<Task>> {
        let mut inner = self.inner();
        let Some(task) = inner.tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        patch.apply(task);
        Ok(Some(task.clone()))
    }

    fn update_many_tasks(&self, filter: &BulkTaskFilter, status: TaskStatus) -> Result<u64> {
        let mut inner = self.inner();
        let now = Utc::now();
        let mut touched = 0;
        for task in &mut inner.tasks {
            if let Some(wanted) = filter.status {
                if task.status != wanted {
                    continue;
                }
            }
            if let Some(cutoff) = filter.due_before {
                match task.due_date {
                    Some(due) if due < cutoff => {}
                    _ => continue,
                }
            }
            task.status = status;
            task.updated_at = now;
            touched += 1;
        }
        Ok(touched)
    }

    fn delete_task(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner();
        let Some(pos) = inner.tasks.iter().position(|t| t.id == id) else {
            return Ok(false);
        };
        inner.tasks.remove(pos);
        inner.comments.retain(|c| c.task_id != id);
        for notification in &mut inner.notifications {
            if notification.task_id.as_deref() == Some(id) {
                notification.task_id = None;
            }
        }
        Ok(true)
    }

    // Task comment operations

    fn create_task_comment(&self, comment: &TaskComment) -> Result<()> {
        self.inner().comments.push(comment.clone());
        Ok(())
    }

    fn get_task_comment(&self, id: &str) -> Result<Option<TaskComment>> {
        Ok(self.inner().comments.iter().find(|c| c.id == id).cloned())
    }

    fn list_task_comments(&self, task_id: &str) -> Result<Vec<TaskComment>> {
        let mut comments: Vec<TaskComment> = self
            .inner()
            .comments
            .iter()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    fn delete_task_comment(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner();
        let Some(pos) = inner.comments.iter().position(|c| c.id == id) else {
            return Ok(false);
        };
        inner.comments.remove(pos);
        Ok(true)
    }

    // Notification operations

    fn create_notification(&self, notification: &Notification) -> Result<()> {
        self.inner().notifications.push(notification.clone());
        Ok(())
    }

    fn list_notifications(&self, user_id: &str, unread_only: bool) -> Result<Vec<Notification>> {
        let mut notifications: Vec<Notification> = self
            .inner()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.read))
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    fn mark_notification_read(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner();
        let Some(notification) = inner.notifications.iter_mut().find(|n| n.id == id) else {
            return Ok(false);
        };
        notification.read = true;
        Ok(true)
    }

    // Audit log operations

    fn create_audit_log(&self, entry: &AuditLog) -> Result<()> {
        self.inner().audit_logs.push(entry.clone());
        Ok(())
    }

    fn list_audit_logs(&self, entity_type: EntityType, entity_id: &str) -> Result<Vec<AuditLog>> {
        Ok(self
            .inner()
            .audit_logs
            .iter()
            .filter(|l| l.entity_type == entity_type && l.entity_id == entity_id)
            .cloned()
            .collect())
    }

    // Session operations

    fn create_session(&self, session: &Session) -> Result<()> {
        let mut inner = self.inner();
        if inner
            .sessions
            .iter()
            .any(|s| s.token_lookup == session.token_lookup)
        {
            return Err(Error::Conflict("session lookup collision".into()));
        }
        inner.sessions.push(session.clone());
        Ok(())
    }

    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>> {
        Ok(self
            .inner()
            .sessions
            .iter()
            .find(|s| s.token_lookup == lookup)
            .cloned())
    }

    fn update_session_last_used(&self, id: &str) -> Result<()> {
        let mut inner = self.inner();
        if let Some(session) = inner.sessions.iter_mut().find(|s| s.id == id) {
            session.last_used_at = Some(Utc::now());
        }
        Ok(())
    }

    fn delete_session(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner();
        let Some(pos) = inner.sessions.iter().position(|s| s.id == id) else {
            return Ok(false);
        };
        inner.sessions.remove(pos);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::store::test_fixtures::{group, member, notification, task, user};

    #[test]
    fn test_membership_round_trip() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.create_user(&alice).unwrap();
        let g = group("rust study", &alice.id);
        store.create_group(&g).unwrap();

        store.create_group_member(&member(&alice.id, &g.id)).unwrap();
        assert!(store.get_group_member(&alice.id, &g.id).unwrap().is_some());

        assert!(store.delete_group_member(&alice.id, &g.id).unwrap());
        assert!(store.get_group_member(&alice.id, &g.id).unwrap().is_none());
        assert!(!store.delete_group_member(&alice.id, &g.id).unwrap());
    }

    #[test]
    fn test_duplicate_membership_is_conflict() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.create_user(&alice).unwrap();
        let g = group("rust study", &alice.id);
        store.create_group(&g).unwrap();

        store.create_group_member(&member(&alice.id, &g.id)).unwrap();
        match store.create_group_member(&member(&alice.id, &g.id)) {
            Err(Error::Conflict(_)) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_group_delete_cascade_leaves_unrelated_data() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.create_user(&alice).unwrap();
        let doomed = group("doomed", &alice.id);
        let kept = group("kept", &alice.id);
        store.create_group(&doomed).unwrap();
        store.create_group(&kept).unwrap();
        store
            .create_group_member(&member(&alice.id, &doomed.id))
            .unwrap();
        store.create_group_member(&member(&alice.id, &kept.id)).unwrap();

        let mut in_doomed = task("a", &alice.id);
        in_doomed.group_id = Some(doomed.id.clone());
        let mut in_kept = task("b", &alice.id);
        in_kept.group_id = Some(kept.id.clone());
        let personal = task("c", &alice.id);
        for t in [&in_doomed, &in_kept, &personal] {
            store.create_task(t).unwrap();
        }

        assert!(store.delete_group(&doomed.id).unwrap());
        assert!(store.get_group_member(&alice.id, &doomed.id).unwrap().is_none());
        assert!(store.get_task(&in_doomed.id).unwrap().is_none());
        assert!(store.get_group_member(&alice.id, &kept.id).unwrap().is_some());
        assert!(store.get_task(&in_kept.id).unwrap().is_some());
        assert!(store.get_task(&personal.id).unwrap().is_some());
    }

    #[test]
    fn test_user_delete_cascade_policy() {
        let store = MemoryStore::new();
        let alice = user("alice");
        let bob = user("bob");
        store.create_user(&alice).unwrap();
        store.create_user(&bob).unwrap();

        let mine = task("mine", &alice.id);
        store.create_task(&mine).unwrap();
        let mut assigned = task("assigned", &bob.id);
        assigned.assignee_id = Some(alice.id.clone());
        store.create_task(&assigned).unwrap();

        assert!(store.delete_user(&alice.id).unwrap());
        assert!(store.get_task(&mine.id).unwrap().is_none());
        let survivor = store.get_task(&assigned.id).unwrap().unwrap();
        assert_eq!(survivor.assignee_id, None);
    }

    #[test]
    fn test_task_delete_removes_comments() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.create_user(&alice).unwrap();
        let t = task("commented", &alice.id);
        store.create_task(&t).unwrap();

        let now = Utc::now();
        store
            .create_task_comment(&TaskComment {
                id: "c1".into(),
                task_id: t.id.clone(),
                user_id: alice.id.clone(),
                content: "looks good".into(),
                created_at: now,
                updated_at: now,
            })
            .unwrap();

        assert!(store.delete_task(&t.id).unwrap());
        assert!(store.list_task_comments(&t.id).unwrap().is_empty());
    }

    #[test]
    fn test_filter_conjunction_is_subset() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.create_user(&alice).unwrap();

        let mut done_high = task("a", &alice.id);
        done_high.status = TaskStatus::Done;
        done_high.priority = TaskPriority::High;
        let mut done_low = task("b", &alice.id);
        done_low.status = TaskStatus::Done;
        done_low.priority = TaskPriority::Low;
        let mut open_high = task("c", &alice.id);
        open_high.priority = TaskPriority::High;
        for t in [&done_high, &done_low, &open_high] {
            store.create_task(t).unwrap();
        }

        let done = store
            .list_tasks(&TaskFilter {
                status: Some(TaskStatus::Done),
                ..Default::default()
            })
            .unwrap();
        let both = store
            .list_tasks(&TaskFilter {
                status: Some(TaskStatus::Done),
                priority: Some(TaskPriority::High),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(done.len(), 2);
        assert_eq!(both.len(), 1);
        assert!(both.iter().all(|t| done.iter().any(|d| d.id == t.id)));
    }

    #[test]
    fn test_due_date_bounds_are_exclusive() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.create_user(&alice).unwrap();

        let cutoff = Utc::now();
        let mut at_cutoff = task("exact", &alice.id);
        at_cutoff.due_date = Some(cutoff);
        let mut before = task("before", &alice.id);
        before.due_date = Some(cutoff - Duration::hours(1));
        store.create_task(&at_cutoff).unwrap();
        store.create_task(&before).unwrap();

        let due_before = store
            .list_tasks(&TaskFilter {
                due_before: Some(cutoff),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(due_before.len(), 1);
        assert_eq!(due_before[0].id, before.id);
    }

    #[test]
    fn test_notifications_sorted_and_filtered() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.create_user(&alice).unwrap();

        let old = notification(&alice.id, "old", Utc::now() - Duration::hours(2));
        let mut newer = notification(&alice.id, "newer", Utc::now());
        newer.read = true;
        store.create_notification(&old).unwrap();
        store.create_notification(&newer).unwrap();

        let all = store.list_notifications(&alice.id, false).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "newer");

        let unread = store.list_notifications(&alice.id, true).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].title, "old");

        assert!(store.mark_notification_read(&old.id).unwrap());
        assert!(store.list_notifications(&alice.id, true).unwrap().is_empty());
    }
}
