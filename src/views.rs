//! Read-side projections composing store lookups into the denormalized
//! shapes the API returns. Pure readers: nothing here mutates state, and a
//! reference to a since-deleted user is dropped rather than surfaced as an
//! error.

use serde::Serialize;

use crate::error::Result;
use crate::store::{Store, TaskFilter};
use crate::types::{Group, Role, Task, TaskPriority, TaskStatus, User};

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

/// A group member projected through its user account, carrying the
/// group-scoped role.
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct TaskWithRelations {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<Group>,
}

#[derive(Debug, Serialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            status: task.status,
            priority: task.priority,
            due_date: task.due_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: Group,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserSummary>,
    pub members: Vec<MemberView>,
    pub tasks: Vec<TaskSummary>,
}

/// A group as seen in the browse-all directory, annotated for the viewing
/// user.
#[derive(Debug, Serialize)]
pub struct GroupDirectoryEntry {
    #[serde(flatten)]
    pub group: Group,
    pub is_member: bool,
    pub user_role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserSummary>,
    pub member_count: usize,
    pub task_count: usize,
    pub members: Vec<MemberView>,
}

fn resolve_task(store: &dyn Store, task: Task) -> Result<TaskWithRelations> {
    let creator = store.get_user(&task.creator_id)?.map(|u| UserSummary::from(&u));
    let assignee = match &task.assignee_id {
        Some(id) => store.get_user(id)?.map(|u| UserSummary::from(&u)),
        None => None,
    };
    let group = match &task.group_id {
        Some(id) => store.get_group(id)?,
        None => None,
    };
    Ok(TaskWithRelations {
        task,
        creator,
        assignee,
        group,
    })
}

pub fn task_with_relations(store: &dyn Store, id: &str) -> Result<Option<TaskWithRelations>> {
    match store.get_task(id)? {
        Some(task) => Ok(Some(resolve_task(store, task)?)),
        None => Ok(None),
    }
}

/// Resolves relations for each matching task independently; correctness over
/// query count.
pub fn tasks_with_relations(
    store: &dyn Store,
    filter: &TaskFilter,
) -> Result<Vec<TaskWithRelations>> {
    store
        .list_tasks(filter)?
        .into_iter()
        .map(|task| resolve_task(store, task))
        .collect()
}

fn resolve_members(store: &dyn Store, group_id: &str) -> Result<Vec<MemberView>> {
    let mut views = Vec::new();
    for member in store.list_group_members(group_id)? {
        // memberships pointing at a deleted user are dropped silently
        if let Some(user) = store.get_user(&member.user_id)? {
            views.push(MemberView {
                id: user.id,
                username: user.username,
                email: user.email,
                role: member.role,
            });
        }
    }
    Ok(views)
}

pub fn group_with_members(store: &dyn Store, group_id: &str) -> Result<Option<GroupDetail>> {
    let Some(group) = store.get_group(group_id)? else {
        return Ok(None);
    };

    let creator = store.get_user(&group.creator_id)?.map(|u| UserSummary::from(&u));
    let members = resolve_members(store, group_id)?;
    let tasks = store
        .list_tasks(&TaskFilter {
            group_id: Some(group_id.to_string()),
            ..Default::default()
        })?
        .iter()
        .map(TaskSummary::from)
        .collect();

    Ok(Some(GroupDetail {
        group,
        creator,
        members,
        tasks,
    }))
}

/// Every group, newest first, annotated with the viewing user's relationship
/// to it.
pub fn group_directory(store: &dyn Store, user_id: &str) -> Result<Vec<GroupDirectoryEntry>> {
    let memberships = store.list_user_memberships(user_id)?;

    let mut entries = Vec::new();
    for group in store.list_groups()? {
        let creator = store.get_user(&group.creator_id)?.map(|u| UserSummary::from(&u));
        let members = resolve_members(store, &group.id)?;
        let task_count = store
            .list_tasks(&TaskFilter {
                group_id: Some(group.id.clone()),
                ..Default::default()
            })?
            .len();
        let user_role = memberships
            .iter()
            .find(|m| m.group_id == group.id)
            .map(|m| m.role);

        entries.push(GroupDirectoryEntry {
            is_member: user_role.is_some(),
            user_role,
            creator,
            member_count: members.len(),
            task_count,
            members,
            group,
        });
    }
    Ok(entries)
}
