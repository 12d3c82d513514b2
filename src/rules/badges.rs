//! Milestone badges derived from a user's completed-task count and points.
//! Evaluation is idempotent: badges already held are never re-granted and
//! never revoked.

use crate::error::Result;
use crate::store::{Store, TaskFilter, UserPatch};
use crate::types::TaskStatus;

pub const FIRST_TASK: &str = "first_task";
pub const TASK_MASTER: &str = "task_master";
pub const CENTURY: &str = "century";

const TASK_MASTER_COUNT: usize = 10;
const CENTURY_POINTS: i64 = 100;

/// Evaluates every badge rule for the user and persists any new grants.
/// Returns only the badges granted by this invocation; an unknown user id
/// yields an empty list.
///
/// `first_task` checks for a completed count of exactly one: it fires at the
/// moment of the first completion and is not granted retroactively if the
/// count is backfilled past it.
pub fn evaluate(store: &dyn Store, user_id: &str) -> Result<Vec<String>> {
    let Some(user) = store.get_user(user_id)? else {
        return Ok(Vec::new());
    };

    let completed = store.list_tasks(&TaskFilter {
        assignee_id: Some(user_id.to_string()),
        status: Some(TaskStatus::Done),
        ..Default::default()
    })?;

    let mut granted = Vec::new();
    let has = |name: &str| user.badges.iter().any(|b| b == name);

    if completed.len() == 1 && !has(FIRST_TASK) {
        granted.push(FIRST_TASK.to_string());
    }
    if completed.len() >= TASK_MASTER_COUNT && !has(TASK_MASTER) {
        granted.push(TASK_MASTER.to_string());
    }
    if user.points >= CENTURY_POINTS && !has(CENTURY) {
        granted.push(CENTURY.to_string());
    }

    if !granted.is_empty() {
        let mut badges = user.badges.clone();
        badges.extend(granted.iter().cloned());
        store.update_user(
            user_id,
            &UserPatch {
                badges: Some(badges),
                ..Default::default()
            },
        )?;
    }

    Ok(granted)
}
