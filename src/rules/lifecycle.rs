//! Task status state machine and the point-accrual rule.
//!
//! Status updates are unrestricted field rewrites; the only guarded part is
//! the side effect on the transition *into* DONE, which credits the task's
//! points to its beneficiary exactly once.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::store::{BulkTaskFilter, Store, TaskPatch, UserPatch};
use crate::types::{Task, TaskStatus};

/// Result of a task update, with enough context for the caller to run the
/// badge check against the right account.
#[derive(Debug)]
pub struct UpdateOutcome {
    pub task: Task,
    pub points_awarded: bool,
    /// The credited user, present only when points were awarded.
    pub beneficiary: Option<String>,
}

/// Rewrites every OPEN or IN_PROGRESS task whose due date has passed to
/// OVERDUE. Invoked lazily before task-listing reads rather than from a
/// timer, so the observed status can lag wall-clock overdue-ness between
/// reads. Rerunning the sweep changes nothing once applied.
pub fn sweep_overdue(store: &dyn Store, now: DateTime<Utc>) -> Result<u64> {
    let mut swept = store.update_many_tasks(
        &BulkTaskFilter {
            status: Some(TaskStatus::Open),
            due_before: Some(now),
        },
        TaskStatus::Overdue,
    )?;
    swept += store.update_many_tasks(
        &BulkTaskFilter {
            status: Some(TaskStatus::InProgress),
            due_before: Some(now),
        },
        TaskStatus::Overdue,
    )?;
    Ok(swept)
}

/// Applies a partial update to a task and fires the point award when the
/// status moves into DONE from any other status. The beneficiary is the
/// pre-update assignee, falling back to the creator. Re-submitting DONE on
/// an already-DONE task awards nothing, as does a beneficiary that no longer
/// exists.
pub fn apply_update(store: &dyn Store, id: &str, patch: &TaskPatch) -> Result<Option<UpdateOutcome>> {
    let Some(existing) = store.get_task(id)? else {
        return Ok(None);
    };
    let Some(task) = store.update_task(id, patch)? else {
        return Ok(None);
    };

    let completed = task.status == TaskStatus::Done && existing.status != TaskStatus::Done;
    if !completed {
        return Ok(Some(UpdateOutcome {
            task,
            points_awarded: false,
            beneficiary: None,
        }));
    }

    let beneficiary = existing
        .assignee_id
        .clone()
        .unwrap_or_else(|| existing.creator_id.clone());
    let Some(user) = store.get_user(&beneficiary)? else {
        return Ok(Some(UpdateOutcome {
            task,
            points_awarded: false,
            beneficiary: None,
        }));
    };

    store.update_user(
        &user.id,
        &UserPatch {
            points: Some(user.points + existing.points),
            ..Default::default()
        },
    )?;

    Ok(Some(UpdateOutcome {
        task,
        points_awarded: true,
        beneficiary: Some(beneficiary),
    }))
}
