//! Task workflow state machine.
//!
//! Task status is a derived projection of its steps: transitions happen on
//! steps, the task status is recomputed afterwards and every transition
//! leaves one history entry behind. All functions here are pure with respect
//! to external state; persistence is the caller's concern.

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use super::models::{HistoryEntry, HistoryKind, StepStatus, Task, TaskStatus};

pub const ACTION_STEP_STARTED: &str = "step_started";
pub const ACTION_STEP_COMPLETED: &str = "step_completed";
pub const ACTION_STEP_REVERTED: &str = "step_reverted";
pub const ACTION_REOPENED: &str = "reopened";
pub const ACTION_STATUS_CHANGED: &str = "status_changed";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("step {0} not found")]
    StepNotFound(String),

    #[error("step {0} cannot start before its predecessor is completed")]
    PredecessorNotCompleted(String),

    #[error("step {0} is not in a state that allows this transition")]
    InvalidStepTransition(String),

    #[error("task is not completed")]
    NotCompleted,
}

/// The acting user, carried into history entries.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    pub user_name: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }
}

/// Derive the task status from its step set.
///
/// `current` is returned unchanged when the task has no steps.
pub fn derive_task_status(steps: &[super::models::TaskStep], current: TaskStatus) -> TaskStatus {
    if steps.is_empty() {
        return current;
    }
    if steps.iter().all(|s| s.status == StepStatus::Completed) {
        return TaskStatus::Completed;
    }
    if steps
        .iter()
        .any(|s| s.status == StepStatus::InProgress || s.status == StepStatus::Completed)
    {
        return TaskStatus::InProgress;
    }
    TaskStatus::Open
}

/// A step may start if it is first in order or its immediate predecessor
/// (by order index) is completed.
pub fn can_start_step(task: &Task, step_id: &str) -> bool {
    let mut ordered: Vec<&super::models::TaskStep> = task.steps.iter().collect();
    ordered.sort_by_key(|s| s.order);
    let Some(position) = ordered.iter().position(|s| s.id == step_id) else {
        return false;
    };
    position == 0 || ordered[position - 1].status == StepStatus::Completed
}

/// Move a pending step to in-progress.
pub fn start_step(task: &mut Task, step_id: &str, actor: &Actor) -> Result<(), WorkflowError> {
    if !task.steps.iter().any(|s| s.id == step_id) {
        return Err(WorkflowError::StepNotFound(step_id.to_string()));
    }
    if !can_start_step(task, step_id) {
        return Err(WorkflowError::PredecessorNotCompleted(step_id.to_string()));
    }

    let step = find_step_mut(task, step_id)?;
    if step.status != StepStatus::Pending {
        return Err(WorkflowError::InvalidStepTransition(step_id.to_string()));
    }
    step.status = StepStatus::InProgress;
    let title = step.title.clone();

    push_history(
        task,
        actor,
        ACTION_STEP_STARTED,
        format!("Step \"{}\" moved to in progress.", title),
        HistoryKind::Step,
    );
    refresh_task_status(task);
    Ok(())
}

/// Complete a step, recording the actor and timestamp.
pub fn complete_step(task: &mut Task, step_id: &str, actor: &Actor) -> Result<(), WorkflowError> {
    let now = Utc::now();
    let actor_name = actor.user_name.clone();
    let step = find_step_mut(task, step_id)?;
    if step.status == StepStatus::Completed {
        return Err(WorkflowError::InvalidStepTransition(step_id.to_string()));
    }
    step.status = StepStatus::Completed;
    step.completed_at = Some(now);
    step.completed_by = Some(actor_name);
    let title = step.title.clone();

    push_history(
        task,
        actor,
        ACTION_STEP_COMPLETED,
        format!("Step \"{}\" completed.", title),
        HistoryKind::Step,
    );
    refresh_task_status(task);
    Ok(())
}

/// Undo a completed step, back to pending or in-progress.
///
/// Clears the completion actor and timestamp.
pub fn revert_step(
    task: &mut Task,
    step_id: &str,
    target: StepStatus,
    actor: &Actor,
) -> Result<(), WorkflowError> {
    if target == StepStatus::Completed {
        return Err(WorkflowError::InvalidStepTransition(step_id.to_string()));
    }
    let step = find_step_mut(task, step_id)?;
    if step.status != StepStatus::Completed {
        return Err(WorkflowError::InvalidStepTransition(step_id.to_string()));
    }
    step.status = target;
    step.completed_at = None;
    step.completed_by = None;
    let title = step.title.clone();

    push_history(
        task,
        actor,
        ACTION_STEP_REVERTED,
        format!("Completion of step \"{}\" was undone for correction.", title),
        HistoryKind::Step,
    );
    refresh_task_status(task);
    Ok(())
}

/// Reopen a completed task: clears `completed_at`, reverts the status to
/// in-progress and appends exactly one "reopened" history entry.
pub fn reopen_task(task: &mut Task, actor: &Actor) -> Result<(), WorkflowError> {
    if task.status != TaskStatus::Completed {
        return Err(WorkflowError::NotCompleted);
    }
    task.completed_at = None;
    task.status = TaskStatus::InProgress;
    push_history(
        task,
        actor,
        ACTION_REOPENED,
        "Task reopened after completion.".to_string(),
        HistoryKind::System,
    );
    Ok(())
}

/// Manually set the task status (authorization happens upstream in
/// `access::status`). Appends a "status_changed" history entry.
pub fn set_task_status(task: &mut Task, next: TaskStatus, actor: &Actor) {
    let previous = task.status;
    task.status = next;
    match next {
        TaskStatus::Completed => {
            if task.completed_at.is_none() {
                task.completed_at = Some(Utc::now());
            }
        }
        TaskStatus::InProgress => {
            if task.started_at.is_none() {
                task.started_at = Some(Utc::now());
            }
            task.completed_at = None;
        }
        _ => {
            task.completed_at = None;
        }
    }
    push_history(
        task,
        actor,
        ACTION_STATUS_CHANGED,
        format!("Status changed from {} to {}.", previous.as_str(), next.as_str()),
        HistoryKind::System,
    );
}

/// Append a free-text comment to the task history.
pub fn add_comment(task: &mut Task, actor: &Actor, comment: String) {
    let entry = HistoryEntry {
        id: Uuid::new_v4().to_string(),
        user_id: actor.user_id.clone(),
        user_name: actor.user_name.clone(),
        action: "comment".to_string(),
        timestamp: Utc::now(),
        details: "Technical note recorded by the user.".to_string(),
        comment: Some(comment),
        kind: HistoryKind::Manual,
    };
    task.history.insert(0, entry);
}

fn find_step_mut<'a>(
    task: &'a mut Task,
    step_id: &str,
) -> Result<&'a mut super::models::TaskStep, WorkflowError> {
    task.steps
        .iter_mut()
        .find(|s| s.id == step_id)
        .ok_or_else(|| WorkflowError::StepNotFound(step_id.to_string()))
}

// History is kept newest-first.
fn push_history(task: &mut Task, actor: &Actor, action: &str, details: String, kind: HistoryKind) {
    let entry = HistoryEntry {
        id: Uuid::new_v4().to_string(),
        user_id: actor.user_id.clone(),
        user_name: actor.user_name.clone(),
        action: action.to_string(),
        timestamp: Utc::now(),
        details,
        comment: None,
        kind,
    };
    task.history.insert(0, entry);
}

fn refresh_task_status(task: &mut Task) {
    let derived = derive_task_status(&task.steps, task.status);
    if derived == TaskStatus::InProgress && task.started_at.is_none() {
        task.started_at = Some(Utc::now());
    }
    if derived == TaskStatus::Completed {
        if task.completed_at.is_none() {
            task.completed_at = Some(Utc::now());
        }
    } else {
        task.completed_at = None;
    }
    task.status = derived;
}
