//! Authorization for manual task status changes.

use crate::user::models::{GroupPermissions, User};
use crate::workorder::models::{Task, TaskStatus};

/// May `user` move `task` to `next_status`? Fails closed.
///
/// Base requirement: a held bundle grants `can_update_status`, or a held
/// bundle is a system-admin one. On top of that:
/// - moving to in-progress is reserved to the executor group, the
///   individually responsible user, or an admin;
/// - completing additionally requires `can_finish`.
pub fn can_update_status(
    user: &User,
    task: &Task,
    groups: &[GroupPermissions],
    next_status: TaskStatus,
) -> bool {
    let held: Vec<&GroupPermissions> = groups
        .iter()
        .filter(|g| user.is_in_group(&g.id))
        .collect();

    let is_admin = held.iter().any(|g| g.is_system_admin);
    let can_update = held.iter().any(|g| g.can_update_status);
    if !can_update && !is_admin {
        return false;
    }

    let is_executor = user.is_in_group(&task.executor_group_id);
    let is_responsible = task.responsible_id.as_deref() == Some(&user.id);

    match next_status {
        TaskStatus::InProgress => is_executor || is_responsible || is_admin,
        TaskStatus::Completed => {
            let can_finish = held.iter().any(|g| g.can_finish);
            (is_executor || is_responsible || is_admin) && can_finish
        }
        _ => true,
    }
}
