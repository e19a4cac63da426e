//! Drafts email notifications for tasks.
//!
//! Pure functions only: the transport that actually sends mail lives outside
//! this crate. Group recipients resolve to a mailing-list alias derived from
//! the group name.

use super::models::{DraftedNotification, NotificationTarget};
use crate::user::models::{GroupPermissions, User};
use crate::workorder::models::Task;
use tracing::info;

const MAIL_DOMAIN: &str = "plant.example";

fn group_alias(group: &GroupPermissions) -> String {
    let local: String = group
        .name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    format!("{}@{}", local, MAIL_DOMAIN)
}

/// Drafts a "new task" notification, or `None` when the target is
/// [`NotificationTarget::None`] or no recipient resolves.
pub fn draft_task_notification(
    task: &Task,
    target: NotificationTarget,
    users: &[User],
    groups: &[GroupPermissions],
) -> Option<DraftedNotification> {
    if target == NotificationTarget::None {
        return None;
    }

    let op = task.op_number.as_deref().unwrap_or("N/A");
    let subject = format!(
        "[Workorder] New task - {} - OP: {}",
        task.task_type.as_str(),
        op
    );
    let body = format!(
        "A new task has been opened in the work-order system.\n\
         \n\
         Type: {}\n\
         Priority: {}\n\
         Profile: {}\n\
         OP: {}\n\
         Description: {}\n\
         Deadline: {}\n\
         \n\
         Full details are available in the work-order management system.",
        task.task_type.as_str(),
        task.priority.as_str(),
        task.product_profile,
        op,
        task.description,
        task.deadline.to_rfc3339(),
    );

    let recipients: Vec<String> = match target {
        NotificationTarget::None => unreachable!(),
        NotificationTarget::Global => vec![format!("everyone@{}", MAIL_DOMAIN)],
        NotificationTarget::Individual => users.iter().map(|u| u.email.clone()).collect(),
        NotificationTarget::Group => groups.iter().map(group_alias).collect(),
    };
    if recipients.is_empty() {
        return None;
    }

    info!(task_id = %task.id, recipients = recipients.len(), "Drafted task notification");
    Some(DraftedNotification {
        subject,
        body,
        recipients,
    })
}
