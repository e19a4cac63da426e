//! Shared builders for unit tests.

use chrono::Utc;

use crate::user::models::{GroupPermissions, Sector, User};

use super::models::{
    StepStatus, Task, TaskPriority, TaskStatus, TaskStep, TaskType, TaskVisibility,
};
use super::workflow::derive_task_status;

pub fn step(order: u32, status: StepStatus) -> TaskStep {
    TaskStep {
        id: format!("st-{}", order),
        title: format!("Step {}", order),
        description: None,
        responsible_group_id: "g-production".to_string(),
        responsible_user_id: None,
        deadline: None,
        status,
        order,
        completed_at: if status == StepStatus::Completed {
            Some(Utc::now())
        } else {
            None
        },
        completed_by: if status == StepStatus::Completed {
            Some("Fixture User".to_string())
        } else {
            None
        },
    }
}

pub fn task_with_steps(statuses: &[StepStatus]) -> Task {
    let steps: Vec<TaskStep> = statuses
        .iter()
        .enumerate()
        .map(|(i, s)| step(i as u32 + 1, *s))
        .collect();
    let status = derive_task_status(&steps, TaskStatus::Open);
    Task {
        id: "t-1".to_string(),
        task_type: TaskType::Routine,
        requesting_sector: "s-pcp".to_string(),
        responsible_sector: "s-production".to_string(),
        priority: TaskPriority::Medium,
        description: "Extrude batch 42".to_string(),
        product_profile: "AL-6063-T5".to_string(),
        op_number: Some("OP-5582".to_string()),
        quantity: Some(120),
        open_date: Utc::now(),
        created_at: Utc::now(),
        created_by: "Fixture User".to_string(),
        started_at: None,
        completed_at: None,
        deadline: Utc::now(),
        responsible_id: None,
        executor_group_id: "g-production".to_string(),
        requestor_id: "u-requestor".to_string(),
        follower_ids: vec![],
        status,
        visibility: TaskVisibility::Global,
        visible_group_ids: vec![],
        visible_user_ids: vec![],
        visible_sector_ids: vec![],
        history: vec![],
        attachments: vec![],
        steps,
        notification_target: None,
    }
}

pub fn user(id: &str, sector_id: &str, group_ids: &[&str]) -> User {
    User {
        id: id.to_string(),
        name: format!("User {}", id),
        email: format!("{}@plant.example", id),
        sector_id: sector_id.to_string(),
        group_ids: group_ids.iter().map(|g| g.to_string()).collect(),
        active: true,
        avatar: None,
        last_access: Utc::now(),
    }
}

pub fn group(id: &str) -> GroupPermissions {
    GroupPermissions {
        id: id.to_string(),
        name: id.to_string(),
        description: None,
        can_create: false,
        can_view_all: false,
        can_update_status: false,
        can_comment: true,
        can_attach: false,
        can_finish: false,
        can_view_dashboards: false,
        is_system: false,
        is_system_admin: false,
    }
}

pub fn sector(id: &str, name: &str, initials: &str) -> Sector {
    Sector {
        id: id.to_string(),
        name: name.to_string(),
        initials: initials.to_string(),
        active: true,
        color: None,
    }
}
