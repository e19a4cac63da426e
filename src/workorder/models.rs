//! Work-order data models
//!
//! A `Task` owns its steps, history and attachments by value; everything
//! else (users, groups, sectors) is referenced by id.

use crate::notifications::NotificationTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Waiting,
    Completed,
    Canceled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Waiting => "waiting",
            TaskStatus::Completed => "completed",
            TaskStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(TaskStatus::Open),
            "in_progress" => Some(TaskStatus::InProgress),
            "waiting" => Some(TaskStatus::Waiting),
            "completed" => Some(TaskStatus::Completed),
            "canceled" => Some(TaskStatus::Canceled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StepStatus::Pending),
            "in_progress" => Some(StepStatus::InProgress),
            "completed" => Some(StepStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskVisibility {
    Global,
    Group,
    Sector,
    Private,
}

impl TaskVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskVisibility::Global => "global",
            TaskVisibility::Group => "group",
            TaskVisibility::Sector => "sector",
            TaskVisibility::Private => "private",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "global" => Some(TaskVisibility::Global),
            "group" => Some(TaskVisibility::Group),
            "sector" => Some(TaskVisibility::Sector),
            "private" => Some(TaskVisibility::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Routine,
    QualityTest,
    ProductionPriority,
    SampleCut,
    MachiningRequest,
    ShippingPriority,
    OperationalIncident,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Routine => "routine",
            TaskType::QualityTest => "quality_test",
            TaskType::ProductionPriority => "production_priority",
            TaskType::SampleCut => "sample_cut",
            TaskType::MachiningRequest => "machining_request",
            TaskType::ShippingPriority => "shipping_priority",
            TaskType::OperationalIncident => "operational_incident",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "routine" => Some(TaskType::Routine),
            "quality_test" => Some(TaskType::QualityTest),
            "production_priority" => Some(TaskType::ProductionPriority),
            "sample_cut" => Some(TaskType::SampleCut),
            "shipping_priority" => Some(TaskType::ShippingPriority),
            "machining_request" => Some(TaskType::MachiningRequest),
            "operational_incident" => Some(TaskType::OperationalIncident),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            "critical" => Some(TaskPriority::Critical),
            _ => None,
        }
    }
}

/// Provenance of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    System,
    Manual,
    Step,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryKind::System => "system",
            HistoryKind::Manual => "manual",
            HistoryKind::Step => "step",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "system" => Some(HistoryKind::System),
            "manual" => Some(HistoryKind::Manual),
            "step" => Some(HistoryKind::Step),
            _ => None,
        }
    }
}

/// An ordered stage within a task's workflow.
///
/// `order` is 1-based; a step may only start once its predecessor is
/// completed (enforced by `workflow`, not by this struct).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub responsible_group_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    pub status: StepStatus,
    pub order: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
}

/// Append-only audit record; tasks keep these newest-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub kind: HistoryKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub url: String,
    pub uploaded_by: String,
    pub date: DateTime<Utc>,
}

/// A production work order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub requesting_sector: String,
    pub responsible_sector: String,
    pub priority: TaskPriority,
    pub description: String,
    pub product_profile: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    pub open_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub deadline: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsible_id: Option<String>,
    pub executor_group_id: String,
    pub requestor_id: String,
    #[serde(default)]
    pub follower_ids: Vec<String>,
    pub status: TaskStatus,
    pub visibility: TaskVisibility,
    #[serde(default)]
    pub visible_group_ids: Vec<String>,
    #[serde(default)]
    pub visible_user_ids: Vec<String>,
    #[serde(default)]
    pub visible_sector_ids: Vec<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub steps: Vec<TaskStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_target: Option<NotificationTarget>,
}

impl Task {
    /// Steps sorted by order index, cheapest place to enforce the invariant
    /// after deserializing from an external source.
    pub fn sort_steps(&mut self) {
        self.steps.sort_by_key(|s| s.order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_roundtrip() {
        for status in [
            TaskStatus::Open,
            TaskStatus::InProgress,
            TaskStatus::Waiting,
            TaskStatus::Completed,
            TaskStatus::Canceled,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::from_str("bogus"), None);
    }

    #[test]
    fn step_status_roundtrip() {
        for status in [
            StepStatus::Pending,
            StepStatus::InProgress,
            StepStatus::Completed,
        ] {
            assert_eq!(StepStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(StepStatus::from_str(""), None);
    }

    #[test]
    fn visibility_roundtrip() {
        for visibility in [
            TaskVisibility::Global,
            TaskVisibility::Group,
            TaskVisibility::Sector,
            TaskVisibility::Private,
        ] {
            assert_eq!(TaskVisibility::from_str(visibility.as_str()), Some(visibility));
        }
    }

    #[test]
    fn task_type_roundtrip() {
        for task_type in [
            TaskType::Routine,
            TaskType::QualityTest,
            TaskType::ProductionPriority,
            TaskType::SampleCut,
            TaskType::MachiningRequest,
            TaskType::ShippingPriority,
            TaskType::OperationalIncident,
        ] {
            assert_eq!(TaskType::from_str(task_type.as_str()), Some(task_type));
        }
    }

    #[test]
    fn priority_ordering() {
        assert!(TaskPriority::Critical > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Medium);
        assert!(TaskPriority::Medium > TaskPriority::Low);
    }

    #[test]
    fn status_serializes_snake_case() {
        let serialized = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(serialized, "\"in_progress\"");

        let deserialized: TaskStatus = serde_json::from_str("\"waiting\"").unwrap();
        assert_eq!(deserialized, TaskStatus::Waiting);
    }

    #[test]
    fn sort_steps_orders_by_index() {
        let mut task = crate::workorder::fixtures::task_with_steps(&[
            StepStatus::Pending,
            StepStatus::Pending,
            StepStatus::Pending,
        ]);
        task.steps.reverse();
        task.sort_steps();
        let orders: Vec<u32> = task.steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }
}
