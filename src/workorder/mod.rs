#[cfg(test)]
pub mod fixtures;
pub mod models;
pub mod workflow;

pub use models::{
    Attachment, HistoryEntry, HistoryKind, StepStatus, Task, TaskPriority, TaskStatus, TaskStep,
    TaskType, TaskVisibility,
};
pub use workflow::{Actor, WorkflowError};
