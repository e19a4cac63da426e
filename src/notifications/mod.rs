//! Task notification drafting.

mod models;
mod service;

pub use models::{DraftedNotification, NotificationTarget};
pub use service::draft_task_notification;
