use crate::user::models::{GroupPermissions, Sector};
use crate::workorder::models::Task;
use thiserror::Error;

/// Failure classification for store operations.
///
/// `Data` means the backend answered and something is wrong with the payload
/// or the query; callers should surface it. `Network` means the backend was
/// unreachable; callers may fall back to a degraded in-memory store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("data error: {0}")]
    Data(#[from] anyhow::Error),
    #[error("store unreachable: {0}")]
    Network(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Data(err.into())
    }
}

pub trait TaskStore: Send + Sync {
    /// Returns every task, steps ordered by index and history newest-first.
    fn fetch_all_tasks(&self) -> Result<Vec<Task>, StoreError>;

    /// Returns one task by id.
    /// Returns Ok(None) if the task does not exist.
    fn get_task(&self, task_id: &str) -> Result<Option<Task>, StoreError>;

    /// Inserts or fully replaces a task aggregate (steps, history,
    /// attachments, followers and visibility lists included).
    fn upsert_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Returns all sectors.
    fn fetch_sectors(&self) -> Result<Vec<Sector>, StoreError>;

    /// Inserts or replaces a sector.
    fn upsert_sector(&self, sector: &Sector) -> Result<(), StoreError>;

    /// Returns all permission groups.
    fn fetch_groups(&self) -> Result<Vec<GroupPermissions>, StoreError>;

    /// Inserts or replaces a permission group.
    fn upsert_group(&self, group: &GroupPermissions) -> Result<(), StoreError>;
}
