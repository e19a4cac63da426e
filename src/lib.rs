//! Work-Order Management Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod access;
pub mod config;
pub mod notifications;
pub mod server;
pub mod sqlite_persistence;
pub mod task_store;
pub mod user;
pub mod workorder;

// Re-export commonly used types for convenience
pub use server::{run_server, RequestsLoggingLevel};
pub use task_store::{InMemoryTaskStore, SqliteTaskStore, StoreError, TaskStore};
pub use user::{SqliteUserStore, UserStore};
