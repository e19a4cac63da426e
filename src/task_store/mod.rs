//! Task persistence: trait, SQLite implementation and in-memory fallback.

mod memory_store;
mod schema;
mod store;
mod trait_def;

pub use memory_store::InMemoryTaskStore;
pub use store::SqliteTaskStore;
pub use trait_def::{StoreError, TaskStore};
