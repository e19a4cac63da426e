use axum::extract::FromRef;

use crate::task_store::TaskStore;
use crate::user::UserStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedTaskStore = Arc<dyn TaskStore>;
pub type GuardedUserStore = Arc<dyn UserStore>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub task_store: GuardedTaskStore,
    pub user_store: GuardedUserStore,
}

impl FromRef<ServerState> for GuardedTaskStore {
    fn from_ref(input: &ServerState) -> Self {
        input.task_store.clone()
    }
}

impl FromRef<ServerState> for GuardedUserStore {
    fn from_ref(input: &ServerState) -> Self {
        input.user_store.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
