//! The `StateStore` contract (§3, §6) and an in-memory reference
//! implementation. Grounded on the teacher's `checkpoint::CheckpointStore`
//! trait and `MemoryCheckpointStore` (`Mutex<HashMap<...>>`); the
//! file/SQLite-backed variants are concrete persistence backends and out of
//! scope here (§1) — see `DESIGN.md`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::state::AgentState;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, agent_id: &str) -> Option<AgentState>;
    async fn save(&self, state: &AgentState);
}

/// Reference implementation, useful for tests and for callers who don't
/// need durability across process restarts.
#[derive(Default)]
pub struct InMemoryStateStore {
    states: Mutex<HashMap<String, AgentState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, agent_id: &str) -> Option<AgentState> {
        self.states.lock().unwrap().get(agent_id).cloned()
    }

    async fn save(&self, state: &AgentState) {
        self.states
            .lock()
            .unwrap()
            .insert(state.agent_id.clone(), state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_state() {
        let store = InMemoryStateStore::new();
        let state = AgentState::new("a1", "goal");
        store.save(&state).await;
        let loaded = store.load("a1").await.unwrap();
        assert_eq!(loaded.agent_id, "a1");
        assert_eq!(loaded.goal, "goal");
    }

    #[tokio::test]
    async fn missing_agent_returns_none() {
        let store = InMemoryStateStore::new();
        assert!(store.load("missing").await.is_none());
    }
}
