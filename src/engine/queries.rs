use ulid::Ulid;

use crate::model::*;

use super::Registry;

impl Registry {
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    pub async fn get(&self, id: Ulid) -> Option<Event> {
        self.store.read().await.get(&id).cloned()
    }

    /// Snapshot of stored events sorted by start, optionally limited to one participant.
    pub async fn events(&self, participant: Option<&str>) -> Vec<Event> {
        let guard = self.store.read().await;
        guard
            .iter()
            .filter(|e| participant.is_none_or(|p| e.participants.contains(p)))
            .cloned()
            .collect()
    }
}
