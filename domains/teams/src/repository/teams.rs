//! Team registry

use crate::domain::entities::Team;
use enlist_common::Result;
use enlist_store::{Filter, Store};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct TeamRegistry {
    store: Store,
}

impl TeamRegistry {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, team_id: Uuid) -> Result<Option<Team>> {
        Ok(self.store.get(team_id).await?)
    }

    /// Teams led by a user for one event
    pub async fn list_led_by(&self, leader_id: Uuid, event_id: Uuid) -> Result<Vec<Team>> {
        Ok(self
            .store
            .find(
                &Filter::new()
                    .eq("leader_id", leader_id.to_string())
                    .eq("event_id", event_id.to_string()),
            )
            .await?)
    }
}
