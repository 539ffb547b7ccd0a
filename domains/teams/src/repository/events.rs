//! Event catalog

use crate::domain::entities::Event;
use enlist_common::{Error, Result};
use enlist_store::{Filter, Store};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct EventCatalog {
    store: Store,
}

impl EventCatalog {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, event_id: Uuid) -> Result<Event> {
        self.store
            .get::<Event>(event_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Event {} not found", event_id)))
    }

    /// Published events, optionally only those that do (or do not) take teams
    pub async fn list(&self, team_eligible: Option<bool>) -> Result<Vec<Event>> {
        let filter = match team_eligible {
            Some(eligible) => Filter::new().eq("team_eligible", eligible),
            None => Filter::new(),
        };
        Ok(self.store.find(&filter).await?)
    }

    /// Publish an event (administrative)
    pub async fn create(&self, event: &Event) -> Result<()> {
        self.store.put(event).await?;
        tracing::info!(event_id = %event.id, name = %event.name, "Event published");
        Ok(())
    }
}
