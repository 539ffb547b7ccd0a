//! Registration ledger

use crate::domain::entities::{Registration, RegistrationState};
use crate::domain::state::RegistrationEvent;
use crate::repository::transactions::{
    create_registration_tx, get_registration_tx, put_registration_tx,
};
use enlist_common::{Error, Result};
use enlist_store::{Filter, Store};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct RegistrationLedger {
    store: Store,
}

impl RegistrationLedger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, registration_id: Uuid) -> Result<Registration> {
        self.store
            .get::<Registration>(registration_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Registration {} not found", registration_id)))
    }

    pub async fn create_individual(&self, event_id: Uuid, registrant_id: Uuid) -> Result<Uuid> {
        self.create(Registration::individual(event_id, registrant_id))
            .await
    }

    pub async fn create_team_linked(
        &self,
        event_id: Uuid,
        team_id: Uuid,
        leader_id: Uuid,
    ) -> Result<Uuid> {
        self.create(Registration::team_linked(event_id, team_id, leader_id))
            .await
    }

    async fn create(&self, registration: Registration) -> Result<Uuid> {
        let mut tx = self.store.begin();
        create_registration_tx(&mut tx, &registration).await?;
        tx.commit().await?;
        Ok(registration.id)
    }

    /// Flip to `completed`; calling it again is a no-op.
    pub async fn mark_completed(&self, registration_id: Uuid) -> Result<Registration> {
        let mut tx = self.store.begin();
        let mut registration = get_registration_tx(&mut tx, registration_id).await?;
        if registration.mark_completed(RegistrationEvent::PaymentConfirmed)? {
            put_registration_tx(&mut tx, &registration)?;
            tx.commit().await?;
        }
        Ok(registration)
    }

    pub async fn attach_payment(
        &self,
        registration_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Registration> {
        let mut tx = self.store.begin();
        let mut registration = get_registration_tx(&mut tx, registration_id).await?;
        registration.attach_payment(payment_id)?;
        put_registration_tx(&mut tx, &registration)?;
        tx.commit().await?;
        Ok(registration)
    }

    pub async fn find_by_team(&self, team_id: Uuid) -> Result<Vec<Registration>> {
        Ok(self
            .store
            .find(&Filter::new().eq("team_id", team_id.to_string()))
            .await?)
    }

    /// Registrations a user initiated, optionally filtered by status
    pub async fn find_by_registrant(
        &self,
        registrant_id: Uuid,
        status: Option<RegistrationState>,
    ) -> Result<Vec<Registration>> {
        let mut filter = Filter::new().eq("registrant_id", registrant_id.to_string());
        if let Some(status) = status {
            filter = filter.eq("status", status.to_string());
        }
        Ok(self.store.find(&filter).await?)
    }
}
