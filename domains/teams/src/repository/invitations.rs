//! Invitation ledger

use crate::domain::entities::{Invitation, InvitationDecision};
use crate::repository::transactions::{
    create_invitation_tx, get_event_tx, get_pending_invitation_tx, get_team_tx, get_user_tx,
    put_invitation_tx, put_team_tx,
};
use enlist_common::{ConflictKind, Error, Result, StoreError};
use enlist_store::{Filter, Store, Transaction};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct InvitationLedger {
    store: Store,
}

impl InvitationLedger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Invite one more email to an existing team.
    ///
    /// Rejects a second pending invitation for the same (team, email).
    pub async fn create(
        &self,
        team_id: Uuid,
        event_id: Uuid,
        from_user_id: Uuid,
        to_email: &str,
        message: Option<&str>,
    ) -> Result<Uuid> {
        let mut tx = self.store.begin();

        let mut team = get_team_tx(&mut tx, team_id).await?;
        if team.event_id != event_id {
            return Err(Error::Validation(format!(
                "Team {} is not registered for event {}",
                team_id, event_id
            )));
        }
        let event = get_event_tx(&mut tx, event_id).await?;
        let from = get_user_tx(&mut tx, from_user_id).await?;

        let invitation = Invitation::new(&team, &event, &from, to_email, message)?;
        create_invitation_tx(&mut tx, &invitation).await?;
        team.invitation_ids.insert(invitation.id);
        team.touch();
        put_team_tx(&mut tx, &team)?;

        tx.commit().await?;
        tracing::info!(invitation_id = %invitation.id, team_id = %team_id, "Invitation created");
        Ok(invitation.id)
    }

    pub async fn get_by_id(&self, invitation_id: Uuid) -> Result<Invitation> {
        self.store
            .get::<Invitation>(invitation_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Invitation {} not found", invitation_id)))
    }

    /// Invitation that is still open; `AlreadyProcessed` otherwise
    pub async fn get_pending(&self, invitation_id: Uuid) -> Result<Invitation> {
        let invitation = self.get_by_id(invitation_id).await?;
        if !invitation.is_pending() {
            return Err(Error::conflict(
                ConflictKind::AlreadyProcessed,
                format!("Invitation has already been {}", invitation.status),
            ));
        }
        Ok(invitation)
    }

    /// Record a decision on a pending invitation; exactly one resolution wins.
    pub async fn resolve(
        &self,
        invitation_id: Uuid,
        decision: InvitationDecision,
        resolver_id: Uuid,
    ) -> Result<Invitation> {
        let mut tx = self.store.begin();
        let mut invitation = get_pending_invitation_tx(&mut tx, invitation_id).await?;
        invitation.resolve(decision, resolver_id)?;
        put_invitation_tx(&mut tx, &invitation)?;
        self.commit_resolution(tx, invitation_id).await?;
        Ok(invitation)
    }

    /// Commit a transaction that resolves `invitation_id`.
    ///
    /// When the commit loses to a concurrent writer and the invitation is no
    /// longer pending, the loser gets `AlreadyProcessed` rather than a
    /// retryable error. A conflict elsewhere stays transient.
    pub async fn commit_resolution(&self, tx: Transaction, invitation_id: Uuid) -> Result<()> {
        match tx.commit().await {
            Ok(()) => Ok(()),
            Err(conflict @ StoreError::Conflict { .. }) => {
                let current = self.get_by_id(invitation_id).await?;
                if current.is_pending() {
                    return Err(conflict.into());
                }
                tracing::debug!(
                    invitation_id = %invitation_id,
                    status = %current.status,
                    "Lost resolution race"
                );
                Err(Error::conflict(
                    ConflictKind::AlreadyProcessed,
                    format!("Invitation has already been {}", current.status),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_by_team(&self, team_id: Uuid) -> Result<Vec<Invitation>> {
        Ok(self
            .store
            .find(&Filter::new().eq("team_id", team_id.to_string()))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Event, InvitationState, Team, User};

    async fn seeded() -> (InvitationLedger, Store, Event, User, Team) {
        let store = Store::memory();
        let event = Event::team("Hackathon", 2, 4).unwrap();
        let leader = User::new("lead@x.com", "Lead").unwrap();
        let team = Team::new(&event, leader.id, "Byte Me".to_string());
        store.put(&event).await.unwrap();
        store.put(&leader).await.unwrap();
        store.put(&team).await.unwrap();
        (InvitationLedger::new(store.clone()), store, event, leader, team)
    }

    #[tokio::test]
    async fn test_create_links_invitation_to_team() {
        let (ledger, store, event, leader, team) = seeded().await;

        let id = ledger
            .create(team.id, event.id, leader.id, "A@x.com", Some("Come along"))
            .await
            .unwrap();

        let invitation = ledger.get_pending(id).await.unwrap();
        assert_eq!(invitation.to_email, "a@x.com");
        assert_eq!(invitation.message, "Come along");
        let stored: Team = store.get(team.id).await.unwrap().unwrap();
        assert!(stored.invitation_ids.contains(&id));

        let err = ledger
            .create(team.id, event.id, leader.id, "a@X.com", None)
            .await
            .unwrap_err();
        assert_eq!(err.conflict_kind(), Some(ConflictKind::DuplicateInvitation));
    }

    #[tokio::test]
    async fn test_create_rejects_wrong_event() {
        let (ledger, _store, _event, leader, team) = seeded().await;
        let result = ledger
            .create(team.id, Uuid::new_v4(), leader.id, "a@x.com", None)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_resolve_exactly_once() {
        let (ledger, _store, event, leader, team) = seeded().await;
        let id = ledger
            .create(team.id, event.id, leader.id, "a@x.com", None)
            .await
            .unwrap();
        let resolver = Uuid::new_v4();

        let declined = ledger
            .resolve(id, InvitationDecision::Decline, resolver)
            .await
            .unwrap();
        assert_eq!(declined.status, InvitationState::Declined);
        assert_eq!(declined.resolved_by, Some(resolver));

        let err = ledger
            .resolve(id, InvitationDecision::Accept, resolver)
            .await
            .unwrap_err();
        assert_eq!(err.conflict_kind(), Some(ConflictKind::AlreadyProcessed));
        assert_eq!(
            ledger.get_pending(id).await.unwrap_err().conflict_kind(),
            Some(ConflictKind::AlreadyProcessed)
        );
        assert_eq!(ledger.list_by_team(team.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_losing_race_is_already_processed() {
        let (ledger, store, event, leader, team) = seeded().await;
        let id = ledger
            .create(team.id, event.id, leader.id, "a@x.com", None)
            .await
            .unwrap();

        // both transactions see the invitation pending
        let mut first = store.begin();
        let mut second = store.begin();
        let mut accepted = get_pending_invitation_tx(&mut first, id).await.unwrap();
        let mut declined = get_pending_invitation_tx(&mut second, id).await.unwrap();

        accepted.resolve(InvitationDecision::Accept, Uuid::new_v4()).unwrap();
        put_invitation_tx(&mut first, &accepted).unwrap();
        ledger.commit_resolution(first, id).await.unwrap();

        declined.resolve(InvitationDecision::Decline, Uuid::new_v4()).unwrap();
        put_invitation_tx(&mut second, &declined).unwrap();
        let err = ledger.commit_resolution(second, id).await.unwrap_err();
        assert_eq!(err.conflict_kind(), Some(ConflictKind::AlreadyProcessed));
        assert!(!err.is_retryable());

        let stored = ledger.get_by_id(id).await.unwrap();
        assert_eq!(stored.status, InvitationState::Accepted);
    }

    #[tokio::test]
    async fn test_resolution_conflict_on_pending_invitation_stays_transient() {
        let (ledger, store, event, leader, team) = seeded().await;
        let id = ledger
            .create(team.id, event.id, leader.id, "a@x.com", None)
            .await
            .unwrap();

        let mut tx = store.begin();
        let mut invitation = get_pending_invitation_tx(&mut tx, id).await.unwrap();

        // a concurrent writer touches the invitation without resolving it
        let mut edited = ledger.get_by_id(id).await.unwrap();
        edited.message = "See you there".to_string();
        store.put(&edited).await.unwrap();

        invitation.resolve(InvitationDecision::Accept, Uuid::new_v4()).unwrap();
        put_invitation_tx(&mut tx, &invitation).unwrap();
        let err = ledger.commit_resolution(tx, id).await.unwrap_err();
        assert!(matches!(err, Error::Transient(_)));
        assert!(err.is_retryable());
        assert!(ledger.get_pending(id).await.is_ok());
    }
}
