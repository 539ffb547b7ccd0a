//! Concurrency Integration Tests
//!
//! Races workflow operations against each other on a multi-threaded runtime.
//! Two resolutions of one invitation settle without retries: the loser sees
//! `AlreadyProcessed`. Races over shared team state abort with a transient
//! error that the caller retries until it observes the winner's result.

mod common;

use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use enlist_common::{ConflictKind, Error, Result, StoreError};
use enlist_store::{
    DocumentStore, Filter, MemoryStore, Mutation, Precondition, Store, StoredDocument,
};
use enlist_teams::{InvitationDecision, InvitationState, LeaveOutcome, ResponseOutcome};
use tokio::sync::Barrier;
use uuid::Uuid;

use crate::common::{invitation_for, response, TestApp};

const MAX_ATTEMPTS: usize = 5;

/// Memory store whose next `parties` commits wait for each other.
///
/// Every racer has finished its reads before any of them commits.
struct RendezvousStore {
    inner: MemoryStore,
    gate: Mutex<Option<(Arc<Barrier>, usize)>>,
}

impl RendezvousStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            gate: Mutex::new(None),
        }
    }

    fn arm(&self, parties: usize) {
        *self.gate.lock().unwrap() = Some((Arc::new(Barrier::new(parties)), parties));
    }

    fn next_barrier(&self) -> Option<Arc<Barrier>> {
        let mut gate = self.gate.lock().unwrap();
        let (barrier, remaining) = gate.as_mut()?;
        let barrier = barrier.clone();
        *remaining -= 1;
        if *remaining == 0 {
            *gate = None;
        }
        Some(barrier)
    }
}

#[async_trait]
impl DocumentStore for RendezvousStore {
    async fn fetch(
        &self,
        collection: &str,
        key: Uuid,
    ) -> std::result::Result<Option<StoredDocument>, StoreError> {
        self.inner.fetch(collection, key).await
    }

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> std::result::Result<Vec<StoredDocument>, StoreError> {
        self.inner.query(collection, filter).await
    }

    async fn commit(
        &self,
        preconditions: Vec<Precondition>,
        mutations: Vec<Mutation>,
    ) -> std::result::Result<(), StoreError> {
        if let Some(barrier) = self.next_barrier() {
            barrier.wait().await;
        }
        self.inner.commit(preconditions, mutations).await
    }

    fn backend_name(&self) -> &'static str {
        "rendezvous"
    }
}

/// Application over a rendezvous store, and the store to arm
fn rendezvous_app() -> (TestApp, Arc<RendezvousStore>) {
    let store = Arc::new(RendezvousStore::new());
    let t = TestApp::with_store(Store::new(store.clone()));
    (t, store)
}

/// Retry an operation while it aborts on a concurrent writer.
async fn with_retry<T, F, Fut>(mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => attempt += 1,
            other => return other,
        }
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_concurrent_accepts_of_one_invitation_commit_once() {
    let t = TestApp::new();
    let event = t.event(2, 4).await;
    let leader = t.user("leader@x.com").await;
    let a = t.user("a@x.com").await;
    let created = t.create_team(&event, &leader, &[&a]).await;
    let invitation_id = invitation_for(&created, &a).id;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let engine = t.app.services.formation.clone();
        let request = response(invitation_id, &a, InvitationDecision::Accept);
        handles.push(tokio::spawn(async move {
            engine.respond_to_invitation(request).await
        }));
    }

    let mut accepted = 0;
    let mut already_processed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) if e.conflict_kind() == Some(ConflictKind::AlreadyProcessed) => {
                already_processed += 1
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!((accepted, already_processed), (1, 1));

    let team = t
        .app
        .services
        .repos
        .teams
        .get_by_id(created.team.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(team.members(), &[leader.id, a.id]);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_last_seat_goes_to_exactly_one_invitee() {
    let t = TestApp::new();
    let event = t.event(2, 3).await;
    let leader = t.user("leader@x.com").await;
    let invitees = [
        t.user("a@x.com").await,
        t.user("b@x.com").await,
    ];
    let created = t.create_team(&event, &leader, &[&invitees[0], &invitees[1]]).await;

    // a third invitation competes for the same two seats
    let c = t.user("c@x.com").await;
    let extra = t
        .app
        .services
        .repos
        .invitations
        .create(created.team.id, event.id, leader.id, &c.email, None)
        .await
        .unwrap();

    let mut handles = Vec::new();
    let requests = [
        response(invitation_for(&created, &invitees[0]).id, &invitees[0], InvitationDecision::Accept),
        response(invitation_for(&created, &invitees[1]).id, &invitees[1], InvitationDecision::Accept),
        response(extra, &c, InvitationDecision::Accept),
    ];
    for request in requests {
        let engine = t.app.services.formation.clone();
        handles.push(tokio::spawn(async move {
            with_retry(|| engine.respond_to_invitation(request.clone())).await
        }));
    }

    let mut accepted = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) if e.conflict_kind() == Some(ConflictKind::TeamFull) => full += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!((accepted, full), (2, 1));

    let team = t
        .app
        .services
        .repos
        .teams
        .get_by_id(created.team.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(team.member_count(), 3);
    assert!(team.member_count() as u32 <= team.max_size);

    let accepted_invitations = t
        .app
        .services
        .repos
        .invitations
        .list_by_team(team.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|i| i.status == InvitationState::Accepted)
        .count();
    assert_eq!(accepted_invitations, 2);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_accept_racing_disband_leaves_no_dangling_membership() {
    let t = TestApp::new();
    let event = t.event(2, 4).await;
    let leader = t.user("leader@x.com").await;
    let a = t.user("a@x.com").await;
    let created = t.create_team(&event, &leader, &[&a]).await;
    let team_id = created.team.id;

    let accept = {
        let engine = t.app.services.formation.clone();
        let request = response(invitation_for(&created, &a).id, &a, InvitationDecision::Accept);
        tokio::spawn(async move {
            with_retry(|| engine.respond_to_invitation(request.clone())).await
        })
    };
    let disband = {
        let engine = t.app.services.formation.clone();
        let leader_id = leader.id;
        tokio::spawn(async move {
            with_retry(|| engine.leave_or_disband_team(team_id, leader_id)).await
        })
    };

    let accept = accept.await.unwrap();
    let disband = disband.await.unwrap().unwrap();
    assert!(matches!(disband, LeaveOutcome::Disbanded { .. }));

    match accept {
        Ok(_) => {}
        Err(Error::Conflict(ConflictKind::AlreadyProcessed, _)) | Err(Error::NotFound(_)) => {}
        Err(e) => panic!("unexpected error: {}", e),
    }

    assert!(t
        .app
        .services
        .repos
        .teams
        .get_by_id(team_id)
        .await
        .unwrap()
        .is_none());
    for user in [&leader, &a] {
        assert!(!t.reload_user(user).await.teams.contains(&team_id));
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_accepts_committing_together_leave_one_already_processed() {
    let (t, store) = rendezvous_app();
    let event = t.event(2, 4).await;
    let leader = t.user("leader@x.com").await;
    let a = t.user("a@x.com").await;
    let created = t.create_team(&event, &leader, &[&a]).await;
    let invitation_id = invitation_for(&created, &a).id;

    store.arm(2);
    let mut handles = Vec::new();
    for _ in 0..2 {
        let engine = t.app.services.formation.clone();
        let request = response(invitation_id, &a, InvitationDecision::Accept);
        handles.push(tokio::spawn(async move {
            engine.respond_to_invitation(request).await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(ResponseOutcome::Accepted { .. }) => accepted += 1,
            Ok(other) => panic!("unexpected outcome: {:?}", other),
            Err(e) => {
                assert_eq!(e.conflict_kind(), Some(ConflictKind::AlreadyProcessed));
                assert_eq!(e.error_code(), "CONFLICT");
                assert!(!e.is_retryable());
            }
        }
    }
    assert_eq!(accepted, 1);

    let team = t
        .app
        .services
        .repos
        .teams
        .get_by_id(created.team.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(team.members(), &[leader.id, a.id]);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_accept_and_decline_committing_together_settle_once() {
    let (t, store) = rendezvous_app();
    let event = t.event(2, 4).await;
    let leader = t.user("leader@x.com").await;
    let a = t.user("a@x.com").await;
    let created = t.create_team(&event, &leader, &[&a]).await;
    let invitation_id = invitation_for(&created, &a).id;

    store.arm(2);
    let accept = {
        let engine = t.app.services.formation.clone();
        let request = response(invitation_id, &a, InvitationDecision::Accept);
        tokio::spawn(async move { engine.respond_to_invitation(request).await })
    };
    let decline = {
        let engine = t.app.services.formation.clone();
        let request = response(invitation_id, &a, InvitationDecision::Decline);
        tokio::spawn(async move { engine.respond_to_invitation(request).await })
    };
    let accept = accept.await.unwrap();
    let decline = decline.await.unwrap();

    let expected = match (&accept, &decline) {
        (Ok(_), Err(e)) => {
            assert_eq!(e.conflict_kind(), Some(ConflictKind::AlreadyProcessed));
            InvitationState::Accepted
        }
        (Err(e), Ok(_)) => {
            assert_eq!(e.conflict_kind(), Some(ConflictKind::AlreadyProcessed));
            InvitationState::Declined
        }
        _ => panic!(
            "expected exactly one resolution, got {:?} and {:?}",
            accept.as_ref().map(|_| ()),
            decline.as_ref().map(|_| ())
        ),
    };

    let invitation = t
        .app
        .services
        .repos
        .invitations
        .get_by_id(invitation_id)
        .await
        .unwrap();
    assert_eq!(invitation.status, expected);
    let on_team = t.reload_user(&a).await.teams.contains(&created.team.id);
    assert_eq!(on_team, expected == InvitationState::Accepted);
}
