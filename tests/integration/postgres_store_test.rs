//! Postgres Store Integration Tests
//!
//! Runs the formation workflow against the Postgres backend. Needs a
//! reachable database: set `TEST_DATABASE_URL` (or `DATABASE_URL`) and run
//! with `cargo test -- --ignored`.

mod common;

use std::sync::Arc;

use enlist_common::ConflictKind;
use enlist_store::{PgDocumentStore, Store};
use enlist_teams::{InvitationDecision, RegistrationState};

use crate::common::{invitation_for, response, TestApp, TestConfig};

async fn postgres_app() -> TestApp {
    let config = TestConfig::from_env();
    let backend = PgDocumentStore::connect(&config.database_url, 5)
        .await
        .expect("test database reachable");
    backend.migrate().await.expect("migrations applied");
    TestApp::with_store(Store::new(Arc::new(backend)))
}

#[test_log::test(tokio::test)]
#[ignore = "requires a Postgres database"]
async fn test_formation_round_trip_on_postgres() {
    let t = postgres_app().await;
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let event = t.event(2, 3).await;
    let leader = t.user(&format!("leader-{}@x.com", suffix)).await;
    let a = t.user(&format!("a-{}@x.com", suffix)).await;

    let created = t.create_team(&event, &leader, &[&a]).await;
    let invitation_id = invitation_for(&created, &a).id;

    let outcome = t
        .app
        .services
        .formation
        .respond_to_invitation(response(invitation_id, &a, InvitationDecision::Accept))
        .await;
    assert!(outcome.is_ok());

    let err = t
        .app
        .services
        .formation
        .respond_to_invitation(response(invitation_id, &a, InvitationDecision::Accept))
        .await
        .unwrap_err();
    assert_eq!(err.conflict_kind(), Some(ConflictKind::AlreadyProcessed));

    let view = t
        .app
        .services
        .formation
        .get_team(created.team.id, a.id)
        .await
        .unwrap();
    assert_eq!(
        view.registration.map(|r| r.status),
        Some(RegistrationState::Completed)
    );

    t.app
        .services
        .formation
        .leave_or_disband_team(created.team.id, leader.id)
        .await
        .unwrap();
    assert!(t
        .app
        .services
        .repos
        .teams
        .get_by_id(created.team.id)
        .await
        .unwrap()
        .is_none());
}
