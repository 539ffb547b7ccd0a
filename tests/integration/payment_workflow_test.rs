//! Payment Workflow Integration Tests
//!
//! Individual and team registrations through payment confirmation, and the
//! membership lock that follows.

mod common;

use enlist_common::ConflictKind;
use enlist_email::EmailKind;
use enlist_teams::{Event, InvitationDecision, RegistrationState};
use rust_decimal::Decimal;

use crate::common::{invitation_for, response, TestApp};

#[test_log::test(tokio::test)]
async fn test_paid_team_locks_membership() {
    let t = TestApp::new();
    let event = t.event(2, 4).await;
    let leader = t.user("leader@x.com").await;
    let a = t.user("a@x.com").await;

    let created = t.create_team(&event, &leader, &[&a]).await;
    t.app
        .services
        .formation
        .respond_to_invitation(response(
            invitation_for(&created, &a).id,
            &a,
            InvitationDecision::Accept,
        ))
        .await
        .unwrap();

    let payments = &t.app.services.payments;
    let payment = payments
        .initiate(leader.id, event.id, created.registration.id, Decimal::new(4000, 2))
        .await
        .unwrap();
    payments
        .confirm(payment.id, created.registration.id)
        .await
        .unwrap();
    assert!(payments.has_completed_payment(created.team.id).await.unwrap());

    for requester in [&leader, &a] {
        let err = t
            .app
            .services
            .formation
            .leave_or_disband_team(created.team.id, requester.id)
            .await
            .unwrap_err();
        assert_eq!(err.conflict_kind(), Some(ConflictKind::PaymentLocked));
    }

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
    for user in [&leader, &a] {
        assert!(t.reload_user(user).await.registered_events.contains(&event.id));
    }

    let receipts = t.email.emails_of_kind(EmailKind::PaymentConfirmed);
    assert_eq!(receipts.len(), 1);
    assert!(receipts[0].message.body_text.contains("40.00"));
}

#[test_log::test(tokio::test)]
async fn test_individual_registration_through_payment() {
    let t = TestApp::new();
    let keynote = Event::individual("Keynote");
    t.app.services.repos.events.create(&keynote).await.unwrap();
    let ada = t.user("ada@x.com").await;

    let registration = t
        .app
        .services
        .registrations
        .register_individual(keynote.id, ada.id)
        .await
        .unwrap();
    assert_eq!(t.email.emails_of_kind(EmailKind::RegistrationReceived).len(), 1);

    let open = t
        .app
        .services
        .registrations
        .list_for_user(ada.id, Some(RegistrationState::Incomplete))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);

    let payment = t
        .app
        .services
        .payments
        .initiate(ada.id, keynote.id, registration.id, Decimal::new(1000, 2))
        .await
        .unwrap();
    let completed = t
        .app
        .services
        .payments
        .confirm(payment.id, registration.id)
        .await
        .unwrap();
    assert!(completed.is_completed());

    // completing again changes nothing
    let again = t
        .app
        .services
        .repos
        .registrations
        .mark_completed(registration.id)
        .await
        .unwrap();
    assert_eq!(again, completed);

    let done = t
        .app
        .services
        .registrations
        .list_for_user(ada.id, Some(RegistrationState::Completed))
        .await
        .unwrap();
    assert_eq!(done.len(), 1);
    assert!(t.reload_user(&ada).await.registered_events.contains(&keynote.id));
}
