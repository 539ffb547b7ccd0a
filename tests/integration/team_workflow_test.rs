//! Team Workflow Integration Tests
//!
//! Drives the formation engine end to end through the composed application:
//! team creation, invitation responses, departures and disbanding, checking
//! the stored documents and the captured emails after each step.

mod common;

use enlist_common::ConflictKind;
use enlist_email::EmailKind;
use enlist_teams::{
    InvitationDecision, InvitationState, LeaveOutcome, RegistrationState, ResponseOutcome,
};

use crate::common::{invitation_for, response, TestApp};

#[test_log::test(tokio::test)]
async fn test_team_reaches_min_size_and_never_regresses() {
    let t = TestApp::new();
    let event = t.event(2, 4).await;
    let leader = t.user("leader@x.com").await;
    let a = t.user("a@x.com").await;
    let b = t.user("b@x.com").await;

    let created = t.create_team(&event, &leader, &[&a, &b]).await;
    assert_eq!(created.team.member_count(), 1);
    assert_eq!(created.invitations.len(), 2);
    assert!(created
        .invitations
        .iter()
        .all(|i| i.status == InvitationState::Pending));
    assert_eq!(created.registration.status, RegistrationState::Incomplete);

    // invitees learn the invitation id from the email they received
    let a_invitation = t.invitation_id_for(&a);
    let outcome = t
        .app
        .services
        .formation
        .respond_to_invitation(response(a_invitation, &a, InvitationDecision::Accept))
        .await
        .unwrap();
    let ResponseOutcome::Accepted { team, registration, .. } = outcome else {
        panic!("expected acceptance");
    };
    assert_eq!(team.member_count(), 2);
    assert_eq!(registration.status, RegistrationState::Completed);

    let b_invitation = t.invitation_id_for(&b);
    t.app
        .services
        .formation
        .respond_to_invitation(response(b_invitation, &b, InvitationDecision::Accept))
        .await
        .unwrap();

    let view = t
        .app
        .services
        .formation
        .get_team(created.team.id, b.id)
        .await
        .unwrap();
    assert_eq!(view.team.members(), &[leader.id, a.id, b.id]);
    let registration = view.registration.unwrap();
    assert_eq!(registration.status, RegistrationState::Completed);
    assert_eq!(registration.member_count, 3);

    for user in [&a, &b] {
        assert!(t.reload_user(user).await.teams.contains(&created.team.id));
    }
}

#[test_log::test(tokio::test)]
async fn test_every_invitee_declines_and_team_disappears() {
    let t = TestApp::new();
    let event = t.event(2, 4).await;
    let leader = t.user("leader@x.com").await;
    let a = t.user("a@x.com").await;
    let b = t.user("b@x.com").await;

    let created = t.create_team(&event, &leader, &[&a, &b]).await;

    for user in [&a, &b] {
        t.app
            .services
            .formation
            .respond_to_invitation(response(
                invitation_for(&created, user).id,
                user,
                InvitationDecision::Decline,
            ))
            .await
            .unwrap();
    }

    assert!(t
        .app
        .services
        .repos
        .teams
        .get_by_id(created.team.id)
        .await
        .unwrap()
        .is_none());
    let leader = t.reload_user(&leader).await;
    assert!(!leader.teams.contains(&created.team.id));
    assert!(!leader.registrations.contains(&created.registration.id));

    let invitations = t
        .app
        .services
        .repos
        .invitations
        .list_by_team(created.team.id)
        .await
        .unwrap();
    assert!(invitations
        .iter()
        .all(|i| i.status == InvitationState::Declined));
    assert_eq!(t.email.emails_of_kind(EmailKind::TeamDisbanded).len(), 1);

    // the leader is free to start over
    let again = t.create_team(&event, &leader, &[&a]).await;
    assert_ne!(again.team.id, created.team.id);
}

#[test_log::test(tokio::test)]
async fn test_invitation_resolves_exactly_once() {
    let t = TestApp::new();
    let event = t.event(2, 4).await;
    let leader = t.user("leader@x.com").await;
    let a = t.user("a@x.com").await;

    let created = t.create_team(&event, &leader, &[&a]).await;
    let invitation_id = invitation_for(&created, &a).id;

    t.app
        .services
        .formation
        .respond_to_invitation(response(invitation_id, &a, InvitationDecision::Decline))
        .await
        .unwrap();

    let err = t
        .app
        .services
        .formation
        .respond_to_invitation(response(invitation_id, &a, InvitationDecision::Accept))
        .await
        .unwrap_err();
    assert_eq!(err.conflict_kind(), Some(ConflictKind::AlreadyProcessed));
    assert_eq!(err.error_code(), "CONFLICT");
}

#[test_log::test(tokio::test)]
async fn test_full_team_rejects_extra_acceptance() {
    let t = TestApp::new();
    let event = t.event(2, 2).await;
    let leader = t.user("leader@x.com").await;
    let a = t.user("a@x.com").await;
    let b = t.user("b@x.com").await;

    let created = t.create_team(&event, &leader, &[&a]).await;
    let late = t
        .app
        .services
        .repos
        .invitations
        .create(created.team.id, event.id, leader.id, &b.email, Some("One more?"))
        .await
        .unwrap();

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

    let err = t
        .app
        .services
        .formation
        .respond_to_invitation(response(late, &b, InvitationDecision::Accept))
        .await
        .unwrap_err();
    assert_eq!(err.conflict_kind(), Some(ConflictKind::TeamFull));

    let team = t
        .app
        .services
        .repos
        .teams
        .get_by_id(created.team.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(team.member_count(), 2);
    assert!(!t.reload_user(&b).await.teams.contains(&team.id));
}

#[test_log::test(tokio::test)]
async fn test_leader_disband_cascades_and_notifies() {
    let t = TestApp::new();
    let event = t.event(2, 4).await;
    let leader = t.user("leader@x.com").await;
    let a = t.user("a@x.com").await;
    let b = t.user("b@x.com").await;

    let created = t.create_team(&event, &leader, &[&a, &b]).await;
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

    let outcome = t
        .app
        .services
        .formation
        .leave_or_disband_team(created.team.id, leader.id)
        .await
        .unwrap();
    assert!(matches!(outcome, LeaveOutcome::Disbanded { .. }));

    assert!(t
        .app
        .services
        .repos
        .registrations
        .find_by_team(created.team.id)
        .await
        .unwrap()
        .is_empty());
    let invitations = t
        .app
        .services
        .repos
        .invitations
        .list_by_team(created.team.id)
        .await
        .unwrap();
    assert!(invitations
        .iter()
        .all(|i| i.status == InvitationState::Cancelled));

    for user in [&leader, &a] {
        let user = t.reload_user(user).await;
        assert!(user.teams.is_empty());
        assert!(!user.registered_events.contains(&event.id));
    }

    let notified: Vec<String> = t
        .email
        .emails_of_kind(EmailKind::TeamDisbanded)
        .into_iter()
        .map(|e| e.message.to)
        .collect();
    assert_eq!(notified.len(), 2);
    assert!(notified.contains(&a.email));
    assert!(notified.contains(&b.email));

    // cancelled invitations can no longer be answered
    let err = t
        .app
        .services
        .formation
        .respond_to_invitation(response(
            invitation_for(&created, &b).id,
            &b,
            InvitationDecision::Accept,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.conflict_kind(), Some(ConflictKind::AlreadyProcessed));
}

#[test_log::test(tokio::test)]
async fn test_member_leaves_team_that_survives() {
    let t = TestApp::new();
    let event = t.event(2, 4).await;
    let leader = t.user("leader@x.com").await;
    let a = t.user("a@x.com").await;
    let b = t.user("b@x.com").await;

    let created = t.create_team(&event, &leader, &[&a, &b]).await;
    for user in [&a, &b] {
        t.app
            .services
            .formation
            .respond_to_invitation(response(
                invitation_for(&created, user).id,
                user,
                InvitationDecision::Accept,
            ))
            .await
            .unwrap();
    }

    let outcome = t
        .app
        .services
        .formation
        .leave_or_disband_team(created.team.id, b.id)
        .await
        .unwrap();
    let LeaveOutcome::Left { team, registration } = outcome else {
        panic!("expected a member departure");
    };
    assert_eq!(team.members(), &[leader.id, a.id]);
    assert_eq!(registration.member_count, 2);
    assert_eq!(registration.status, RegistrationState::Completed);
    assert!(!t.reload_user(&b).await.teams.contains(&team.id));

    // b can no longer see the team
    assert!(t
        .app
        .services
        .formation
        .get_team(team.id, b.id)
        .await
        .is_err());
}
