//! Team formation engine
//!
//! Orchestrates team creation, invitation responses, member departure and
//! disbanding. Every operation validates up front, then performs all of its
//! writes in one store transaction; notices go out only after the commit.

use enlist_common::{ConflictKind, Error, Result};
use enlist_email::InvitationEmail;
use enlist_store::Transaction;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::entities::{
    Invitation, InvitationDecision, InvitationState, Registration, Team,
};
use crate::domain::state::RegistrationEvent;
use crate::domain::validation::{dedupe_emails, validate_team_name};
use crate::notifications::{Notification, Notifier, PostCommit};
use crate::repository::{
    add_team_tx, cancel_open_invitations_tx, create_invitation_tx, create_registration_tx,
    delete_registration_tx, delete_team_tx, find_registrations_by_team_tx, get_event_tx,
    get_pending_invitation_tx, get_team_registration_tx, get_team_tx, get_user_tx,
    list_invitations_for_team_tx, put_invitation_tx, put_registration_tx, put_team_tx,
    team_has_payment_tx, update_user_tx, TeamsRepositories,
};
use crate::services::FormationSettings;

#[derive(Debug, Clone)]
pub struct CreateTeamRequest {
    pub event_id: Uuid,
    pub leader_id: Uuid,
    pub team_name: String,
    pub member_emails: Vec<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TeamCreated {
    pub team: Team,
    pub invitations: Vec<Invitation>,
    pub registration: Registration,
}

#[derive(Debug, Clone)]
pub struct InvitationResponse {
    pub invitation_id: Uuid,
    pub responder_id: Uuid,
    /// Verified email of the responder; must match the invitation
    pub responder_email: String,
    pub decision: InvitationDecision,
}

#[derive(Debug, Clone)]
pub enum ResponseOutcome {
    Accepted {
        invitation: Invitation,
        team: Team,
        registration: Registration,
    },
    Declined {
        invitation: Invitation,
        /// The decline left the team abandoned and it was removed
        team_disbanded: bool,
    },
}

#[derive(Debug, Clone)]
pub enum LeaveOutcome {
    /// The leader left: the team and everything linked to it is gone
    Disbanded {
        team_id: Uuid,
        released_members: Vec<Uuid>,
        cancelled_invitations: usize,
        deleted_registrations: usize,
    },
    /// A member left; the team lives on
    Left { team: Team, registration: Registration },
}

/// Team as shown to its members
#[derive(Debug, Clone)]
pub struct TeamView {
    pub team: Team,
    pub invitations: Vec<Invitation>,
    pub registration: Option<Registration>,
}

#[derive(Clone, Debug)]
pub struct TeamFormationEngine {
    repos: TeamsRepositories,
    notifier: Notifier,
    settings: FormationSettings,
}

fn authorize_invitee(invitation: &Invitation, responder_email: &str) -> Result<()> {
    if !invitation.is_addressed_to(responder_email) {
        return Err(Error::Authorization(
            "This invitation was sent to a different email address".to_string(),
        ));
    }
    Ok(())
}

impl TeamFormationEngine {
    pub fn new(repos: TeamsRepositories, notifier: Notifier, settings: FormationSettings) -> Self {
        Self {
            repos,
            notifier,
            settings,
        }
    }

    /// Create a team led by the requester and invite every listed email.
    #[instrument(skip(self, request), fields(event_id = %request.event_id, leader_id = %request.leader_id))]
    pub async fn create_team_and_invite(&self, request: CreateTeamRequest) -> Result<TeamCreated> {
        self.create_team(request).await.inspect_err(Error::log)
    }

    async fn create_team(&self, request: CreateTeamRequest) -> Result<TeamCreated> {
        let team_name = validate_team_name(&request.team_name, self.settings.team_name_max_length)?;
        let emails = dedupe_emails(&request.member_emails)?;
        if emails.is_empty() {
            return Err(Error::Validation(
                "At least one member email is required".to_string(),
            ));
        }

        let event = self.repos.events.get_by_id(request.event_id).await?;
        if !event.team_eligible {
            return Err(Error::Validation(format!(
                "Event '{}' does not accept team registrations",
                event.name
            )));
        }

        let leader = self.repos.users.get_by_id(request.leader_id).await?;
        if emails.contains(&leader.email) {
            return Err(Error::Validation("You cannot invite yourself".to_string()));
        }

        let team_size = emails.len() + 1;
        if !event.accepts_team_size(team_size) {
            return Err(Error::Validation(format!(
                "Team size {} is outside the allowed range {}-{}",
                team_size, event.min_team_size, event.max_team_size
            )));
        }

        if !self
            .repos
            .teams
            .list_led_by(leader.id, event.id)
            .await?
            .is_empty()
        {
            return Err(Error::conflict(
                ConflictKind::AlreadyExists,
                "You already lead a team for this event",
            ));
        }

        let invitees = self.repos.users.get_many_by_email(&emails).await?;
        let missing: Vec<&str> = emails
            .iter()
            .filter(|email| !invitees.contains_key(*email))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "No registered user for: {}",
                missing.join(", ")
            )));
        }

        let mut tx = self.repos.begin();
        let leader = get_user_tx(&mut tx, leader.id).await?;
        let mut team = Team::new(&event, leader.id, team_name);
        let registration = Registration::team_linked(event.id, team.id, leader.id);

        let mut notices = PostCommit::new();
        let mut invitations = Vec::with_capacity(emails.len());
        for email in &emails {
            let invitee = invitees
                .get(email)
                .ok_or_else(|| Error::Internal(format!("Lost lookup result for {}", email)))?;
            let invitation =
                Invitation::new(&team, &event, &leader, email, request.message.as_deref())?;
            create_invitation_tx(&mut tx, &invitation).await?;
            team.invitation_ids.insert(invitation.id);

            notices.push(Notification::Invitation(InvitationEmail {
                recipient_email: invitation.to_email.clone(),
                recipient_name: invitee.name.clone(),
                inviter_name: leader.name.clone(),
                team_name: team.name.clone(),
                event_name: event.name.clone(),
                message: invitation.message.clone(),
                team_id: team.id,
                invitation_id: invitation.id,
            }));
            invitations.push(invitation);
        }

        put_team_tx(&mut tx, &team)?;
        create_registration_tx(&mut tx, &registration).await?;
        update_user_tx(&mut tx, leader.id, |user| {
            user.teams.insert(team.id);
            user.registrations.insert(registration.id);
        })
        .await?;

        tx.commit().await?;
        tracing::info!(
            team_id = %team.id,
            invitations = invitations.len(),
            "Team created"
        );

        self.notifier.dispatch(notices).await;

        Ok(TeamCreated {
            team,
            invitations,
            registration,
        })
    }

    /// Accept or decline a pending invitation on behalf of its addressee.
    #[instrument(skip(self, response), fields(invitation_id = %response.invitation_id, responder_id = %response.responder_id, decision = ?response.decision))]
    pub async fn respond_to_invitation(
        &self,
        response: InvitationResponse,
    ) -> Result<ResponseOutcome> {
        let result = match response.decision {
            InvitationDecision::Accept => self.accept_invitation(&response).await,
            InvitationDecision::Decline => self.decline_invitation(&response).await,
        };
        result.inspect_err(Error::log)
    }

    async fn accept_invitation(&self, response: &InvitationResponse) -> Result<ResponseOutcome> {
        let mut tx = self.repos.begin();

        // pending is re-checked inside the transaction that resolves it
        let mut invitation = get_pending_invitation_tx(&mut tx, response.invitation_id).await?;
        authorize_invitee(&invitation, &response.responder_email)?;

        let mut team = get_team_tx(&mut tx, invitation.team_id).await?;
        team.add_member(response.responder_id)?;
        invitation.accept(response.responder_id)?;

        let mut registration = get_team_registration_tx(&mut tx, team.id).await?;
        registration.member_count = team.member_count() as u32;
        if team.has_min_members() {
            registration.mark_completed(RegistrationEvent::TeamFormed)?;
        }

        put_invitation_tx(&mut tx, &invitation)?;
        put_team_tx(&mut tx, &team)?;
        put_registration_tx(&mut tx, &registration)?;
        add_team_tx(&mut tx, response.responder_id, team.id).await?;

        self.repos
            .invitations
            .commit_resolution(tx, response.invitation_id)
            .await?;
        tracing::info!(
            team_id = %team.id,
            members = team.member_count(),
            registration_status = %registration.status,
            "Invitation accepted"
        );

        Ok(ResponseOutcome::Accepted {
            invitation,
            team,
            registration,
        })
    }

    async fn decline_invitation(&self, response: &InvitationResponse) -> Result<ResponseOutcome> {
        let mut tx = self.repos.begin();
        let mut invitation = get_pending_invitation_tx(&mut tx, response.invitation_id).await?;
        authorize_invitee(&invitation, &response.responder_email)?;
        invitation.decline(response.responder_id)?;
        put_invitation_tx(&mut tx, &invitation)?;
        self.repos
            .invitations
            .commit_resolution(tx, response.invitation_id)
            .await?;
        tracing::info!(team_id = %invitation.team_id, "Invitation declined");

        let team_disbanded = self.cleanup_after_decline(invitation.team_id).await;

        Ok(ResponseOutcome::Declined {
            invitation,
            team_disbanded,
        })
    }

    /// Best-effort removal of a team abandoned by every invitee.
    ///
    /// The decline itself is already committed; failures here are logged.
    async fn cleanup_after_decline(&self, team_id: Uuid) -> bool {
        let attempts = self.settings.cleanup_retries.max(1);
        for attempt in 1..=attempts {
            match self.disband_if_abandoned(team_id).await {
                Ok(disbanded) => return disbanded,
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::debug!(%team_id, attempt, "Retrying team cleanup after conflict");
                }
                Err(e) => {
                    tracing::warn!(%team_id, attempt, error = %e, "Team cleanup after decline failed");
                    return false;
                }
            }
        }
        false
    }

    async fn disband_if_abandoned(&self, team_id: Uuid) -> Result<bool> {
        let mut tx = self.repos.begin();

        let Some(team) = tx.get::<Team>(team_id).await? else {
            return Ok(false);
        };
        let invitations = list_invitations_for_team_tx(&mut tx, team_id).await?;
        let still_open = invitations.iter().any(|i| {
            matches!(
                i.state(),
                InvitationState::Pending | InvitationState::Accepted
            )
        });
        if still_open || team.member_count() != 1 {
            return Ok(false);
        }
        if team_has_payment_tx(&mut tx, team_id).await? {
            tracing::debug!(%team_id, "Abandoned team has a payment; keeping it");
            return Ok(false);
        }

        let registrations = find_registrations_by_team_tx(&mut tx, team_id).await?;
        for registration in &registrations {
            delete_registration_tx(&mut tx, registration.id);
        }
        delete_team_tx(&mut tx, team_id);
        let leader = update_user_tx(&mut tx, team.leader_id, |user| {
            user.teams.remove(&team_id);
            for registration in &registrations {
                user.registrations.remove(&registration.id);
            }
        })
        .await?;

        tx.commit().await?;
        tracing::info!(%team_id, "Team disbanded after every invitation was declined");

        let mut notices = PostCommit::new();
        notices.push(Notification::TeamDisbanded {
            recipient_email: leader.email,
            team_name: team.name,
            event_name: invitations
                .first()
                .map(|i| i.event_name.clone())
                .unwrap_or_default(),
            team_id,
        });
        self.notifier.dispatch(notices).await;

        Ok(true)
    }

    /// Leader disbands the team; any other member leaves it.
    #[instrument(skip(self))]
    pub async fn leave_or_disband_team(
        &self,
        team_id: Uuid,
        requester_id: Uuid,
    ) -> Result<LeaveOutcome> {
        self.leave_or_disband(team_id, requester_id)
            .await
            .inspect_err(Error::log)
    }

    async fn leave_or_disband(&self, team_id: Uuid, requester_id: Uuid) -> Result<LeaveOutcome> {
        let mut tx = self.repos.begin();

        let team = get_team_tx(&mut tx, team_id).await?;
        if !team.is_member(requester_id) {
            return Err(Error::Authorization(
                "NotAMember: you are not a member of this team".to_string(),
            ));
        }
        // an empty payment query records nothing; a concurrent attach still
        // aborts this commit because it rewrites the team and its registration
        if team.payment_complete || team_has_payment_tx(&mut tx, team_id).await? {
            return Err(Error::conflict(
                ConflictKind::PaymentLocked,
                "Team registration has a payment attached; membership is locked",
            ));
        }

        if team.is_leader(requester_id) {
            self.disband(tx, team).await
        } else {
            self.leave(tx, team, requester_id).await
        }
    }

    async fn disband(&self, mut tx: Transaction, team: Team) -> Result<LeaveOutcome> {
        let event = get_event_tx(&mut tx, team.event_id).await?;
        let registrations = find_registrations_by_team_tx(&mut tx, team.id).await?;
        let mut notices = PostCommit::new();

        for member_id in team.members() {
            let member = update_user_tx(&mut tx, *member_id, |user| {
                user.teams.remove(&team.id);
                user.registered_events.remove(&team.event_id);
                for registration in &registrations {
                    user.registrations.remove(&registration.id);
                }
            })
            .await?;
            if !team.is_leader(*member_id) {
                notices.push(Notification::TeamDisbanded {
                    recipient_email: member.email,
                    team_name: team.name.clone(),
                    event_name: event.name.clone(),
                    team_id: team.id,
                });
            }
        }

        for registration in &registrations {
            delete_registration_tx(&mut tx, registration.id);
        }

        let cancelled = cancel_open_invitations_tx(&mut tx, team.id).await?;
        for (previous, invitation) in &cancelled {
            if *previous == InvitationState::Pending {
                notices.push(Notification::TeamDisbanded {
                    recipient_email: invitation.to_email.clone(),
                    team_name: team.name.clone(),
                    event_name: event.name.clone(),
                    team_id: team.id,
                });
            }
        }

        delete_team_tx(&mut tx, team.id);
        tx.commit().await?;
        tracing::info!(
            team_id = %team.id,
            members = team.member_count(),
            cancelled_invitations = cancelled.len(),
            "Team disbanded by its leader"
        );

        self.notifier.dispatch(notices).await;

        Ok(LeaveOutcome::Disbanded {
            team_id: team.id,
            released_members: team.members().to_vec(),
            cancelled_invitations: cancelled.len(),
            deleted_registrations: registrations.len(),
        })
    }

    async fn leave(
        &self,
        mut tx: Transaction,
        mut team: Team,
        member_id: Uuid,
    ) -> Result<LeaveOutcome> {
        team.remove_member(member_id)?;

        // completed stays completed even if the team drops below its minimum
        let mut registration = get_team_registration_tx(&mut tx, team.id).await?;
        registration.member_count = team.member_count() as u32;

        put_team_tx(&mut tx, &team)?;
        put_registration_tx(&mut tx, &registration)?;
        update_user_tx(&mut tx, member_id, |user| {
            user.teams.remove(&team.id);
            user.registered_events.remove(&team.event_id);
        })
        .await?;

        tx.commit().await?;
        tracing::info!(
            team_id = %team.id,
            %member_id,
            members = team.member_count(),
            "Member left team"
        );

        Ok(LeaveOutcome::Left { team, registration })
    }

    /// Team details, visible to its members only.
    #[instrument(skip(self))]
    pub async fn get_team(&self, team_id: Uuid, requester_id: Uuid) -> Result<TeamView> {
        let team = self
            .repos
            .teams
            .get_by_id(team_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("TeamNotFound: team {} does not exist", team_id)))?;

        if !team.is_member(requester_id) {
            return Err(Error::Authorization(
                "Access denied: not a member of this team".to_string(),
            ));
        }

        let invitations = self.repos.invitations.list_by_team(team_id).await?;
        let registration = self
            .repos
            .registrations
            .find_by_team(team_id)
            .await?
            .into_iter()
            .find(|r| r.team_linked);

        Ok(TeamView {
            team,
            invitations,
            registration,
        })
    }

    /// Rename a team; leader only. Membership is left untouched.
    #[instrument(skip(self, new_name))]
    pub async fn rename_team(
        &self,
        team_id: Uuid,
        requester_id: Uuid,
        new_name: &str,
    ) -> Result<Team> {
        self.rename(team_id, requester_id, new_name)
            .await
            .inspect_err(Error::log)
    }

    async fn rename(&self, team_id: Uuid, requester_id: Uuid, new_name: &str) -> Result<Team> {
        let name = validate_team_name(new_name, self.settings.team_name_max_length)?;

        let mut tx = self.repos.begin();
        let mut team = get_team_tx(&mut tx, team_id).await?;
        if !team.is_leader(requester_id) {
            return Err(Error::Authorization(
                "Only the team leader can rename the team".to_string(),
            ));
        }
        if team.name == name {
            return Ok(team);
        }

        team.name = name;
        team.touch();
        put_team_tx(&mut tx, &team)?;
        tx.commit().await?;
        tracing::info!(team_id = %team.id, name = %team.name, "Team renamed");
        Ok(team)
    }
}
