//! Transactional free functions for the registration workflow
//!
//! Every function reads and writes through the caller's `Transaction`, so a
//! whole operation commits or aborts as one unit. Reads made here join the
//! transaction's read set and are re-validated at commit.

use enlist_common::{ConflictKind, Error, Result};
use enlist_store::{Filter, Transaction};
use uuid::Uuid;

use crate::domain::entities::{
    Event, Invitation, InvitationState, Payment, Registration, Team, User,
};

// ============================================================================
// Users
// ============================================================================

pub async fn get_user_tx(transaction: &mut Transaction, user_id: Uuid) -> Result<User> {
    transaction
        .get::<User>(user_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {} not found", user_id)))
}

/// Read-modify-write one user inside the transaction.
pub async fn update_user_tx<F>(
    transaction: &mut Transaction,
    user_id: Uuid,
    apply: F,
) -> Result<User>
where
    F: FnOnce(&mut User),
{
    let mut user = get_user_tx(transaction, user_id).await?;
    apply(&mut user);
    user.touch();
    transaction.set(&user)?;
    Ok(user)
}

pub async fn add_team_tx(
    transaction: &mut Transaction,
    user_id: Uuid,
    team_id: Uuid,
) -> Result<User> {
    update_user_tx(transaction, user_id, |user| {
        user.teams.insert(team_id);
    })
    .await
}

pub async fn remove_team_tx(
    transaction: &mut Transaction,
    user_id: Uuid,
    team_id: Uuid,
) -> Result<User> {
    update_user_tx(transaction, user_id, |user| {
        user.teams.remove(&team_id);
    })
    .await
}

pub async fn remove_registered_event_tx(
    transaction: &mut Transaction,
    user_id: Uuid,
    event_id: Uuid,
) -> Result<User> {
    update_user_tx(transaction, user_id, |user| {
        user.registered_events.remove(&event_id);
    })
    .await
}

// ============================================================================
// Events
// ============================================================================

pub async fn get_event_tx(transaction: &mut Transaction, event_id: Uuid) -> Result<Event> {
    transaction
        .get::<Event>(event_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Event {} not found", event_id)))
}

// ============================================================================
// Teams
// ============================================================================

pub async fn get_team_tx(transaction: &mut Transaction, team_id: Uuid) -> Result<Team> {
    transaction
        .get::<Team>(team_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("TeamNotFound: team {} does not exist", team_id)))
}

/// Write a team after checking its membership invariants.
pub fn put_team_tx(transaction: &mut Transaction, team: &Team) -> Result<()> {
    team.validate()?;
    transaction.set(team)?;
    Ok(())
}

pub fn delete_team_tx(transaction: &mut Transaction, team_id: Uuid) {
    transaction.delete::<Team>(team_id);
}

// ============================================================================
// Invitations
// ============================================================================

/// Store a new invitation, rejecting a second pending one for the same (team, email).
pub async fn create_invitation_tx(
    transaction: &mut Transaction,
    invitation: &Invitation,
) -> Result<()> {
    let open: Vec<Invitation> = transaction
        .query(
            &Filter::new()
                .eq("team_id", invitation.team_id.to_string())
                .eq("to_email", invitation.to_email.clone())
                .eq("status", InvitationState::Pending.to_string()),
        )
        .await?;

    if open.iter().any(|existing| existing.id != invitation.id) {
        return Err(Error::conflict(
            ConflictKind::DuplicateInvitation,
            format!("{} already has a pending invitation to this team", invitation.to_email),
        ));
    }

    transaction.set(invitation)?;
    Ok(())
}

pub async fn get_invitation_tx(
    transaction: &mut Transaction,
    invitation_id: Uuid,
) -> Result<Invitation> {
    transaction
        .get::<Invitation>(invitation_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Invitation {} not found", invitation_id)))
}

/// Load an invitation that must still be pending.
///
/// The status check happens inside the caller's transaction, so two
/// concurrent resolutions cannot both observe `pending` and commit.
pub async fn get_pending_invitation_tx(
    transaction: &mut Transaction,
    invitation_id: Uuid,
) -> Result<Invitation> {
    let invitation = get_invitation_tx(transaction, invitation_id).await?;
    if !invitation.is_pending() {
        return Err(Error::conflict(
            ConflictKind::AlreadyProcessed,
            format!("Invitation has already been {}", invitation.status),
        ));
    }
    Ok(invitation)
}

pub fn put_invitation_tx(transaction: &mut Transaction, invitation: &Invitation) -> Result<()> {
    transaction.set(invitation)?;
    Ok(())
}

pub async fn list_invitations_for_team_tx(
    transaction: &mut Transaction,
    team_id: Uuid,
) -> Result<Vec<Invitation>> {
    Ok(transaction
        .query(&Filter::new().eq("team_id", team_id.to_string()))
        .await?)
}

/// Cancel every pending or accepted invitation of a team.
///
/// Returns each cancelled invitation with the state it had before.
pub async fn cancel_open_invitations_tx(
    transaction: &mut Transaction,
    team_id: Uuid,
) -> Result<Vec<(InvitationState, Invitation)>> {
    let mut cancelled = Vec::new();
    for mut invitation in list_invitations_for_team_tx(transaction, team_id).await? {
        let previous = invitation.state();
        if previous.is_terminal() {
            continue;
        }
        invitation.cancel()?;
        put_invitation_tx(transaction, &invitation)?;
        cancelled.push((previous, invitation));
    }
    Ok(cancelled)
}

// ============================================================================
// Registrations
// ============================================================================

/// Store a new registration, enforcing one per team and one per
/// (individual registrant, event).
pub async fn create_registration_tx(
    transaction: &mut Transaction,
    registration: &Registration,
) -> Result<()> {
    let filter = match registration.team_id {
        Some(team_id) if registration.team_linked => {
            Filter::new().eq("team_id", team_id.to_string())
        }
        _ => Filter::new()
            .eq("registrant_id", registration.registrant_id.to_string())
            .eq("event_id", registration.event_id.to_string())
            .eq("team_linked", false),
    };

    let existing: Vec<Registration> = transaction.query(&filter).await?;
    if !existing.is_empty() {
        return Err(Error::conflict(
            ConflictKind::AlreadyExists,
            "A registration for this event already exists",
        ));
    }

    transaction.set(registration)?;
    Ok(())
}

pub async fn get_registration_tx(
    transaction: &mut Transaction,
    registration_id: Uuid,
) -> Result<Registration> {
    transaction
        .get::<Registration>(registration_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Registration {} not found", registration_id)))
}

pub async fn find_registrations_by_team_tx(
    transaction: &mut Transaction,
    team_id: Uuid,
) -> Result<Vec<Registration>> {
    Ok(transaction
        .query(&Filter::new().eq("team_id", team_id.to_string()))
        .await?)
}

/// The single registration linked to a team
pub async fn get_team_registration_tx(
    transaction: &mut Transaction,
    team_id: Uuid,
) -> Result<Registration> {
    find_registrations_by_team_tx(transaction, team_id)
        .await?
        .into_iter()
        .find(|r| r.team_linked)
        .ok_or_else(|| Error::Internal(format!("Team {} has no registration", team_id)))
}

/// Whether any registration of the team carries a payment reference
pub async fn team_has_payment_tx(transaction: &mut Transaction, team_id: Uuid) -> Result<bool> {
    let paid: Vec<Registration> = transaction
        .query(
            &Filter::new()
                .eq("team_id", team_id.to_string())
                .not_null("payment_id"),
        )
        .await?;
    Ok(!paid.is_empty())
}

pub fn put_registration_tx(
    transaction: &mut Transaction,
    registration: &Registration,
) -> Result<()> {
    transaction.set(registration)?;
    Ok(())
}

pub fn delete_registration_tx(transaction: &mut Transaction, registration_id: Uuid) {
    transaction.delete::<Registration>(registration_id);
}

// ============================================================================
// Payments
// ============================================================================

pub async fn get_payment_tx(transaction: &mut Transaction, payment_id: Uuid) -> Result<Payment> {
    transaction
        .get::<Payment>(payment_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Payment {} not found", payment_id)))
}

pub fn put_payment_tx(transaction: &mut Transaction, payment: &Payment) -> Result<()> {
    transaction.set(payment)?;
    Ok(())
}
