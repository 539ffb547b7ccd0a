//! Domain entities for the Enlist registration workflow
//!
//! Every entity is stored as one document; field names are the stored
//! (snake_case) field names used by store filters.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use enlist_common::{ConflictKind, Error, Result};
use enlist_store::Document;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidateEmail;

use crate::domain::state::{
    InvitationEvent, InvitationStateMachine, PaymentEvent, PaymentStateMachine,
    RegistrationEvent, RegistrationStateMachine,
};
pub use crate::domain::state::{InvitationState, PaymentState, RegistrationState};
use crate::domain::validation::normalize_email;

/// Status of a team document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TeamStatus {
    /// Still below its minimum size
    #[default]
    Pending,
    /// Reached its minimum size at least once
    Active,
}

impl std::fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamStatus::Pending => write!(f, "pending"),
            TeamStatus::Active => write!(f, "active"),
        }
    }
}

// ============================================================================
// Event
// ============================================================================

/// Event metadata; read-only for the registration workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub team_eligible: bool,
    pub min_team_size: u32,
    pub max_team_size: u32,
}

impl Event {
    /// An event that accepts teams of `min..=max` people, leader included
    pub fn team(name: &str, min_team_size: u32, max_team_size: u32) -> Result<Self> {
        if min_team_size == 0 || min_team_size > max_team_size {
            return Err(Error::Validation(format!(
                "Invalid team size bounds {}..={}",
                min_team_size, max_team_size
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            team_eligible: true,
            min_team_size,
            max_team_size,
        })
    }

    /// An event open to individual registration only
    pub fn individual(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            team_eligible: false,
            min_team_size: 1,
            max_team_size: 1,
        }
    }

    /// Whether a team of `size` people fits the event bounds
    pub fn accepts_team_size(&self, size: usize) -> bool {
        (self.min_team_size as usize..=self.max_team_size as usize).contains(&size)
    }
}

impl Document for Event {
    const COLLECTION: &'static str = "events";

    fn key(&self) -> Uuid {
        self.id
    }
}

// ============================================================================
// User
// ============================================================================

/// User as seen by the registration workflow
///
/// Only the membership and registration references are written here; the
/// profile itself belongs to the profile service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Stored lowercase
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub teams: BTreeSet<Uuid>,
    #[serde(default)]
    pub registrations: BTreeSet<Uuid>,
    #[serde(default)]
    pub registered_events: BTreeSet<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, name: &str) -> Result<Self> {
        let email = normalize_email(email);
        if !email.validate_email() {
            return Err(Error::Validation("Invalid email format".to_string()));
        }
        let name = name.trim();
        if name.is_empty() || name.len() > 100 {
            return Err(Error::Validation(
                "Name must be 1-100 characters".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            email,
            name: name.to_string(),
            teams: BTreeSet::new(),
            registrations: BTreeSet::new(),
            registered_events: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Document for User {
    const COLLECTION: &'static str = "users";

    fn key(&self) -> Uuid {
        self.id
    }
}

// ============================================================================
// Team
// ============================================================================

/// Team entity
///
/// `members` is an ordered set: the leader is always first and no user
/// appears twice. It is only changed through `add_member`/`remove_member`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub event_id: Uuid,
    pub leader_id: Uuid,
    pub name: String,
    members: Vec<Uuid>,
    pub invitation_ids: BTreeSet<Uuid>,
    pub status: TeamStatus,
    pub payment_complete: bool,
    pub min_size: u32,
    pub max_size: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    /// New team for `event` with the leader as its only member
    pub fn new(event: &Event, leader_id: Uuid, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_id: event.id,
            leader_id,
            name,
            members: vec![leader_id],
            invitation_ids: BTreeSet::new(),
            status: TeamStatus::Pending,
            payment_complete: false,
            min_size: event.min_team_size,
            max_size: event.max_team_size,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn members(&self) -> &[Uuid] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }

    pub fn is_leader(&self, user_id: Uuid) -> bool {
        self.leader_id == user_id
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_size as usize
    }

    pub fn has_min_members(&self) -> bool {
        self.members.len() >= self.min_size as usize
    }

    /// Append a member; rejects a full team before a duplicate member.
    pub fn add_member(&mut self, user_id: Uuid) -> Result<()> {
        if self.is_full() {
            return Err(Error::conflict(
                ConflictKind::TeamFull,
                format!("Team already has {} members", self.max_size),
            ));
        }
        if self.is_member(user_id) {
            return Err(Error::conflict(
                ConflictKind::AlreadyMember,
                "User is already a member of this team",
            ));
        }
        self.members.push(user_id);
        if self.has_min_members() {
            self.status = TeamStatus::Active;
        }
        self.touch();
        Ok(())
    }

    /// Remove a non-leader member; the leader leaves only by disbanding.
    pub fn remove_member(&mut self, user_id: Uuid) -> Result<()> {
        if self.is_leader(user_id) {
            return Err(Error::Validation(
                "The team leader cannot leave; disband the team instead".to_string(),
            ));
        }
        let before = self.members.len();
        self.members.retain(|m| *m != user_id);
        if self.members.len() == before {
            return Err(Error::Authorization(
                "NotAMember: user is not a member of this team".to_string(),
            ));
        }
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Check stored invariants
    pub fn validate(&self) -> Result<()> {
        if self.members.first() != Some(&self.leader_id) {
            return Err(Error::Validation(
                "Team leader must be the first member".to_string(),
            ));
        }
        let unique: BTreeSet<_> = self.members.iter().collect();
        if unique.len() != self.members.len() {
            return Err(Error::Validation("Team has duplicate members".to_string()));
        }
        if self.members.len() > self.max_size as usize {
            return Err(Error::Validation(
                "Team exceeds its maximum size".to_string(),
            ));
        }
        Ok(())
    }
}

impl Document for Team {
    const COLLECTION: &'static str = "teams";

    fn key(&self) -> Uuid {
        self.id
    }
}

// ============================================================================
// Invitation
// ============================================================================

/// Invitee's answer to an invitation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationDecision {
    Accept,
    Decline,
}

/// Offer from a team to one invitee email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    pub team_id: Uuid,
    pub event_id: Uuid,
    pub from_user_id: Uuid,
    pub from_name: String,
    pub team_name: String,
    pub event_name: String,
    /// Stored lowercase
    pub to_email: String,
    pub message: String,
    pub status: InvitationState,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
}

impl Invitation {
    pub fn new(
        team: &Team,
        event: &Event,
        from: &User,
        to_email: &str,
        message: Option<&str>,
    ) -> Result<Self> {
        let to_email = normalize_email(to_email);
        if !to_email.validate_email() {
            return Err(Error::Validation("Invalid email format".to_string()));
        }

        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_invitation_message(&team.name));

        Ok(Self {
            id: Uuid::new_v4(),
            team_id: team.id,
            event_id: event.id,
            from_user_id: from.id,
            from_name: from.name.clone(),
            team_name: team.name.clone(),
            event_name: event.name.clone(),
            to_email,
            message,
            status: InvitationState::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        })
    }

    pub fn state(&self) -> InvitationState {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == InvitationState::Pending
    }

    /// Whether the invitation is addressed to this email
    pub fn is_addressed_to(&self, email: &str) -> bool {
        self.to_email == normalize_email(email)
    }

    pub fn accept(&mut self, resolver: Uuid) -> Result<()> {
        self.apply_transition(InvitationEvent::Accept, Some(resolver))
    }

    pub fn decline(&mut self, resolver: Uuid) -> Result<()> {
        self.apply_transition(InvitationEvent::Decline, Some(resolver))
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.apply_transition(InvitationEvent::Cancel, None)
    }

    pub fn resolve(&mut self, decision: InvitationDecision, resolver: Uuid) -> Result<()> {
        match decision {
            InvitationDecision::Accept => self.accept(resolver),
            InvitationDecision::Decline => self.decline(resolver),
        }
    }

    fn apply_transition(&mut self, event: InvitationEvent, resolver: Option<Uuid>) -> Result<()> {
        self.status = InvitationStateMachine::transition(self.status, event)?;
        self.resolved_at = Some(Utc::now());
        if resolver.is_some() {
            self.resolved_by = resolver;
        }
        Ok(())
    }

    pub fn can_transition(&self, event: InvitationEvent) -> bool {
        InvitationStateMachine::can_transition(self.status, event)
    }
}

impl Document for Invitation {
    const COLLECTION: &'static str = "invitations";

    fn key(&self) -> Uuid {
        self.id
    }
}

/// Message used when the leader does not write one
pub fn default_invitation_message(team_name: &str) -> String {
    format!(
        "Welcome to {}! You've been invited to join our team.",
        team_name
    )
}

// ============================================================================
// Registration
// ============================================================================

/// Enrollment of an individual or a team in an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    pub event_id: Uuid,
    /// Initiating user; the leader for team registrations
    pub registrant_id: Uuid,
    pub team_linked: bool,
    pub team_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    pub status: RegistrationState,
    /// Current team size, kept for observability
    pub member_count: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Registration {
    pub fn individual(event_id: Uuid, registrant_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            registrant_id,
            team_linked: false,
            team_id: None,
            payment_id: None,
            status: RegistrationState::Incomplete,
            member_count: 1,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn team_linked(event_id: Uuid, team_id: Uuid, leader_id: Uuid) -> Self {
        Self {
            team_linked: true,
            team_id: Some(team_id),
            ..Self::individual(event_id, leader_id)
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RegistrationState::Completed
    }

    /// Flip to `completed`; returns whether anything changed.
    pub fn mark_completed(&mut self, reason: RegistrationEvent) -> Result<bool> {
        if self.is_completed() {
            return Ok(false);
        }
        self.status = RegistrationStateMachine::transition(self.status, reason)?;
        self.completed_at = Some(Utc::now());
        Ok(true)
    }

    /// Attach a payment reference; re-attaching the same payment is a no-op.
    pub fn attach_payment(&mut self, payment_id: Uuid) -> Result<()> {
        match self.payment_id {
            Some(existing) if existing == payment_id => Ok(()),
            Some(_) => Err(Error::conflict(
                ConflictKind::AlreadyProcessed,
                "Registration already has a payment attached",
            )),
            None => {
                self.payment_id = Some(payment_id);
                Ok(())
            }
        }
    }
}

impl Document for Registration {
    const COLLECTION: &'static str = "registrations";

    fn key(&self) -> Uuid {
        self.id
    }
}

// ============================================================================
// Payment
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub registration_id: Uuid,
    pub amount: Decimal,
    pub status: PaymentState,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(user_id: Uuid, event_id: Uuid, registration_id: Uuid, amount: Decimal) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(Error::Validation(
                "Payment amount must be positive".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            event_id,
            registration_id,
            amount,
            status: PaymentState::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        })
    }

    pub fn confirm(&mut self) -> Result<()> {
        self.apply_transition(PaymentEvent::Confirm)
    }

    pub fn fail(&mut self) -> Result<()> {
        self.apply_transition(PaymentEvent::Fail)
    }

    fn apply_transition(&mut self, event: PaymentEvent) -> Result<()> {
        let current = self.status;
        self.status = PaymentStateMachine::transition(current, event).map_err(|_| {
            Error::conflict(
                ConflictKind::AlreadyProcessed,
                format!("Payment is already {}", current),
            )
        })?;
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

impl Document for Payment {
    const COLLECTION: &'static str = "payments";

    fn key(&self) -> Uuid {
        self.id
    }
}
