//! State machines for registration workflow entities
//!
//! Each machine defines its states, the events that move between them and
//! which states are terminal. Entities apply transitions through these
//! machines and never assign a status directly.

use serde::{Deserialize, Serialize};

pub use enlist_common::StateError;

// ============================================================================
// Invitation State Machine
// ============================================================================

/// Invitation lifecycle
///
/// `Accepted` is resolved but may still be cancelled when the team is
/// disbanded; `Declined` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvitationState {
    #[default]
    Pending,
    Accepted,
    Declined,
    Cancelled,
}

impl InvitationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Declined | Self::Cancelled)
    }

    /// Anything but `Pending` has been answered or withdrawn
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn valid_transitions(&self) -> &'static [InvitationState] {
        match self {
            Self::Pending => &[Self::Accepted, Self::Declined, Self::Cancelled],
            Self::Accepted => &[Self::Cancelled],
            Self::Declined | Self::Cancelled => &[],
        }
    }
}

impl std::fmt::Display for InvitationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Declined => write!(f, "declined"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationEvent {
    /// Invitee joins the team
    Accept,
    /// Invitee turns the offer down
    Decline,
    /// Team was disbanded
    Cancel,
}

impl std::fmt::Display for InvitationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Decline => write!(f, "decline"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

pub struct InvitationStateMachine;

impl InvitationStateMachine {
    pub fn transition(
        current: InvitationState,
        event: InvitationEvent,
    ) -> Result<InvitationState, StateError> {
        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }

        match (current, event) {
            (InvitationState::Pending, InvitationEvent::Accept) => Ok(InvitationState::Accepted),
            (InvitationState::Pending, InvitationEvent::Decline) => Ok(InvitationState::Declined),
            (InvitationState::Pending | InvitationState::Accepted, InvitationEvent::Cancel) => {
                Ok(InvitationState::Cancelled)
            }
            _ => Err(StateError::InvalidTransition {
                from: current.to_string(),
                event: event.to_string(),
            }),
        }
    }

    pub fn can_transition(current: InvitationState, event: InvitationEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}

// ============================================================================
// Registration State Machine
// ============================================================================

/// Registration status; `completed` is never reverted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationState {
    #[default]
    Incomplete,
    Completed,
}

impl RegistrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incomplete => write!(f, "incomplete"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// Team reached its minimum size
    TeamFormed,
    /// Payment for the registration was confirmed
    PaymentConfirmed,
}

impl std::fmt::Display for RegistrationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TeamFormed => write!(f, "team_formed"),
            Self::PaymentConfirmed => write!(f, "payment_confirmed"),
        }
    }
}

pub struct RegistrationStateMachine;

impl RegistrationStateMachine {
    pub fn transition(
        current: RegistrationState,
        event: RegistrationEvent,
    ) -> Result<RegistrationState, StateError> {
        match (current, event) {
            (
                RegistrationState::Incomplete,
                RegistrationEvent::TeamFormed | RegistrationEvent::PaymentConfirmed,
            ) => Ok(RegistrationState::Completed),
            (RegistrationState::Completed, _) => {
                Err(StateError::TerminalState(current.to_string()))
            }
        }
    }
}

// ============================================================================
// Payment State Machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl PaymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    Confirm,
    Fail,
}

impl std::fmt::Display for PaymentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirm => write!(f, "confirm"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

pub struct PaymentStateMachine;

impl PaymentStateMachine {
    pub fn transition(
        current: PaymentState,
        event: PaymentEvent,
    ) -> Result<PaymentState, StateError> {
        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }

        Ok(match event {
            PaymentEvent::Confirm => PaymentState::Completed,
            PaymentEvent::Fail => PaymentState::Failed,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
