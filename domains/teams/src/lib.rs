//! Teams domain: events, users, teams, invitations, registrations and payments
//!
//! The `services` module holds the workflow entry points; everything below
//! it (repositories, entities, state machines) enforces the invariants those
//! workflows rely on.

pub mod domain;
pub mod notifications;
pub mod repository;
pub mod services;

// Re-export domain types at the crate root for convenience
pub use domain::entities::*;
pub use domain::state::{
    InvitationEvent, InvitationStateMachine, PaymentEvent, PaymentStateMachine,
    RegistrationEvent, RegistrationStateMachine, StateError,
};
pub use notifications::{
    EmailNotificationSink, Notification, NotificationSink, Notifier, PostCommit,
};
pub use repository::{
    EventCatalog, InvitationLedger, RegistrationLedger, TeamRegistry, TeamsRepositories,
    UserDirectory,
};
pub use services::{
    CreateTeamRequest, FormationSettings, InvitationResponse, LeaveOutcome, PaymentLedger,
    RegistrationService, ResponseOutcome, TeamCreated, TeamFormationEngine, TeamView,
    TeamsServices,
};
