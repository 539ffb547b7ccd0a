//! Workflow services built on the repositories

pub mod formation;
pub mod payments;
pub mod registration;

use enlist_common::Config;

use crate::notifications::Notifier;
use crate::repository::TeamsRepositories;

pub use formation::{
    CreateTeamRequest, InvitationResponse, LeaveOutcome, ResponseOutcome, TeamCreated,
    TeamFormationEngine, TeamView,
};
pub use payments::PaymentLedger;
pub use registration::RegistrationService;

/// Tunables for the formation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormationSettings {
    pub team_name_max_length: usize,
    /// Attempts at the post-decline cleanup before giving up
    pub cleanup_retries: u32,
}

impl Default for FormationSettings {
    fn default() -> Self {
        Self {
            team_name_max_length: 100,
            cleanup_retries: 3,
        }
    }
}

impl From<&Config> for FormationSettings {
    fn from(config: &Config) -> Self {
        Self {
            team_name_max_length: config.team_name_max_length,
            cleanup_retries: config.cleanup_retries,
        }
    }
}

/// Every service of the workflow, sharing one store and notifier
#[derive(Clone, Debug)]
pub struct TeamsServices {
    pub repos: TeamsRepositories,
    pub formation: TeamFormationEngine,
    pub registrations: RegistrationService,
    pub payments: PaymentLedger,
}

impl TeamsServices {
    pub fn new(repos: TeamsRepositories, notifier: Notifier, settings: FormationSettings) -> Self {
        Self {
            formation: TeamFormationEngine::new(repos.clone(), notifier.clone(), settings),
            registrations: RegistrationService::new(repos.clone(), notifier.clone()),
            payments: PaymentLedger::new(repos.clone(), notifier),
            repos,
        }
    }
}
