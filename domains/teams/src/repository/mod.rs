//! Repository implementations for the registration workflow

pub mod events;
pub mod invitations;
pub mod registrations;
pub mod teams;
pub mod transactions;
pub mod users;

use enlist_store::{Store, Transaction};

pub use events::EventCatalog;
pub use invitations::InvitationLedger;
pub use registrations::RegistrationLedger;
pub use teams::TeamRegistry;
pub use transactions::*;
pub use users::{UserDirectory, EMAIL_LOOKUP_BATCH};

/// Combined repository access for the registration workflow
#[derive(Clone, Debug)]
pub struct TeamsRepositories {
    store: Store,
    pub users: UserDirectory,
    pub events: EventCatalog,
    pub teams: TeamRegistry,
    pub invitations: InvitationLedger,
    pub registrations: RegistrationLedger,
}

impl TeamsRepositories {
    pub fn new(store: Store) -> Self {
        Self {
            users: UserDirectory::new(store.clone()),
            events: EventCatalog::new(store.clone()),
            teams: TeamRegistry::new(store.clone()),
            invitations: InvitationLedger::new(store.clone()),
            registrations: RegistrationLedger::new(store.clone()),
            store,
        }
    }

    /// Begin a new optimistic transaction.
    pub fn begin(&self) -> Transaction {
        self.store.begin()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}
