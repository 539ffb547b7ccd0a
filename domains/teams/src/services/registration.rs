//! Individual registration and per-user registration listing

use std::collections::BTreeMap;

use enlist_common::{Error, Result};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::entities::{Registration, RegistrationState};
use crate::notifications::{Notification, Notifier, PostCommit};
use crate::repository::{
    create_registration_tx, get_user_tx, update_user_tx, TeamsRepositories,
};

#[derive(Clone, Debug)]
pub struct RegistrationService {
    repos: TeamsRepositories,
    notifier: Notifier,
}

impl RegistrationService {
    pub fn new(repos: TeamsRepositories, notifier: Notifier) -> Self {
        Self { repos, notifier }
    }

    /// Enroll a single user; one individual registration per (user, event).
    #[instrument(skip(self))]
    pub async fn register_individual(&self, event_id: Uuid, user_id: Uuid) -> Result<Registration> {
        self.register(event_id, user_id).await.inspect_err(Error::log)
    }

    async fn register(&self, event_id: Uuid, user_id: Uuid) -> Result<Registration> {
        let event = self.repos.events.get_by_id(event_id).await?;

        let mut tx = self.repos.begin();
        let user = get_user_tx(&mut tx, user_id).await?;
        let registration = Registration::individual(event.id, user.id);
        create_registration_tx(&mut tx, &registration).await?;
        update_user_tx(&mut tx, user.id, |user| {
            user.registrations.insert(registration.id);
        })
        .await?;
        tx.commit().await?;

        tracing::info!(registration_id = %registration.id, "Individual registration created");

        let mut notices = PostCommit::new();
        notices.push(Notification::RegistrationReceived {
            recipient_email: user.email,
            recipient_name: user.name,
            event_name: event.name,
            registration_id: registration.id,
        });
        self.notifier.dispatch(notices).await;

        Ok(registration)
    }

    /// Individual registrations of the user plus those of every team they belong to,
    /// oldest first.
    #[instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<RegistrationState>,
    ) -> Result<Vec<Registration>> {
        let user = self.repos.users.get_by_id(user_id).await?;

        let mut found: BTreeMap<Uuid, Registration> = BTreeMap::new();
        for registration in self
            .repos
            .registrations
            .find_by_registrant(user.id, status)
            .await?
        {
            found.insert(registration.id, registration);
        }
        for team_id in &user.teams {
            for registration in self.repos.registrations.find_by_team(*team_id).await? {
                if registration.team_linked && status.map_or(true, |s| registration.status == s) {
                    found.insert(registration.id, registration);
                }
            }
        }

        let mut registrations: Vec<Registration> = found.into_values().collect();
        registrations.sort_by_key(|r| r.created_at);
        Ok(registrations)
    }
}
