//! User directory

use std::collections::HashMap;

use crate::domain::entities::User;
use crate::domain::validation::normalize_email;
use crate::repository::transactions::{add_team_tx, remove_registered_event_tx, remove_team_tx};
use enlist_common::{ConflictKind, Error, Result};
use enlist_store::{Filter, Store};
use uuid::Uuid;

/// Maximum emails per lookup query
pub const EMAIL_LOOKUP_BATCH: usize = 30;

#[derive(Clone, Debug)]
pub struct UserDirectory {
    store: Store,
}

impl UserDirectory {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Find user by ID
    pub async fn find(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.store.get(id).await?)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<User> {
        self.find(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("User {} not found", id)))
    }

    /// Resolve many emails at once, case-insensitively.
    ///
    /// Keys of the returned map are normalized emails; unknown emails are
    /// simply absent.
    pub async fn get_many_by_email<S: AsRef<str>>(
        &self,
        emails: &[S],
    ) -> Result<HashMap<String, User>> {
        let normalized: Vec<String> = emails.iter().map(|e| normalize_email(e.as_ref())).collect();
        let mut found = HashMap::with_capacity(normalized.len());

        for chunk in normalized.chunks(EMAIL_LOOKUP_BATCH) {
            let users: Vec<User> = self
                .store
                .find(&Filter::new().in_ignore_case("email", chunk))
                .await?;
            for user in users {
                found.insert(normalize_email(&user.email), user);
            }
        }

        tracing::debug!(
            requested = normalized.len(),
            resolved = found.len(),
            "Resolved users by email"
        );
        Ok(found)
    }

    /// Register a user profile; emails are unique.
    pub async fn create(&self, user: &User) -> Result<()> {
        let mut tx = self.store.begin();
        let existing: Vec<User> = tx
            .query(&Filter::new().in_ignore_case("email", [&user.email]))
            .await?;
        if !existing.is_empty() {
            return Err(Error::conflict(
                ConflictKind::AlreadyExists,
                format!("A user with email {} already exists", user.email),
            ));
        }
        tx.set(user)?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn add_team(&self, user_id: Uuid, team_id: Uuid) -> Result<User> {
        let mut tx = self.store.begin();
        let user = add_team_tx(&mut tx, user_id, team_id).await?;
        tx.commit().await?;
        Ok(user)
    }

    pub async fn remove_team(&self, user_id: Uuid, team_id: Uuid) -> Result<User> {
        let mut tx = self.store.begin();
        let user = remove_team_tx(&mut tx, user_id, team_id).await?;
        tx.commit().await?;
        Ok(user)
    }

    pub async fn remove_registered_event(&self, user_id: Uuid, event_id: Uuid) -> Result<User> {
        let mut tx = self.store.begin();
        let user = remove_registered_event_tx(&mut tx, user_id, event_id).await?;
        tx.commit().await?;
        Ok(user)
    }
}
