//! Payment collaborator
//!
//! Tracks payments against registrations. Confirming a payment attaches it
//! to the registration, completes the registration and locks the team.

use enlist_common::{ConflictKind, Error, Result};
use enlist_store::Filter;
use rust_decimal::Decimal;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::entities::{Payment, Registration};
use crate::domain::state::RegistrationEvent;
use crate::notifications::{Notification, Notifier, PostCommit};
use crate::repository::{
    get_event_tx, get_payment_tx, get_registration_tx, get_team_tx, get_user_tx, put_payment_tx,
    put_registration_tx, put_team_tx, update_user_tx, TeamsRepositories,
};

#[derive(Clone, Debug)]
pub struct PaymentLedger {
    repos: TeamsRepositories,
    notifier: Notifier,
}

impl PaymentLedger {
    pub fn new(repos: TeamsRepositories, notifier: Notifier) -> Self {
        Self { repos, notifier }
    }

    /// Open a pending payment for a registration the payer belongs to.
    #[instrument(skip(self), fields(amount = %amount))]
    pub async fn initiate(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        registration_id: Uuid,
        amount: Decimal,
    ) -> Result<Payment> {
        let payment = Payment::new(user_id, event_id, registration_id, amount)?;

        let mut tx = self.repos.begin();
        let registration = get_registration_tx(&mut tx, registration_id).await?;
        if registration.event_id != event_id {
            return Err(Error::Validation(format!(
                "Registration {} is not for event {}",
                registration_id, event_id
            )));
        }
        if registration.payment_id.is_some() {
            return Err(Error::conflict(
                ConflictKind::AlreadyProcessed,
                "Registration is already paid",
            ));
        }
        get_user_tx(&mut tx, user_id).await?;
        let may_pay = match registration.team_id {
            Some(team_id) => get_team_tx(&mut tx, team_id).await?.is_member(user_id),
            None => registration.registrant_id == user_id,
        };
        if !may_pay {
            return Err(Error::Authorization(
                "Only the registrant or a team member can pay for this registration".to_string(),
            ));
        }

        put_payment_tx(&mut tx, &payment)?;
        tx.commit().await?;
        tracing::info!(payment_id = %payment.id, "Payment initiated");
        Ok(payment)
    }

    /// Complete a pending payment and everything that hangs off it.
    #[instrument(skip(self))]
    pub async fn confirm(&self, payment_id: Uuid, registration_id: Uuid) -> Result<Registration> {
        let mut tx = self.repos.begin();

        let mut payment = get_payment_tx(&mut tx, payment_id).await?;
        if payment.registration_id != registration_id {
            return Err(Error::Validation(format!(
                "Payment {} does not belong to registration {}",
                payment_id, registration_id
            )));
        }
        payment.confirm()?;

        let mut registration = get_registration_tx(&mut tx, registration_id).await?;
        registration.attach_payment(payment.id)?;
        registration.mark_completed(RegistrationEvent::PaymentConfirmed)?;

        let beneficiaries = match registration.team_id {
            Some(team_id) => {
                let mut team = get_team_tx(&mut tx, team_id).await?;
                team.payment_complete = true;
                team.touch();
                put_team_tx(&mut tx, &team)?;
                team.members().to_vec()
            }
            None => vec![registration.registrant_id],
        };
        for user_id in beneficiaries {
            update_user_tx(&mut tx, user_id, |user| {
                user.registered_events.insert(registration.event_id);
            })
            .await?;
        }

        let payer = get_user_tx(&mut tx, payment.user_id).await?;
        let event = get_event_tx(&mut tx, registration.event_id).await?;

        put_payment_tx(&mut tx, &payment)?;
        put_registration_tx(&mut tx, &registration)?;
        tx.commit().await?;
        tracing::info!(
            %payment_id,
            %registration_id,
            team_id = ?registration.team_id,
            "Payment confirmed"
        );

        let mut notices = PostCommit::new();
        notices.push(Notification::PaymentConfirmed {
            recipient_email: payer.email,
            event_name: event.name,
            amount: payment.amount,
            payment_id: payment.id,
        });
        self.notifier.dispatch(notices).await;

        Ok(registration)
    }

    #[instrument(skip(self))]
    pub async fn fail(&self, payment_id: Uuid) -> Result<Payment> {
        let mut tx = self.repos.begin();
        let mut payment = get_payment_tx(&mut tx, payment_id).await?;
        payment.fail()?;
        put_payment_tx(&mut tx, &payment)?;
        tx.commit().await?;
        tracing::info!(%payment_id, "Payment failed");
        Ok(payment)
    }

    /// Whether any registration of the team carries a payment reference
    pub async fn has_completed_payment(&self, team_id: Uuid) -> Result<bool> {
        let paid: Vec<Registration> = self
            .repos
            .store()
            .find(
                &Filter::new()
                    .eq("team_id", team_id.to_string())
                    .not_null("payment_id"),
            )
            .await?;
        Ok(!paid.is_empty())
    }
}
