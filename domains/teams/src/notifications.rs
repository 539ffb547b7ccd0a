//! Post-commit notifications
//!
//! Operations collect notices in a `PostCommit` buffer while they build a
//! transaction. The buffer is handed to the `Notifier` only after the commit
//! succeeded; an aborted transaction drops its buffer unsent. Delivery is
//! best-effort: failures are logged and never reach the caller.

use std::sync::Arc;

use enlist_common::NotificationMode;
use enlist_email::{EmailError, EmailService, InvitationEmail};
use rust_decimal::Decimal;
use uuid::Uuid;

/// One outbound notice
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Invitation(InvitationEmail),
    TeamDisbanded {
        recipient_email: String,
        team_name: String,
        event_name: String,
        team_id: Uuid,
    },
    RegistrationReceived {
        recipient_email: String,
        recipient_name: String,
        event_name: String,
        registration_id: Uuid,
    },
    PaymentConfirmed {
        recipient_email: String,
        event_name: String,
        amount: Decimal,
        payment_id: Uuid,
    },
}

impl Notification {
    pub fn recipient(&self) -> &str {
        match self {
            Notification::Invitation(invitation) => &invitation.recipient_email,
            Notification::TeamDisbanded { recipient_email, .. }
            | Notification::RegistrationReceived { recipient_email, .. }
            | Notification::PaymentConfirmed { recipient_email, .. } => recipient_email,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Invitation(_) => "invitation",
            Notification::TeamDisbanded { .. } => "team_disbanded",
            Notification::RegistrationReceived { .. } => "registration_received",
            Notification::PaymentConfirmed { .. } => "payment_confirmed",
        }
    }
}

/// Outbound notification channel
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_invitation(&self, invitation: &InvitationEmail) -> Result<(), EmailError>;

    async fn send_team_disbanded(
        &self,
        recipient_email: &str,
        team_name: &str,
        event_name: &str,
        team_id: Uuid,
    ) -> Result<(), EmailError>;

    async fn send_registration_received(
        &self,
        recipient_email: &str,
        recipient_name: &str,
        event_name: &str,
        registration_id: Uuid,
    ) -> Result<(), EmailError>;

    async fn send_payment_confirmed(
        &self,
        recipient_email: &str,
        event_name: &str,
        amount: Decimal,
        payment_id: Uuid,
    ) -> Result<(), EmailError>;

    async fn deliver(&self, notification: &Notification) -> Result<(), EmailError> {
        match notification {
            Notification::Invitation(invitation) => self.send_invitation(invitation).await,
            Notification::TeamDisbanded {
                recipient_email,
                team_name,
                event_name,
                team_id,
            } => {
                self.send_team_disbanded(recipient_email, team_name, event_name, *team_id)
                    .await
            }
            Notification::RegistrationReceived {
                recipient_email,
                recipient_name,
                event_name,
                registration_id,
            } => {
                self.send_registration_received(
                    recipient_email,
                    recipient_name,
                    event_name,
                    *registration_id,
                )
                .await
            }
            Notification::PaymentConfirmed {
                recipient_email,
                event_name,
                amount,
                payment_id,
            } => {
                self.send_payment_confirmed(recipient_email, event_name, *amount, *payment_id)
                    .await
            }
        }
    }
}

/// Sink that delivers through an `EmailService`
#[derive(Clone)]
pub struct EmailNotificationSink {
    email: Arc<dyn EmailService>,
}

impl EmailNotificationSink {
    pub fn new(email: Arc<dyn EmailService>) -> Self {
        Self { email }
    }
}

#[async_trait::async_trait]
impl NotificationSink for EmailNotificationSink {
    async fn send_invitation(&self, invitation: &InvitationEmail) -> Result<(), EmailError> {
        self.email.send_team_invitation(invitation).await?;
        Ok(())
    }

    async fn send_team_disbanded(
        &self,
        recipient_email: &str,
        team_name: &str,
        event_name: &str,
        team_id: Uuid,
    ) -> Result<(), EmailError> {
        self.email
            .send_team_disbanded(recipient_email, team_name, event_name, team_id)
            .await?;
        Ok(())
    }

    async fn send_registration_received(
        &self,
        recipient_email: &str,
        recipient_name: &str,
        event_name: &str,
        registration_id: Uuid,
    ) -> Result<(), EmailError> {
        self.email
            .send_registration_received(recipient_email, recipient_name, event_name, registration_id)
            .await?;
        Ok(())
    }

    async fn send_payment_confirmed(
        &self,
        recipient_email: &str,
        event_name: &str,
        amount: Decimal,
        payment_id: Uuid,
    ) -> Result<(), EmailError> {
        self.email
            .send_payment_confirmed(
                recipient_email,
                event_name,
                &amount.round_dp(2).to_string(),
                payment_id,
            )
            .await?;
        Ok(())
    }
}

/// Notices waiting for a successful commit
#[derive(Debug, Default)]
#[must_use = "a PostCommit buffer must be dispatched after commit"]
pub struct PostCommit {
    notifications: Vec<Notification>,
}

impl PostCommit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}

/// Dispatches committed notices to a sink
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    mode: NotificationMode,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, mode: NotificationMode) -> Self {
        Self { sink, mode }
    }

    pub fn mode(&self) -> NotificationMode {
        self.mode
    }

    /// Send a committed batch. Never fails; each delivery is attempted once.
    pub async fn dispatch(&self, batch: PostCommit) {
        if batch.is_empty() {
            return;
        }
        let notifications = batch.notifications;
        match self.mode {
            NotificationMode::Inline => deliver_all(self.sink.as_ref(), &notifications).await,
            NotificationMode::Background => {
                let sink = Arc::clone(&self.sink);
                tokio::spawn(async move {
                    deliver_all(sink.as_ref(), &notifications).await;
                });
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    #[mutants::skip] // Debug output only
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").field("mode", &self.mode).finish()
    }
}

async fn deliver_all(sink: &dyn NotificationSink, notifications: &[Notification]) {
    for notification in notifications {
        match sink.deliver(notification).await {
            Ok(()) => tracing::debug!(
                kind = notification.kind(),
                to = notification.recipient(),
                "Notification sent"
            ),
            Err(e) => tracing::warn!(
                kind = notification.kind(),
                to = notification.recipient(),
                error = %e,
                "Notification delivery failed"
            ),
        }
    }
}
