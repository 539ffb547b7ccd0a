//! Enlist Email Service
//!
//! Outbound notices for the team registration workflow:
//! - AWS SES delivery for production
//! - Mock capture for tests and local development
//! - Plain-text and HTML content for invitations, disbanded teams,
//!   registration receipts and payment confirmations

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod aws_ses;
pub mod content;
pub mod mock;

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Email configuration error: {0}")]
    Configuration(String),

    #[error("Email validation error: {0}")]
    Validation(String),

    #[error("AWS SES error: {0}")]
    AwsSes(String),

    #[error("Email delivery failed: {0}")]
    Delivery(String),
}

/// Kind of notice, recorded in message metadata under `email_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    TeamInvitation,
    TeamDisbanded,
    RegistrationReceived,
    PaymentConfirmed,
}

impl EmailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailKind::TeamInvitation => "team_invitation",
            EmailKind::TeamDisbanded => "team_disbanded",
            EmailKind::RegistrationReceived => "registration_received",
            EmailKind::PaymentConfirmed => "payment_confirmed",
        }
    }
}

/// Email message to be sent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl EmailMessage {
    pub fn new(to: String, from: String, subject: String, body_text: String) -> Self {
        Self {
            to,
            from,
            subject,
            body_text,
            body_html: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_html(mut self, body_html: String) -> Self {
        self.body_html = Some(body_html);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_kind(self, kind: EmailKind) -> Self {
        self.with_metadata("email_type", kind.as_str())
    }

    /// Notice kind stamped by `with_kind`, if any
    pub fn kind(&self) -> Option<&str> {
        self.metadata.get("email_type").map(String::as_str)
    }
}

/// Email delivery receipt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailReceipt {
    pub message_id: String,
    pub sent_at: DateTime<Utc>,
    pub provider: String,
    pub metadata: HashMap<String, String>,
}

/// Everything an invitation email shows the invitee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationEmail {
    pub recipient_email: String,
    pub recipient_name: String,
    pub inviter_name: String,
    pub team_name: String,
    pub event_name: String,
    pub message: String,
    pub team_id: Uuid,
    pub invitation_id: Uuid,
}

/// Email service configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Email service provider (ses, mock)
    pub provider: String,
    pub aws_region: Option<String>,
    /// AWS endpoint URL (for LocalStack)
    pub aws_endpoint_url: Option<String>,
    pub default_from: String,
    /// Disabled services capture nothing and always succeed
    pub enabled: bool,
    /// Base URL used in invitation and registration links
    pub app_base_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            aws_region: None,
            aws_endpoint_url: None,
            default_from: "teams@enlist.events".to_string(),
            enabled: true,
            app_base_url: "https://enlist.events".to_string(),
        }
    }
}

impl EmailConfig {
    /// Create email config from environment variables
    pub fn from_env() -> Result<Self, EmailError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let enabled = match std::env::var("EMAIL_ENABLED") {
            Ok(raw) => raw.parse().map_err(|_| {
                EmailError::Configuration(format!("EMAIL_ENABLED must be true or false, got {raw}"))
            })?,
            Err(_) => defaults.enabled,
        };

        Ok(Self {
            provider: std::env::var("EMAIL_PROVIDER").unwrap_or(defaults.provider),
            aws_region: std::env::var("AWS_REGION").ok(),
            aws_endpoint_url: std::env::var("AWS_ENDPOINT_URL").ok(),
            default_from: std::env::var("FROM_EMAIL").unwrap_or(defaults.default_from),
            enabled,
            app_base_url: std::env::var("APP_BASE_URL").unwrap_or(defaults.app_base_url),
        })
    }
}

/// Email service trait for different implementations
#[async_trait::async_trait]
pub trait EmailService: Send + Sync {
    /// Send an email message
    async fn send_email(&self, message: EmailMessage) -> Result<EmailReceipt, EmailError>;

    /// Default "from" address for outgoing emails
    fn default_from(&self) -> String;

    /// Application base URL for building links
    fn app_base_url(&self) -> &str;

    /// Provider name for logs
    fn provider(&self) -> &'static str;

    async fn send_team_invitation(
        &self,
        invitation: &InvitationEmail,
    ) -> Result<EmailReceipt, EmailError> {
        let respond_url = format!(
            "{}/invitations/{}",
            self.app_base_url(),
            invitation.invitation_id
        );

        let message = EmailMessage::new(
            invitation.recipient_email.clone(),
            self.default_from(),
            content::team_invitation_subject(&invitation.team_name, &invitation.event_name),
            content::team_invitation_text(invitation, &respond_url),
        )
        .with_html(content::team_invitation_html(invitation, &respond_url))
        .with_kind(EmailKind::TeamInvitation)
        .with_metadata("team_id", invitation.team_id)
        .with_metadata("invitation_id", invitation.invitation_id);

        self.send_email(message).await
    }

    async fn send_team_disbanded(
        &self,
        recipient_email: &str,
        team_name: &str,
        event_name: &str,
        team_id: Uuid,
    ) -> Result<EmailReceipt, EmailError> {
        let message = EmailMessage::new(
            recipient_email.to_string(),
            self.default_from(),
            format!("Team {team_name} has been disbanded"),
            content::team_disbanded_text(team_name, event_name),
        )
        .with_kind(EmailKind::TeamDisbanded)
        .with_metadata("team_id", team_id);

        self.send_email(message).await
    }

    async fn send_registration_received(
        &self,
        recipient_email: &str,
        recipient_name: &str,
        event_name: &str,
        registration_id: Uuid,
    ) -> Result<EmailReceipt, EmailError> {
        let message = EmailMessage::new(
            recipient_email.to_string(),
            self.default_from(),
            format!("Registration received: {event_name}"),
            content::registration_received_text(recipient_name, event_name),
        )
        .with_kind(EmailKind::RegistrationReceived)
        .with_metadata("registration_id", registration_id);

        self.send_email(message).await
    }

    async fn send_payment_confirmed(
        &self,
        recipient_email: &str,
        event_name: &str,
        amount: &str,
        payment_id: Uuid,
    ) -> Result<EmailReceipt, EmailError> {
        let message = EmailMessage::new(
            recipient_email.to_string(),
            self.default_from(),
            format!("Payment confirmed: {event_name}"),
            content::payment_confirmed_text(event_name, amount, payment_id),
        )
        .with_kind(EmailKind::PaymentConfirmed)
        .with_metadata("payment_id", payment_id);

        self.send_email(message).await
    }
}

/// Email service factory
pub struct EmailServiceFactory;

impl EmailServiceFactory {
    /// Create email service based on configuration
    pub async fn create(config: EmailConfig) -> Result<Arc<dyn EmailService>, EmailError> {
        if !config.enabled {
            tracing::info!("Email service disabled, using mock implementation");
            return Ok(Arc::new(mock::MockEmailService::new_disabled()));
        }

        match config.provider.as_str() {
            "ses" | "aws-ses" => {
                tracing::info!(region = ?config.aws_region, "Creating AWS SES email service");
                Ok(Arc::new(aws_ses::SesEmailService::new(config).await?))
            }
            "mock" => {
                tracing::info!("Creating mock email service");
                Ok(Arc::new(mock::MockEmailService::with_config(&config)))
            }
            provider => Err(EmailError::Configuration(format!(
                "Unknown email provider: {}. Supported providers: ses, mock",
                provider
            ))),
        }
    }
}
