//! Mock Email Service Implementation
//!
//! Captures every message in memory so workflow tests can assert on what
//! was sent. It can also be switched into a failing mode to check that a
//! delivery failure never affects already committed state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{EmailConfig, EmailError, EmailKind, EmailMessage, EmailReceipt, EmailService};

/// Email captured by the mock service
#[derive(Debug, Clone)]
pub struct CapturedEmail {
    pub message: EmailMessage,
    pub receipt: EmailReceipt,
    pub captured_at: DateTime<Utc>,
}

impl CapturedEmail {
    fn metadata_uuid(&self, key: &str) -> Option<Uuid> {
        self.message
            .metadata
            .get(key)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    pub fn invitation_id(&self) -> Option<Uuid> {
        self.metadata_uuid("invitation_id")
    }

    pub fn team_id(&self) -> Option<Uuid> {
        self.metadata_uuid("team_id")
    }

    pub fn is_kind(&self, kind: EmailKind) -> bool {
        self.message.kind() == Some(kind.as_str())
    }
}

#[derive(Debug, Default)]
struct Outbox {
    emails: Vec<CapturedEmail>,
    by_recipient: HashMap<String, Vec<CapturedEmail>>,
}

/// Mock email service for testing
#[derive(Debug, Clone)]
pub struct MockEmailService {
    outbox: Arc<Mutex<Outbox>>,
    failing: Arc<AtomicBool>,
    enabled: bool,
    default_from: String,
    app_base_url: String,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::with_config(&EmailConfig::default())
    }

    pub fn with_config(config: &EmailConfig) -> Self {
        Self {
            outbox: Arc::new(Mutex::new(Outbox::default())),
            failing: Arc::new(AtomicBool::new(false)),
            enabled: true,
            default_from: config.default_from.clone(),
            app_base_url: config.app_base_url.clone(),
        }
    }

    /// A service that accepts everything and captures nothing
    pub fn new_disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    fn outbox(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent send fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get_all_emails(&self) -> Vec<CapturedEmail> {
        self.outbox().emails.clone()
    }

    /// Emails sent to a recipient, matched case-insensitively
    pub fn get_emails_for_recipient(&self, email: &str) -> Vec<CapturedEmail> {
        self.outbox()
            .by_recipient
            .get(&email.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn emails_of_kind(&self, kind: EmailKind) -> Vec<CapturedEmail> {
        self.outbox()
            .emails
            .iter()
            .filter(|e| e.is_kind(kind))
            .cloned()
            .collect()
    }

    pub fn get_latest_invitation_email(&self, email: &str) -> Option<CapturedEmail> {
        self.get_emails_for_recipient(email)
            .into_iter()
            .filter(|e| e.is_kind(EmailKind::TeamInvitation))
            .max_by_key(|e| e.captured_at)
    }

    pub fn get_invitation_id_for_email(&self, email: &str) -> Option<Uuid> {
        self.get_latest_invitation_email(email)
            .and_then(|email| email.invitation_id())
    }

    pub fn was_invitation_sent_to(&self, email: &str) -> bool {
        self.get_invitation_id_for_email(email).is_some()
    }

    pub fn email_count(&self) -> usize {
        self.outbox().emails.len()
    }

    pub fn clear(&self) {
        let mut outbox = self.outbox();
        outbox.emails.clear();
        outbox.by_recipient.clear();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for MockEmailService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EmailService for MockEmailService {
    async fn send_email(&self, message: EmailMessage) -> Result<EmailReceipt, EmailError> {
        if !self.enabled {
            tracing::debug!(to = %message.to, "Mock email service disabled, skipping send");
            return Ok(EmailReceipt {
                message_id: format!("disabled-{}", Uuid::new_v4()),
                sent_at: Utc::now(),
                provider: "mock-disabled".to_string(),
                metadata: message.metadata,
            });
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(EmailError::Delivery(format!(
                "mock delivery to {} refused",
                message.to
            )));
        }

        let receipt = EmailReceipt {
            message_id: format!("mock-{}", Uuid::new_v4()),
            sent_at: Utc::now(),
            provider: "mock".to_string(),
            metadata: message.metadata.clone(),
        };

        let recipient = message.to.to_ascii_lowercase();
        let captured = CapturedEmail {
            message,
            receipt: receipt.clone(),
            captured_at: Utc::now(),
        };

        let mut outbox = self.outbox();
        outbox.emails.push(captured.clone());
        outbox.by_recipient.entry(recipient).or_default().push(captured);

        tracing::debug!(message_id = %receipt.message_id, "Email captured");

        Ok(receipt)
    }

    fn default_from(&self) -> String {
        self.default_from.clone()
    }

    fn app_base_url(&self) -> &str {
        &self.app_base_url
    }

    fn provider(&self) -> &'static str {
        "mock"
    }
}
