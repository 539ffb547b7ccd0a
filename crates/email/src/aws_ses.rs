//! AWS SES delivery
//!
//! Production notices go through SES. When `AWS_ENDPOINT_URL` is set the
//! client targets that endpoint with static credentials (LocalStack).

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_ses::config::SharedCredentialsProvider;
use aws_sdk_ses::types::{Body, Content, Destination, Message};
use aws_sdk_ses::Client as SesClient;
use chrono::Utc;

use crate::{EmailConfig, EmailError, EmailMessage, EmailReceipt, EmailService};

const DEFAULT_REGION: &str = "us-east-1";

pub struct SesEmailService {
    client: SesClient,
    config: EmailConfig,
}

async fn load_sdk_config(config: &EmailConfig) -> SdkConfig {
    let region = Region::new(
        config
            .aws_region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string()),
    );
    let loader = aws_config::defaults(BehaviorVersion::latest()).region(region);

    match config.aws_endpoint_url.as_deref() {
        Some(endpoint_url) => {
            tracing::info!(endpoint_url, "Using custom SES endpoint");
            let credentials =
                Credentials::new("test", "test", None, None, "enlist-local-endpoint");
            loader
                .endpoint_url(endpoint_url)
                .credentials_provider(SharedCredentialsProvider::new(credentials))
                .load()
                .await
        }
        None => loader.load().await,
    }
}

fn utf8(data: &str, part: &str) -> Result<Content, EmailError> {
    Content::builder()
        .data(data)
        .charset("UTF-8")
        .build()
        .map_err(|e| EmailError::AwsSes(format!("Failed to build {part}: {e}")))
}

fn build_ses_message(message: &EmailMessage) -> Result<Message, EmailError> {
    let mut body = Body::builder().text(utf8(&message.body_text, "text body")?);
    if let Some(html) = &message.body_html {
        body = body.html(utf8(html, "HTML body")?);
    }

    Ok(Message::builder()
        .subject(utf8(&message.subject, "subject")?)
        .body(body.build())
        .build())
}

impl SesEmailService {
    pub async fn new(config: EmailConfig) -> Result<Self, EmailError> {
        if !config.default_from.contains('@') {
            return Err(EmailError::Configuration(format!(
                "FROM_EMAIL is not an address: {}",
                config.default_from
            )));
        }

        let sdk_config = load_sdk_config(&config).await;
        Ok(Self {
            client: SesClient::new(&sdk_config),
            config,
        })
    }
}

#[async_trait::async_trait]
impl EmailService for SesEmailService {
    async fn send_email(&self, message: EmailMessage) -> Result<EmailReceipt, EmailError> {
        if !message.to.contains('@') {
            return Err(EmailError::Validation(format!(
                "Invalid recipient address: {}",
                message.to
            )));
        }

        let output = self
            .client
            .send_email()
            .source(&message.from)
            .destination(Destination::builder().to_addresses(&message.to).build())
            .message(build_ses_message(&message)?)
            .send()
            .await
            .map_err(|e| EmailError::AwsSes(format!("Failed to send email: {e}")))?;
        let message_id = output.message_id().to_string();

        tracing::info!(
            message_id = %message_id,
            kind = message.kind().unwrap_or("plain"),
            "Email sent via SES"
        );

        Ok(EmailReceipt {
            message_id,
            sent_at: Utc::now(),
            provider: self.provider().to_string(),
            metadata: message.metadata,
        })
    }

    fn default_from(&self) -> String {
        self.config.default_from.clone()
    }

    fn app_base_url(&self) -> &str {
        &self.config.app_base_url
    }

    fn provider(&self) -> &'static str {
        "aws-ses"
    }
}
