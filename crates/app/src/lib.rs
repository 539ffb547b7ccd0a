//! Enlist application composition root
//!
//! Builds the document store, email delivery and notifier from configuration
//! and hands them to the workflow services.

use std::sync::Arc;

use anyhow::Context;
use enlist_common::{Config, StoreBackend};
use enlist_email::{EmailConfig, EmailService, EmailServiceFactory};
use enlist_store::{PgDocumentStore, Store};
use enlist_teams::{
    EmailNotificationSink, FormationSettings, Notifier, TeamsRepositories, TeamsServices,
};

/// Fully wired application
#[derive(Clone)]
pub struct Application {
    pub config: Config,
    pub store: Store,
    pub email: Arc<dyn EmailService>,
    pub services: TeamsServices,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("store", &self.store.backend_name())
            .field("email", &self.email.provider())
            .field("notification_mode", &self.config.notification_mode)
            .finish()
    }
}

/// Open the configured store; the Postgres backend is migrated before use.
pub async fn build_store(config: &Config) -> anyhow::Result<Store> {
    match config.store_backend {
        StoreBackend::Memory => Ok(Store::memory()),
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required when STORE_BACKEND=postgres")?;
            let backend = PgDocumentStore::connect(url, config.database_max_connections)
                .await
                .context("Database connection failed")?;
            backend.migrate().await.context("Database migration failed")?;
            Ok(Store::new(Arc::new(backend)))
        }
    }
}

/// Wire services over an existing store and email service.
pub fn assemble(config: Config, store: Store, email: Arc<dyn EmailService>) -> Application {
    let sink = EmailNotificationSink::new(Arc::clone(&email));
    let notifier = Notifier::new(Arc::new(sink), config.notification_mode);
    let services = TeamsServices::new(
        TeamsRepositories::new(store.clone()),
        notifier,
        FormationSettings::from(&config),
    );

    tracing::info!(
        store = store.backend_name(),
        email = email.provider(),
        notification_mode = ?config.notification_mode,
        "Application assembled"
    );

    Application {
        config,
        store,
        email,
        services,
    }
}

/// Create the application from configuration
pub async fn create_app(config: Config, email_config: EmailConfig) -> anyhow::Result<Application> {
    let store = build_store(&config).await?;
    let email = EmailServiceFactory::create(email_config)
        .await
        .context("Email service setup failed")?;
    Ok(assemble(config, store, email))
}
