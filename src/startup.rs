use std::net::TcpListener;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::web;
use actix_web::web::Data;
use actix_web::App;
use actix_web::HttpServer;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_actix_web::TracingLogger;

use crate::configuration::DatabaseSettings;
use crate::configuration::Settings;
use crate::identity_provider::IdentityProvider;
use crate::notifications::NotificationPolicy;
use crate::notifications::SubscriptionNotifier;
use crate::payment::PaymentProvider;
use crate::payment::WebhookVerifier;
use crate::reminders::ReminderPolicy;
use crate::reminders::ReminderScan;
use crate::routes::abandoned_reminders;
use crate::routes::health_check;
use crate::routes::stripe_webhook;
use crate::store::DocumentStore;
use crate::store::PgStore;

/// Wrapper for actix's `Server` with access to the bound port. Not to be
/// confused with actix's `App`!
pub struct Application {
    /// Left private; use `get_port` to access
    port: u16,
    server: Server,
}

impl Application {
    /// Build against the Postgres store named in `cfg.database`
    pub async fn build(cfg: Settings) -> Result<Self, anyhow::Error> {
        let pool = get_connection_pool(&cfg.database);
        Self::build_with_store(cfg, Arc::new(PgStore::new(pool))).await
    }

    /// Every collaborator is created here, once, and handed to the handlers
    /// through `web::Data`. Only the store can be swapped out.
    pub async fn build_with_store(
        cfg: Settings,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self, anyhow::Error> {
        let addr = format!("{}:{}", cfg.application.host, cfg.application.port);
        let listener = TcpListener::bind(addr)?;
        // 0 in config -> random port picked by the OS
        let port = listener.local_addr()?.port();

        let identities: Arc<dyn IdentityProvider> = Arc::new(cfg.identity_provider.client()?);
        let payments: Arc<dyn PaymentProvider> = Arc::new(cfg.stripe.client()?);

        let scan = ReminderScan::new(
            identities,
            store.clone(),
            payments.clone(),
            ReminderPolicy::from_settings(&cfg)?,
        );
        let notifier =
            SubscriptionNotifier::new(store, payments, NotificationPolicy::from_settings(&cfg)?);
        let verifier = WebhookVerifier::new(
            cfg.stripe.webhook_secret.clone(),
            chrono::Duration::seconds(cfg.stripe.signature_tolerance_seconds),
        );

        let server = run(listener, scan, notifier, verifier)?;
        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 { self.port }

    /// Because this consumes `self`, this should be the final function call (or
    /// passed to `tokio::spawn`)
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

/// Lazy; nothing connects until the first query
pub fn get_connection_pool(db_cfg: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new().connect_lazy_with(db_cfg.connection())
}

/// Declares all API endpoints.
fn run(
    listener: TcpListener,
    scan: ReminderScan,
    notifier: SubscriptionNotifier,
    verifier: WebhookVerifier,
) -> Result<Server, anyhow::Error> {
    // `Data` is an `Arc` inside; every worker shares the same instances
    let scan = Data::new(scan);
    let notifier = Data::new(notifier);
    let verifier = Data::new(verifier);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route("/cron/abandoned-reminders", web::get().to(abandoned_reminders))
            .route("/cron/abandoned-reminders", web::post().to(abandoned_reminders))
            .route("/webhooks/stripe", web::post().to(stripe_webhook))
            .app_data(scan.clone())
            .app_data(notifier.clone())
            .app_data(verifier.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
