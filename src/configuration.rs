use std::env;
use std::env::current_dir;
use std::fmt::Display;
use std::time::Duration;

use anyhow::Context;
use config::Config;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::postgres::PgConnectOptions;

use crate::domain::Plan;
use crate::domain::PlanCatalog;
use crate::domain::ReminderWindow;
use crate::domain::UserEmail;
use crate::identity_provider::IdentityClient;
use crate::payment::StripeClient;

/// Global configuration, loaded from `configuration/*.yaml` and `APP_*` env
/// vars. See `get_configuration`.
#[derive(Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub identity_provider: IdentityProviderSettings,
    pub stripe: StripeSettings,
    pub reminders: ReminderSettings,
    pub mail: MailSettings,
}

/// Server configuration
#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    /// Should be localhost on dev machine, 0.0.0.0 on prod
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
}

/// Database configuration
#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: Secret<String>,
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub database_name: String,

    /// Should be `true` in production.
    pub require_ssl: bool,
}

impl DatabaseSettings {
    /// Connection to the named database. The password is concealed.
    pub fn connection(&self) -> PgConnectOptions {
        self.connection_without_db().database(&self.database_name)
    }

    /// Connection to the Postgres instance, without selecting a database. Used
    /// to create randomised databases for testing.
    pub fn connection_without_db(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .username(&self.username)
            .password(self.password.expose_secret())
            .host(&self.host)
            .port(self.port)
            .ssl_mode(match self.require_ssl {
                true => sqlx::postgres::PgSslMode::Require,
                false => sqlx::postgres::PgSslMode::Prefer,
            })
    }
}

/// Identity provider (user listing) configuration
#[derive(Deserialize, Clone)]
pub struct IdentityProviderSettings {
    pub base_url: String,
    pub project_id: String,
    pub api_token: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub page_size: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

impl IdentityProviderSettings {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_milliseconds) }

    pub fn client(&self) -> Result<IdentityClient, anyhow::Error> {
        IdentityClient::new(
            self.base_url.clone(),
            self.project_id.clone(),
            self.api_token.clone(),
            self.page_size,
            self.timeout(),
        )
    }
}

#[derive(Deserialize, Clone)]
pub struct PlanSettings {
    pub price_id: String,
    pub label: String,
}

#[derive(Deserialize, Clone)]
pub struct PlansSettings {
    pub usd: PlanSettings,
    pub mxn: PlanSettings,
}

/// Payment provider configuration
#[derive(Deserialize, Clone)]
pub struct StripeSettings {
    pub base_url: String,
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Static checkout page, used when a checkout session cannot be created
    pub fallback_checkout_url: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub trial_period_days: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub signature_tolerance_seconds: i64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
    pub plans: PlansSettings,
}

impl StripeSettings {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_milliseconds) }

    pub fn client(&self) -> Result<StripeClient, anyhow::Error> {
        StripeClient::new(
            self.base_url.clone(),
            self.secret_key.clone(),
            self.success_url.clone(),
            self.cancel_url.clone(),
            self.timeout(),
        )
    }

    pub fn plan_catalog(&self) -> PlanCatalog {
        PlanCatalog::new(
            Plan::new(&self.plans.usd.price_id, &self.plans.usd.label),
            Plan::new(&self.plans.mxn.price_id, &self.plans.mxn.label),
        )
    }
}

/// Registration-age window, in hours before "now". Users created between
/// `window_start_hours` and `window_end_hours` ago are eligible.
#[derive(Deserialize, Clone)]
pub struct ReminderSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub window_start_hours: i64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub window_end_hours: i64,
}

impl ReminderSettings {
    pub fn window(&self) -> Result<ReminderWindow, anyhow::Error> {
        ReminderWindow::from_hours(self.window_start_hours, self.window_end_hours)
    }
}

/// Outbound mail queue configuration. Templates are rendered by the mail
/// dispatcher; we only name them.
#[derive(Deserialize, Clone)]
pub struct MailSettings {
    pub admin_email: String,
    pub reminder_template: String,
    pub welcome_template: String,
    pub admin_template: String,
}

impl MailSettings {
    pub fn admin(&self) -> Result<UserEmail, anyhow::Error> {
        UserEmail::parse(self.admin_email.clone()).map_err(|e| anyhow::anyhow!(e))
    }
}

impl Settings {
    /// Fail fast on values that deserialize fine but make no sense
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.reminders
            .window()
            .context("invalid reminders window")?;
        self.mail.admin().context("invalid mail.admin_email")?;
        Ok(())
    }
}

pub enum Environment {
    Local,
    Production,
}

impl Display for Environment {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Environment::Local => "local",
                Environment::Production => "production",
            }
        )
    }
}

impl TryFrom<String> for Environment {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            e => Err(format!("Invalid environment: {e}")),
        }
    }
}

/// Load yaml configuration files at `<project_root>/configuration`, then
/// override with env vars.
///
/// `APP_STRIPE__SECRET_KEY=sk_live_...` -> `Settings.stripe.secret_key`
pub fn get_configuration() -> Result<Settings, anyhow::Error> {
    let cfg_dir = current_dir()
        .context("could not get current dir")?
        .join("configuration");

    let env: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".to_string())
        .try_into()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let settings = Config::builder()
        .add_source(config::File::from(cfg_dir.join("base.yaml")))
        .add_source(config::File::from(cfg_dir.join(format!("{env}.yaml"))))
        // env vars are always strings; `serde-aux` parses the numeric ones
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize::<Settings>()?;

    settings.validate()?;
    Ok(settings)
}
