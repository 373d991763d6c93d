pub mod configuration;
pub mod domain;
pub mod identity_provider;
pub mod notifications;
pub mod payment;
pub mod reminders;
pub mod routes;
pub mod startup;
pub mod store;
pub mod telemetry;
pub mod utils;
