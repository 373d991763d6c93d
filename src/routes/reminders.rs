use std::fmt::Debug;

use actix_web::http::StatusCode;
use actix_web::web;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use chrono::Utc;
use serde::Serialize;

use super::json_error;
use crate::reminders::ReminderScan;
use crate::reminders::ScanError;
use crate::utils::error_chain_fmt;

#[derive(Serialize)]
struct ScanResponse {
    status: &'static str,
    count: usize,
    /// Addresses reminded by this run
    processed: Vec<String>,
}

#[derive(thiserror::Error)]
#[error(transparent)]
pub struct ReminderRouteError(#[from] ScanError);

impl Debug for ReminderRouteError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for ReminderRouteError {
    fn status_code(&self) -> StatusCode { StatusCode::INTERNAL_SERVER_ERROR }

    fn error_response(&self) -> HttpResponse { json_error(self.status_code(), self.to_string()) }
}

/// `GET|POST /cron/abandoned-reminders`
///
/// Meant to be hit by a scheduler. Safe to call repeatedly and concurrently;
/// nobody is reminded twice.
#[tracing::instrument(name = "Abandoned registration reminders", skip(scan))]
pub async fn abandoned_reminders(
    scan: web::Data<ReminderScan>
) -> Result<HttpResponse, ReminderRouteError> {
    let report = scan.run(Utc::now()).await?;
    tracing::info!(processed = report.processed, "reminder scan finished");
    Ok(HttpResponse::Ok().json(ScanResponse {
        status: "success",
        count: report.processed,
        processed: report.emails,
    }))
}
