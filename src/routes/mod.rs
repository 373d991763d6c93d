mod health_check;
mod reminders;
mod stripe_webhook;

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
pub use health_check::*;
pub use reminders::*;
use serde_json::json;
pub use stripe_webhook::*;

/// `{"status": "error", "message": ...}`, shared by every failing endpoint
fn json_error(
    status: StatusCode,
    message: String,
) -> HttpResponse {
    HttpResponse::build(status).json(json!({
        "status": "error",
        "message": message,
    }))
}
