use actix_web::HttpResponse;

/// `GET /health_check`
pub async fn health_check() -> HttpResponse { HttpResponse::Ok().finish() }
