//! Simple liveness / readiness check

use actix_web::{get, web, HttpResponse, Responder};

use crate::state::AppState;

#[get("/healthz")]
pub async fn healthz(state: web::Data<AppState>) -> impl Responder {
    if let Err(e) = state.store.ping().await {
        log::warn!("health check: {e}");
        return HttpResponse::ServiceUnavailable().body("store");
    }
    HttpResponse::Ok().body("ok")
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(healthz);
}
