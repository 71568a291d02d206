use crate::{http, metrics};
use actix_web::web;

/// Mount every HTTP sub-module under `/api`.
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(http::lobby::init_routes)
            .configure(http::games::init_routes)
            .configure(http::presence::init_routes)
            .configure(http::health::init_routes)
            .configure(metrics::init_routes),
    );
}
