//! Prometheus metrics & middleware helper.
//!
//! Request metrics come from the actix middleware at `/metrics`; game
//! counters live in their own registry, served at `/api/metrics/game`.

use actix_web::{get, web, HttpResponse, Responder};
use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};

/// Global Prometheus handle reused in tests.
pub static METRICS: Lazy<PrometheusMetrics> = Lazy::new(|| {
    PrometheusMetricsBuilder::new("api")
        .endpoint("/metrics")
        .build()
        .expect("metrics builder")
});

pub static GAME_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn counter(name: &str, help: &str) -> IntCounter {
    let c = IntCounter::with_opts(Opts::new(name, help).namespace("snakeladder"))
        .expect("counter opts");
    GAME_REGISTRY
        .register(Box::new(c.clone()))
        .expect("counter registered once");
    c
}

/// Rolls rejected by the turn lock.
pub static TURN_CONFLICTS: Lazy<IntCounter> =
    Lazy::new(|| counter("turn_conflicts_total", "rolls rejected by the turn lock"));

/// Players removed after their session went silent.
pub static PRESENCE_LOSSES: Lazy<IntCounter> =
    Lazy::new(|| counter("presence_losses_total", "players reported gone by presence"));

/// Games deleted because at most one player remained.
pub static GAMES_ABANDONED: Lazy<IntCounter> =
    Lazy::new(|| counter("games_abandoned_total", "games abandoned after departures"));

/// Text exposition of the game counters.
pub fn render_game_metrics() -> String {
    // Touch every counter so all three series show up from the first scrape.
    Lazy::force(&TURN_CONFLICTS);
    Lazy::force(&PRESENCE_LOSSES);
    Lazy::force(&GAMES_ABANDONED);

    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&GAME_REGISTRY.gather(), &mut buf) {
        log::warn!("game metrics encode failed: {e}");
    }
    String::from_utf8(buf).unwrap_or_default()
}

#[get("/metrics/game")]
pub async fn game_metrics() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(render_game_metrics())
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(game_metrics);
}
