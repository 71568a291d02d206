use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use snakeladder_server::config::Settings;
use snakeladder_server::state::AppState;
use snakeladder_server::store::{Backend, MemoryStore, RedisStore};
use snakeladder_server::{http, metrics, sync, ws};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let settings = Settings::from_env();

    // Shared state store
    let store = match settings.redis_url.as_deref() {
        Some(url) => Backend::Redis(
            RedisStore::connect(url, settings.cas_attempts)
                .await
                .context("connecting to redis")?,
        ),
        None => {
            log::warn!("REDIS_URL not set, keeping lobbies in process memory");
            Backend::Memory(MemoryStore::new())
        }
    };

    let state = AppState::new(store, settings.clone());

    // Background presence sweep + disconnect repair
    sync::presence::start(
        state.presence.clone(),
        state.membership.clone(),
        settings.presence_sweep(),
    );

    log::info!("listening on {}", settings.server_addr);
    let data = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(metrics::METRICS.clone())
            .app_data(data.clone())
            .configure(http::routes::init_routes)
            .configure(ws::routes::init_routes)
    })
    .bind(&settings.server_addr)
    .with_context(|| format!("binding {}", settings.server_addr))?
    .run()
    .await?;

    Ok(())
}
