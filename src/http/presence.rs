// src/http/presence.rs
//! Very thin presence API backed by the in-process tracker.

use actix_web::{get, web, HttpResponse};

use crate::game::types::LobbyCode;
use crate::game::GameError;
use crate::state::AppState;

#[get("/presence/{code}")]
pub async fn members(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "online": state.presence.members(&code) })))
}

#[get("/presence/{code}/{player_id}")]
pub async fn online(
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let (code, player_id) = path.into_inner();
    let code = LobbyCode::parse(&code)?;
    let online = state.presence.online(&code, &player_id);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "online": online })))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(members).service(online);
}
