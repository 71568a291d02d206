//! Lobby life-cycle: create, join, ready-up, bots, start, leave, close.

use actix_web::{delete, get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::game::types::{GameState, Lobby, LobbyCode};
use crate::game::GameError;
use crate::state::AppState;
use crate::sync::presence;

//////////////////////////////////////////////////
// DTOs
//////////////////////////////////////////////////

#[derive(Deserialize)]
pub struct CreateReq {
    pub player_id: String,
    pub name: String,
    pub max_players: u8,
}

#[derive(Deserialize)]
pub struct JoinReq {
    pub player_id: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct ReadyReq {
    pub player_id: String,
    pub ready: bool,
}

#[derive(Deserialize)]
pub struct PlayerReq {
    pub player_id: String,
}

#[derive(Serialize)]
pub struct StartResp {
    pub lobby: Lobby,
    pub game: GameState,
}

#[derive(Serialize)]
pub struct LeaveResp {
    /// `None` when the lobby was deleted by this leave.
    pub lobby: Option<Lobby>,
}

//////////////////////////////////////////////////
// POST /api/lobbies
//////////////////////////////////////////////////
#[post("/lobbies")]
pub async fn create(
    info: web::Json<CreateReq>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let lobby = state
        .membership
        .create_lobby(&info.player_id, &info.name, info.max_players)
        .await?;
    Ok(HttpResponse::Created().json(lobby))
}

//////////////////////////////////////////////////
// GET /api/lobbies/{code}
//////////////////////////////////////////////////
#[get("/lobbies/{code}")]
pub async fn get_lobby(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    Ok(HttpResponse::Ok().json(state.membership.get(&code).await?))
}

//////////////////////////////////////////////////
// POST /api/lobbies/{code}/join
//////////////////////////////////////////////////
#[post("/lobbies/{code}/join")]
pub async fn join(
    path: web::Path<String>,
    info: web::Json<JoinReq>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    let lobby = state
        .membership
        .join_lobby(&code, &info.player_id, &info.name)
        .await?;
    Ok(HttpResponse::Ok().json(lobby))
}

//////////////////////////////////////////////////
// POST /api/lobbies/{code}/ready
//////////////////////////////////////////////////
#[post("/lobbies/{code}/ready")]
pub async fn ready(
    path: web::Path<String>,
    info: web::Json<ReadyReq>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    let lobby = state
        .membership
        .toggle_ready(&code, &info.player_id, info.ready)
        .await?;
    Ok(HttpResponse::Ok().json(lobby))
}

//////////////////////////////////////////////////
// POST /api/lobbies/{code}/start
//////////////////////////////////////////////////
/// Starts the lobby and creates (or fetches) its game in one call.
#[post("/lobbies/{code}/start")]
pub async fn start(
    path: web::Path<String>,
    info: web::Json<PlayerReq>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    let lobby = state.membership.start_game(&code, &info.player_id).await?;
    let game = state.turns.initialize(&lobby).await?;
    if game.players.iter().any(|p| p.is_bot) {
        state.bots.watch(&code);
    }
    Ok(HttpResponse::Ok().json(StartResp { lobby, game }))
}

//////////////////////////////////////////////////
// POST /api/lobbies/{code}/bots
//////////////////////////////////////////////////
#[post("/lobbies/{code}/bots")]
pub async fn add_bot(
    path: web::Path<String>,
    info: web::Json<PlayerReq>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    let lobby = state.membership.add_bot(&code, &info.player_id).await?;
    Ok(HttpResponse::Ok().json(lobby))
}

//////////////////////////////////////////////////
// DELETE /api/lobbies/{code}/bots/{bot_id}?player_id=..
//////////////////////////////////////////////////
#[delete("/lobbies/{code}/bots/{bot_id}")]
pub async fn remove_bot(
    path: web::Path<(String, String)>,
    web::Query(who): web::Query<PlayerReq>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let (code, bot_id) = path.into_inner();
    let code = LobbyCode::parse(&code)?;
    let lobby = state
        .membership
        .remove_bot(&code, &who.player_id, &bot_id)
        .await?;
    Ok(HttpResponse::Ok().json(lobby))
}

//////////////////////////////////////////////////
// POST /api/lobbies/{code}/leave
//////////////////////////////////////////////////
#[post("/lobbies/{code}/leave")]
pub async fn leave(
    path: web::Path<String>,
    info: web::Json<PlayerReq>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    let lobby = presence::leave(&state.presence, &state.membership, &code, &info.player_id).await?;
    Ok(HttpResponse::Ok().json(LeaveResp { lobby }))
}

//////////////////////////////////////////////////
// DELETE /api/lobbies/{code}?player_id=..
//////////////////////////////////////////////////
#[delete("/lobbies/{code}")]
pub async fn close(
    path: web::Path<String>,
    web::Query(who): web::Query<PlayerReq>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    state.membership.close_lobby(&code, &who.player_id).await?;
    state.presence.forget_game(&code);
    Ok(HttpResponse::NoContent().finish())
}

//////////////////////////////////////////////////
// Mount
//////////////////////////////////////////////////
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create)
        .service(get_lobby)
        .service(join)
        .service(ready)
        .service(start)
        .service(add_bot)
        .service(remove_bot)
        .service(leave)
        .service(close);
}
