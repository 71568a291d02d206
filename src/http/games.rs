//! Turn actions on a running game, plus board lookups for clients.

use actix_web::{get, post, web, HttpResponse};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game::board::{plan_move, shortcuts, Shortcut, FINISH};
use crate::game::types::{LobbyCode, Player};
use crate::game::GameError;
use crate::metrics::TURN_CONFLICTS;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RollReq {
    pub expected_turn_index: usize,
    /// Server rolls when absent.
    pub value: Option<u8>,
}

#[derive(Deserialize)]
pub struct MoveReq {
    pub player_id: String,
    pub final_position: u8,
}

#[derive(Deserialize)]
pub struct WinnerReq {
    pub player_id: String,
}

#[derive(Deserialize)]
pub struct PlanParams {
    pub start: u8,
    pub die: u8,
}

#[derive(Serialize)]
pub struct BoardResp {
    pub finish: u8,
    pub shortcuts: Vec<Shortcut>,
}

/// POST /api/games/{code}: idempotent initialise from the started lobby.
#[post("/games/{code}")]
pub async fn initialize(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    let lobby = state.membership.get(&code).await?;
    let game = state.turns.initialize(&lobby).await?;
    if game.players.iter().any(|p| p.is_bot) {
        state.bots.watch(&code);
    }
    Ok(HttpResponse::Ok().json(game))
}

/// GET /api/games/{code}
#[get("/games/{code}")]
pub async fn get_game(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    Ok(HttpResponse::Ok().json(state.turns.get(&code).await?))
}

/// POST /api/games/{code}/roll
#[post("/games/{code}/roll")]
pub async fn roll(
    path: web::Path<String>,
    info: web::Json<RollReq>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    let value = info
        .value
        .unwrap_or_else(|| rand::rng().random_range(1..=6));
    match state.turns.roll(&code, info.expected_turn_index, value).await {
        Ok(game) => Ok(HttpResponse::Ok().json(game)),
        Err(e @ GameError::TurnConflict { .. }) => {
            TURN_CONFLICTS.inc();
            Err(e)
        }
        Err(e) => Err(e),
    }
}

/// POST /api/games/{code}/move
#[post("/games/{code}/move")]
pub async fn apply_move(
    path: web::Path<String>,
    info: web::Json<MoveReq>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    let game = state
        .turns
        .apply_move(&code, &info.player_id, info.final_position)
        .await?;
    Ok(HttpResponse::Ok().json(game))
}

/// POST /api/games/{code}/complete
#[post("/games/{code}/complete")]
pub async fn complete(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    Ok(HttpResponse::Ok().json(state.turns.complete_turn(&code).await?))
}

/// POST /api/games/{code}/winner
#[post("/games/{code}/winner")]
pub async fn winner(
    path: web::Path<String>,
    info: web::Json<WinnerReq>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    let game = state.turns.declare_winner(&code, &info.player_id).await?;
    Ok(HttpResponse::Ok().json(game))
}

/// POST /api/games/{code}/reset
#[post("/games/{code}/reset")]
pub async fn reset(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    Ok(HttpResponse::Ok().json(state.turns.reset(&code).await?))
}

/// GET /api/games/{code}/standings
#[get("/games/{code}/standings")]
pub async fn standings(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GameError> {
    let code = LobbyCode::parse(&path)?;
    let game = state.turns.get(&code).await?;
    let ranked: Vec<Player> = game.standings().into_iter().cloned().collect();
    Ok(HttpResponse::Ok().json(ranked))
}

/// GET /api/board
#[get("/board")]
pub async fn board() -> HttpResponse {
    HttpResponse::Ok().json(BoardResp {
        finish: FINISH,
        shortcuts: shortcuts().collect(),
    })
}

/// GET /api/board/plan?start=..&die=..
#[get("/board/plan")]
pub async fn plan(web::Query(p): web::Query<PlanParams>) -> Result<HttpResponse, GameError> {
    if p.start > FINISH || !(1..=6).contains(&p.die) {
        return Err(GameError::invalid("start must be 0..=100 and die 1..=6"));
    }
    Ok(HttpResponse::Ok().json(plan_move(p.start, p.die)))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(initialize)
        .service(get_game)
        .service(roll)
        .service(apply_move)
        .service(complete)
        .service(winner)
        .service(reset)
        .service(standings)
        .service(board)
        .service(plan);
}
