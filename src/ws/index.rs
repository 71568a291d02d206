//! WebSocket endpoint: presence plus live lobby/game updates.

use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_ws::{handle, Message};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::game::types::{GameState, Lobby, LobbyCode};
use crate::game::GameError;
use crate::protocol::{ClientMsg, ServerMsg};
use crate::state::AppState;
use crate::sync::{presence, SyncBridge};

#[derive(Deserialize)]
pub struct WsParams {
    pub code: String,
    pub player_id: String,
}

pub async fn ws_index(
    req: HttpRequest,
    body: web::Payload,
    params: web::Query<WsParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    // 1 · only human roster members may connect
    let code = LobbyCode::parse(&params.code).map_err(GameError::from)?;
    let player_id = params.player_id.clone();
    let lobby = state.membership.get(&code).await?;
    if !lobby.player(&player_id).is_some_and(|p| !p.is_bot) {
        return Err(GameError::UnknownPlayer(player_id).into());
    }

    // 2 · handshake
    let (response, mut session, mut ws_stream) = handle(&req, body)?;

    // 3 · presence
    let presence_session = state.presence.announce(&code, &player_id);
    let mut losses = state.presence.on_loss(&code);

    // 4 · record changes, pushed or polled
    let (tx, mut outbox) = mpsc::unbounded_channel::<ServerMsg>();
    let bridge = SyncBridge::new(state.store.clone(), state.settings.sync_poll_interval());
    let lobby_tx = tx.clone();
    let lobby_sub = bridge.on_state_change::<Lobby, _>(&code, move |change| {
        let _ = lobby_tx.send(ServerMsg::from(change));
    });
    let game_tx = tx;
    let game_sub = bridge.on_state_change::<GameState, _>(&code, move |change| {
        let _ = game_tx.send(ServerMsg::from(change));
    });

    let state = state.into_inner();

    actix::spawn(async move {
        let _subs = (lobby_sub, game_sub);
        let mut left = false;

        let mut greeting = vec![ServerMsg::Welcome {
            code: code.clone(),
            player_id: player_id.clone(),
            session: presence_session,
        }];
        greeting.push(ServerMsg::LobbyChanged {
            lobby: state.membership.get(&code).await.ok(),
        });
        if let Ok(game) = state.turns.get(&code).await {
            if game.players.iter().any(|p| p.is_bot) {
                state.bots.watch(&code);
            }
            greeting.push(ServerMsg::GameChanged { game: Some(game) });
        }
        for msg in greeting {
            if send(&mut session, &msg).await.is_err() {
                break;
            }
        }

        loop {
            tokio::select! {
                // client → server
                Some(frame) = ws_stream.next() => {
                    match frame {
                        Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                            Ok(ClientMsg::Heartbeat) => {
                                state.presence.heartbeat(&code, &player_id, presence_session);
                            }
                            Ok(ClientMsg::Leave) => {
                                if let Err(e) =
                                    presence::leave(&state.presence, &state.membership, &code, &player_id).await
                                {
                                    let _ = send(&mut session, &ServerMsg::from(&e)).await;
                                }
                                left = true;
                                break;
                            }
                            Err(e) => log::debug!("{code}: bad frame from {player_id}: {e}"),
                        },
                        Ok(Message::Ping(bytes)) => {
                            state.presence.heartbeat(&code, &player_id, presence_session);
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Ok(Message::Pong(_)) => {
                            state.presence.heartbeat(&code, &player_id, presence_session);
                        }
                        Ok(Message::Close(_)) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
                // store → client
                Some(msg) = outbox.recv() => {
                    if let Err(e) = send(&mut session, &msg).await {
                        log::warn!("WS send failed for {player_id}: {e:?}");
                        break;
                    }
                }
                // presence → client
                Some(lost) = losses.next() => {
                    if lost != player_id
                        && send(&mut session, &ServerMsg::PresenceLost { player_id: lost }).await.is_err()
                    {
                        break;
                    }
                }
                else => break,
            }
        }

        if !left {
            state.presence.drop_session(&code, &player_id, presence_session);
        }
        drop(losses);
        state.presence.release_feed(&code);
        let _ = session.close(None).await;
        log::info!("WS closed for {player_id} in {code}");
    });

    Ok(response)
}

async fn send(session: &mut actix_ws::Session, msg: &ServerMsg) -> Result<(), actix_ws::Closed> {
    match serde_json::to_string(msg) {
        Ok(json) => session.text(json).await,
        Err(e) => {
            log::warn!("unserialisable server message: {e}");
            Ok(())
        }
    }
}
