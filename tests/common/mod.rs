// tests/common/mod.rs
#![allow(dead_code)]

use snakeladder_server::game::types::{GameState, Lobby, LobbyCode};
use snakeladder_server::game::{Membership, TurnEngine};
use snakeladder_server::store::MemoryStore;

pub struct Table {
    pub store: MemoryStore,
    pub membership: Membership<MemoryStore>,
    pub turns: TurnEngine<MemoryStore>,
    pub code: LobbyCode,
}

/// Lobby hosted by `ids[0]` with everyone else joined and ready, not started.
pub async fn ready_lobby(ids: &[&str]) -> (Table, Lobby) {
    let store = MemoryStore::new();
    let membership = Membership::new(store.clone(), 5);
    let turns = TurnEngine::new(store.clone());

    let lobby = membership
        .create_lobby(ids[0], &ids[0].to_uppercase(), 6)
        .await
        .expect("create lobby");
    let code = lobby.code.clone();
    for id in &ids[1..] {
        membership
            .join_lobby(&code, id, &id.to_uppercase())
            .await
            .expect("join");
        membership.toggle_ready(&code, id, true).await.expect("ready");
    }
    let lobby = membership.get(&code).await.expect("lobby");

    (
        Table {
            store,
            membership,
            turns,
            code,
        },
        lobby,
    )
}

/// Lobby flipped to playing, game record not created yet.
pub async fn started_lobby(ids: &[&str]) -> (Table, Lobby) {
    let (table, _) = ready_lobby(ids).await;
    let lobby = table
        .membership
        .start_game(&table.code, ids[0])
        .await
        .expect("start");
    (table, lobby)
}

/// Started game with turn order `ids`.
pub async fn started_game(ids: &[&str]) -> (Table, GameState) {
    let (table, lobby) = started_lobby(ids).await;
    let game = table.turns.initialize(&lobby).await.expect("initialize");
    (table, game)
}

pub fn roster(game: &GameState) -> Vec<&str> {
    game.players.iter().map(|p| p.id.as_str()).collect()
}
