mod common;

use common::{roster, started_game};
use futures::stream::BoxStream;
use pretty_assertions::assert_eq;
use snakeladder_server::game::board::{plan_move, FINISH};
use snakeladder_server::game::types::{GameStatus, LobbyCode};
use snakeladder_server::game::{GameError, Membership, TurnEngine};
use snakeladder_server::store::{
    ChangeEvent, InsertOutcome, MemoryStore, Record, RecordKind, StateStore, StoreResult,
};

/// Memory store whose reads hand control back after looking, so callers
/// racing on one task all observe the state from before any of them wrote.
#[derive(Clone)]
struct LaggedReads(MemoryStore);

impl StateStore for LaggedReads {
    async fn read<R: Record>(&self, code: &LobbyCode) -> StoreResult<Option<R>> {
        let seen = self.0.read(code).await;
        tokio::task::yield_now().await;
        seen
    }

    async fn insert<R: Record>(&self, record: &R) -> StoreResult<InsertOutcome> {
        self.0.insert(record).await
    }

    async fn update_if<R, F>(&self, code: &LobbyCode, transition: F) -> StoreResult<Option<R>>
    where
        R: Record,
        F: Fn(&R) -> Option<R> + Send + Sync,
    {
        self.0.update_if(code, transition).await
    }

    async fn put<R: Record>(&self, record: &R) -> StoreResult<()> {
        self.0.put(record).await
    }

    async fn remove(&self, kind: RecordKind, code: &LobbyCode) -> StoreResult<bool> {
        self.0.remove(kind, code).await
    }

    async fn subscribe(
        &self,
        kind: RecordKind,
        code: &LobbyCode,
    ) -> StoreResult<BoxStream<'static, ChangeEvent>> {
        self.0.subscribe(kind, code).await
    }
}

#[tokio::test]
async fn two_players_rolling_same_turn_one_wins() {
    let (t, _) = started_game(&["a", "b"]).await;

    let (first, second) = tokio::join!(t.turns.roll(&t.code, 0, 3), t.turns.roll(&t.code, 0, 5));
    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);

    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(
        loser,
        Err(GameError::TurnConflict {
            current_turn_index: 0
        })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_rolls_single_winner() {
    let (t, _) = started_game(&["a", "b", "c"]).await;

    let handles: Vec<_> = (1..=6u8)
        .map(|v| {
            let turns = t.turns.clone();
            let code = t.code.clone();
            tokio::spawn(async move { turns.roll(&code, 0, v).await })
        })
        .collect();

    let mut wins = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => wins += 1,
            Err(GameError::TurnConflict { .. }) => {}
            Err(e) => panic!("unexpected {e}"),
        }
    }
    assert_eq!(wins, 1);

    let game = t.turns.get(&t.code).await.unwrap();
    assert!(game.is_rolling);
    assert!(game.dice_value.is_some());
}

#[tokio::test]
async fn n_completions_cycle_back() {
    let (t, _) = started_game(&["a", "b", "c", "d"]).await;
    let mut seen = Vec::new();
    for _ in 0..4 {
        let g = t.turns.complete_turn(&t.code).await.unwrap();
        seen.push(g.current_turn_player_id.clone());
    }
    assert_eq!(seen, vec!["b", "c", "d", "a"]);
    assert_eq!(t.turns.get(&t.code).await.unwrap().current_turn_index, 0);
}

#[tokio::test]
async fn lobby_to_turn_conflict() {
    let (t, game) = started_game(&["host", "guest"]).await;
    assert_eq!(roster(&game), vec!["host", "guest"]);
    assert_eq!(game.current_turn_index, 0);

    let rolled = t.turns.roll(&t.code, 0, 6).await.unwrap();
    assert_eq!(rolled.dice_value, Some(6));
    assert!(rolled.is_rolling);

    let moved = t.turns.apply_move(&t.code, "host", 6).await.unwrap();
    assert_eq!(moved.player("host").unwrap().position, 6);

    let next = t.turns.complete_turn(&t.code).await.unwrap();
    assert_eq!(next.current_turn_index, 1);
    assert_eq!(next.dice_value, None);
    assert!(!next.is_rolling);

    // Guest rolls with a stale view of the turn.
    let err = t.turns.roll(&t.code, 0, 5).await.unwrap_err();
    assert!(matches!(
        err,
        GameError::TurnConflict {
            current_turn_index: 1
        }
    ));
}

#[tokio::test]
async fn exact_landing_on_finish_wins() {
    let (t, _) = started_game(&["a", "b"]).await;
    t.turns.apply_move(&t.code, "a", 97).await.unwrap();

    t.turns.roll(&t.code, 0, 3).await.unwrap();
    let plan = plan_move(97, 3);
    assert!(!plan.overshoot);
    assert_eq!(plan.final_cell, FINISH);
    t.turns.apply_move(&t.code, "a", plan.final_cell).await.unwrap();

    let won = t.turns.declare_winner(&t.code, "a").await.unwrap();
    assert_eq!(won.status, GameStatus::Won);
    assert_eq!(won.winner_id.as_deref(), Some("a"));

    assert!(matches!(
        t.turns.roll(&t.code, 0, 2).await,
        Err(GameError::GameOver)
    ));
    assert!(matches!(
        t.turns.complete_turn(&t.code).await,
        Err(GameError::GameOver)
    ));
    assert!(matches!(
        t.turns.apply_move(&t.code, "b", 10).await,
        Err(GameError::GameOver)
    ));
    // Repeating the declaration is harmless.
    assert_eq!(t.turns.declare_winner(&t.code, "a").await.unwrap(), won);
}

#[tokio::test]
async fn ladder_landing_is_persisted_resolved() {
    let (t, _) = started_game(&["a", "b"]).await;
    t.turns.apply_move(&t.code, "a", 1).await.unwrap();
    t.turns.roll(&t.code, 0, 3).await.unwrap();

    let plan = plan_move(1, 3);
    assert_eq!(plan.final_cell, 25);
    let g = t.turns.apply_move(&t.code, "a", plan.final_cell).await.unwrap();
    assert_eq!(g.player("a").unwrap().position, 25);
}

#[tokio::test]
async fn winner_must_stand_on_finish() {
    let (t, _) = started_game(&["a", "b"]).await;
    t.turns.apply_move(&t.code, "a", 50).await.unwrap();

    assert!(matches!(
        t.turns.declare_winner(&t.code, "a").await,
        Err(GameError::InvalidArgument(_))
    ));
    assert!(matches!(
        t.turns.declare_winner(&t.code, "ghost").await,
        Err(GameError::UnknownPlayer(_))
    ));
}

#[tokio::test]
async fn argument_validation() {
    let (t, _) = started_game(&["a", "b"]).await;
    assert!(matches!(
        t.turns.roll(&t.code, 0, 0).await,
        Err(GameError::InvalidArgument(_))
    ));
    assert!(matches!(
        t.turns.roll(&t.code, 0, 7).await,
        Err(GameError::InvalidArgument(_))
    ));
    assert!(matches!(
        t.turns.apply_move(&t.code, "a", 101).await,
        Err(GameError::InvalidArgument(_))
    ));
    assert!(matches!(
        t.turns.apply_move(&t.code, "ghost", 5).await,
        Err(GameError::UnknownPlayer(_))
    ));
}

#[tokio::test]
async fn reset_only_after_a_win() {
    let (t, _) = started_game(&["a", "b"]).await;
    assert!(matches!(
        t.turns.reset(&t.code).await,
        Err(GameError::StillPlaying)
    ));

    t.turns.apply_move(&t.code, "a", FINISH).await.unwrap();
    t.turns.declare_winner(&t.code, "a").await.unwrap();

    let fresh = t.turns.reset(&t.code).await.unwrap();
    assert_eq!(fresh.status, GameStatus::Playing);
    assert_eq!(fresh.winner_id, None);
    assert_eq!(fresh.current_turn_index, 0);
    assert_eq!(roster(&fresh), vec!["a", "b"]);
    assert!(fresh.players.iter().all(|p| p.position == 0));
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let (t, game) = started_game(&["a", "b"]).await;
    t.turns.complete_turn(&t.code).await.unwrap();

    let lobby = t.membership.get(&t.code).await.unwrap();
    let again = t.turns.initialize(&lobby).await.unwrap();
    assert_eq!(again.current_turn_index, 1);
    assert_eq!(again.code, game.code);
}

#[tokio::test]
async fn racing_initializers_share_one_game() {
    let store = LaggedReads(MemoryStore::new());
    let membership = Membership::new(store.clone(), 5);
    let turns = TurnEngine::new(store.clone());

    let lobby = membership.create_lobby("a", "A", 2).await.unwrap();
    membership.join_lobby(&lobby.code, "b", "B").await.unwrap();
    membership.toggle_ready(&lobby.code, "b", true).await.unwrap();
    let lobby = membership.start_game(&lobby.code, "a").await.unwrap();

    // Both see no game, both insert; the loser reads the winner's record.
    let (first, second) = tokio::join!(turns.initialize(&lobby), turns.initialize(&lobby));
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first, second);
    assert_eq!(roster(&first), vec!["a", "b"]);
    assert_eq!(store.0.len(), 2);
}

#[tokio::test]
async fn initialize_refuses_a_roster_of_one() {
    let (t, started) = common::started_lobby(&["a", "b"]).await;
    let mut lonely = started.clone();
    lonely.players.truncate(1);
    t.store.put(&lonely).await.unwrap();

    assert!(matches!(
        t.turns.initialize(&started).await,
        Err(GameError::InsufficientPlayers)
    ));
    assert!(matches!(t.turns.get(&t.code).await, Err(GameError::NotFound)));
}

#[tokio::test]
async fn unknown_game_is_not_found() {
    let (t, _) = common::ready_lobby(&["a", "b"]).await;
    assert!(matches!(t.turns.get(&t.code).await, Err(GameError::NotFound)));
    assert!(matches!(
        t.turns.roll(&t.code, 0, 3).await,
        Err(GameError::NotFound)
    ));
}
