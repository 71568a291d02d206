mod common;

use std::time::Duration;

use common::{roster, Table};
use pretty_assertions::assert_eq;
use snakeladder_server::game::types::{GameState, GameStatus};
use snakeladder_server::game::{Membership, TurnEngine};
use snakeladder_server::store::MemoryStore;
use snakeladder_server::sync::bots::bot_on_turn;
use snakeladder_server::sync::BotDriver;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(2);

/// Host "a" against one bot, game initialised, host to move.
async fn versus_bot() -> (Table, BotDriver<MemoryStore>) {
    let store = MemoryStore::new();
    let membership = Membership::new(store.clone(), 5);
    let turns = TurnEngine::new(store.clone());

    let lobby = membership.create_lobby("a", "A", 2).await.unwrap();
    let code = lobby.code.clone();
    membership.add_bot(&code, "a").await.unwrap();
    let lobby = membership.start_game(&code, "a").await.unwrap();
    turns.initialize(&lobby).await.unwrap();

    let driver = BotDriver::new(store.clone(), Duration::ZERO, Duration::from_millis(20));
    (
        Table {
            store,
            membership,
            turns,
            code,
        },
        driver,
    )
}

fn bot(game: &GameState) -> u8 {
    game.player("bot-1").unwrap().position
}

#[tokio::test]
async fn bot_waits_for_its_turn() {
    let (t, driver) = versus_bot().await;
    let before = t.turns.get(&t.code).await.unwrap();
    assert_eq!(roster(&before), vec!["a", "bot-1"]);
    assert!(bot_on_turn(&before).is_none());

    assert_eq!(driver.play_turn_with(&t.code, 3).await.unwrap(), None);
    assert_eq!(t.turns.get(&t.code).await.unwrap(), before);
}

#[tokio::test]
async fn bot_rolls_moves_and_passes_the_turn() {
    let (t, driver) = versus_bot().await;
    t.turns.complete_turn(&t.code).await.unwrap();

    let game = driver.play_turn_with(&t.code, 3).await.unwrap().unwrap();
    assert_eq!(bot(&game), 3);
    assert_eq!(game.current_turn_player_id, "a");
    assert_eq!(game.dice_value, None);
    assert!(!game.is_rolling);

    // Back on the human; nothing to do.
    assert_eq!(driver.play_turn_with(&t.code, 3).await.unwrap(), None);
}

#[tokio::test]
async fn bot_takes_ladders() {
    let (t, driver) = versus_bot().await;
    t.turns.complete_turn(&t.code).await.unwrap();

    let game = driver.play_turn_with(&t.code, 4).await.unwrap().unwrap();
    assert_eq!(bot(&game), 25);
}

#[tokio::test]
async fn bot_overshooting_stays_put() {
    let (t, driver) = versus_bot().await;
    t.turns.apply_move(&t.code, "bot-1", 98).await.unwrap();
    t.turns.complete_turn(&t.code).await.unwrap();

    let game = driver.play_turn_with(&t.code, 5).await.unwrap().unwrap();
    assert_eq!(bot(&game), 98);
    assert_eq!(game.current_turn_player_id, "a");
}

#[tokio::test]
async fn bot_landing_on_finish_wins() {
    let (t, driver) = versus_bot().await;
    t.turns.apply_move(&t.code, "bot-1", 97).await.unwrap();
    t.turns.complete_turn(&t.code).await.unwrap();

    let game = driver.play_turn_with(&t.code, 3).await.unwrap().unwrap();
    assert_eq!(game.status, GameStatus::Won);
    assert_eq!(game.winner_id.as_deref(), Some("bot-1"));
    assert_eq!(driver.play_turn_with(&t.code, 3).await.unwrap(), None);
}

#[tokio::test]
async fn claimed_roll_is_left_alone() {
    let (t, driver) = versus_bot().await;
    let game = t.turns.complete_turn(&t.code).await.unwrap();
    t.turns.roll(&t.code, game.current_turn_index, 2).await.unwrap();

    assert_eq!(driver.play_turn_with(&t.code, 6).await.unwrap(), None);
    let game = t.turns.get(&t.code).await.unwrap();
    assert_eq!(game.dice_value, Some(2));
    assert_eq!(bot(&game), 0);
}

#[tokio::test]
async fn watcher_plays_bot_turns_until_the_game_is_gone() {
    let (t, driver) = versus_bot().await;
    driver.watch(&t.code);
    driver.watch(&t.code);
    assert!(driver.is_watching(&t.code));

    t.turns.complete_turn(&t.code).await.unwrap();
    let game = timeout(WAIT, async {
        loop {
            let game = t.turns.get(&t.code).await.unwrap();
            if game.current_turn_player_id == "a" && bot(&game) > 0 {
                return game;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(game.current_turn_index, 0);
    assert_eq!(game.dice_value, None);

    t.membership.close_lobby(&t.code, "a").await.unwrap();
    timeout(WAIT, async {
        while driver.is_watching(&t.code) {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
