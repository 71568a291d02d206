//! Server-driven bot seats.
//!
//! A bot takes its turn the way a client would: claim the roll through the
//! turn lock, persist the planned landing cell, then hand the turn on (or
//! claim the win). Losing the lock means another driver already moved it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use crate::game::board::plan_move;
use crate::game::types::{GameState, GameStatus, LobbyCode, Player};
use crate::game::{GameError, GameResult, TurnEngine};
use crate::store::{Change, StateStore};
use crate::sync::SyncBridge;

/// The bot holding the turn, if it has not rolled yet.
pub fn bot_on_turn(game: &GameState) -> Option<&Player> {
    if game.status != GameStatus::Playing || game.is_rolling {
        return None;
    }
    game.current_player().filter(|p| p.is_bot)
}

#[derive(Clone)]
pub struct BotDriver<S> {
    turns: TurnEngine<S>,
    bridge: SyncBridge<S>,
    think: Duration,
    recheck: Duration,
    watched: Arc<DashMap<LobbyCode, ()>>,
}

impl<S: StateStore> BotDriver<S> {
    /// `think` is the pause before each bot roll; `recheck` bounds how long
    /// a watcher sleeps without a change notification.
    pub fn new(store: S, think: Duration, recheck: Duration) -> Self {
        Self {
            turns: TurnEngine::new(store.clone()),
            bridge: SyncBridge::new(store, recheck),
            think,
            recheck,
            watched: Arc::new(DashMap::new()),
        }
    }

    pub fn is_watching(&self, code: &LobbyCode) -> bool {
        self.watched.contains_key(code)
    }

    /// Plays the current turn with a random die if a bot holds it.
    pub async fn play_turn(&self, code: &LobbyCode) -> GameResult<Option<GameState>> {
        let die = rand::rng().random_range(1..=6);
        self.play_turn_with(code, die).await
    }

    /// Plays the current turn with `die` if a bot holds it.
    ///
    /// `Ok(None)` when a human holds the turn, the roll is already claimed
    /// or the game has ended.
    pub async fn play_turn_with(&self, code: &LobbyCode, die: u8) -> GameResult<Option<GameState>> {
        let game = self.turns.get(code).await?;
        let Some(bot) = bot_on_turn(&game) else {
            return Ok(None);
        };
        let (bot_id, start) = (bot.id.clone(), bot.position);

        match self.turns.roll(code, game.current_turn_index, die).await {
            Ok(_) => {}
            Err(GameError::TurnConflict { .. } | GameError::GameOver) => return Ok(None),
            Err(e) => return Err(e),
        }

        let plan = plan_move(start, die);
        if plan.final_cell != start {
            self.turns.apply_move(code, &bot_id, plan.final_cell).await?;
        }
        let game = if plan.wins {
            self.turns.declare_winner(code, &bot_id).await?
        } else {
            self.turns.complete_turn(code).await?
        };
        log::info!("{code}: {bot_id} rolled {die}, {start} -> {}", plan.final_cell);
        Ok(Some(game))
    }

    /// Keeps bot turns flowing in `code` until its game is deleted.
    /// Watching a code twice is a no-op.
    pub fn watch(&self, code: &LobbyCode) {
        if self.watched.insert(code.clone(), ()).is_some() {
            return;
        }
        let driver = self.clone();
        let code = code.clone();
        tokio::spawn(async move {
            driver.drive(&code).await;
            driver.watched.remove(&code);
            log::debug!("{code}: bot driver stopped");
        });
    }

    async fn drive(&self, code: &LobbyCode) {
        let (tx, mut changes) = mpsc::unbounded_channel();
        let _sub = self
            .bridge
            .on_state_change::<GameState, _>(code, move |change| {
                let _ = tx.send(change);
            });

        loop {
            match self.turns.get(code).await {
                Ok(game) if bot_on_turn(&game).is_some() => {
                    sleep(self.think).await;
                    if let Err(e) = self.play_turn(code).await {
                        log::warn!("{code}: bot turn failed: {e}");
                    }
                    // Our own writes; the next read covers them.
                    while changes.try_recv().is_ok() {}
                    continue;
                }
                Ok(_) => {}
                Err(GameError::NotFound) => return,
                Err(e) => log::warn!("{code}: bot driver read failed: {e}"),
            }

            match timeout(self.recheck, changes.recv()).await {
                Ok(Some(Change::Deleted)) => return,
                Ok(Some(_)) | Err(_) => {}
                Ok(None) => sleep(self.recheck).await,
            }
        }
    }
}
