//! Turn state machine.
//!
//! Sole writer of the turn pointer, dice value, rolling flag, status and
//! winner of a [`GameState`]. The only compare-and-swap that matters for
//! correctness is the turn lock in [`TurnEngine::roll`]; everything else
//! goes through `update_if` so a concurrent roster repair is never lost.

use crate::game::board::FINISH;
use crate::game::error::{GameError, GameResult};
use crate::game::types::{GameState, GameStatus, Lobby, LobbyCode, LobbyStatus, MIN_PLAYERS};
use crate::store::{InsertOutcome, StateStore};

#[derive(Clone)]
pub struct TurnEngine<S> {
    store: S,
}

impl<S: StateStore> TurnEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn get(&self, code: &LobbyCode) -> GameResult<GameState> {
        self.store
            .read::<GameState>(code)
            .await?
            .ok_or(GameError::NotFound)
    }

    /// Creates the game for a started lobby, or returns the one that exists.
    ///
    /// The roster comes from the stored lobby, not from `lobby`, so players
    /// who left after the snapshot was taken are not dealt in. Several
    /// clients may race to start the same game; the store's unique insert
    /// decides and every loser gets the winner's record back.
    pub async fn initialize(&self, lobby: &Lobby) -> GameResult<GameState> {
        let code = &lobby.code;
        if let Some(existing) = self.store.read::<GameState>(code).await? {
            return Ok(existing);
        }
        let lobby = self
            .store
            .read::<Lobby>(code)
            .await?
            .ok_or(GameError::NotFound)?;
        if lobby.status != LobbyStatus::Playing {
            return Err(GameError::invalid("lobby has not been started"));
        }
        if lobby.players.len() < usize::from(MIN_PLAYERS) {
            return Err(GameError::InsufficientPlayers);
        }

        let game = GameState::from_lobby(&lobby).ok_or(GameError::InsufficientPlayers)?;
        match self.store.insert(&game).await? {
            InsertOutcome::Inserted => {
                log::info!(
                    "game {} started with {} players",
                    game.code,
                    game.players.len()
                );
                Ok(game)
            }
            InsertOutcome::Duplicate => {
                log::debug!("game {} already created by another client", lobby.code);
                self.get(&lobby.code).await
            }
        }
    }

    /// Claims the current turn's roll.
    ///
    /// Succeeds only if the stored turn index still equals
    /// `expected_turn_index` and nobody has rolled for it yet.
    pub async fn roll(
        &self,
        code: &LobbyCode,
        expected_turn_index: usize,
        value: u8,
    ) -> GameResult<GameState> {
        if !(1..=6).contains(&value) {
            return Err(GameError::invalid(format!("dice value {value} outside 1..=6")));
        }

        let rolled = self
            .store
            .update_if::<GameState, _>(code, |g| {
                if g.status != GameStatus::Playing
                    || g.current_turn_index != expected_turn_index
                    || g.is_rolling
                {
                    return None;
                }
                let mut next = g.clone();
                next.dice_value = Some(value);
                next.is_rolling = true;
                next.touch();
                Some(next)
            })
            .await?;

        match rolled {
            Some(game) => {
                log::debug!("{code}: turn {expected_turn_index} rolled {value}");
                Ok(game)
            }
            None => {
                let game = self.get(code).await?;
                if game.is_over() {
                    return Err(GameError::GameOver);
                }
                log::debug!(
                    "{code}: roll for turn {expected_turn_index} lost, turn is {}",
                    game.current_turn_index
                );
                Err(GameError::TurnConflict {
                    current_turn_index: game.current_turn_index,
                })
            }
        }
    }

    /// Persists a player's resting cell once the roll has been animated.
    pub async fn apply_move(
        &self,
        code: &LobbyCode,
        player_id: &str,
        final_position: u8,
    ) -> GameResult<GameState> {
        if final_position > FINISH {
            return Err(GameError::invalid(format!(
                "position {final_position} outside 0..={FINISH}"
            )));
        }

        let moved = self
            .store
            .update_if::<GameState, _>(code, |g| {
                if g.status != GameStatus::Playing {
                    return None;
                }
                let idx = g.index_of(player_id)?;
                let mut next = g.clone();
                next.players[idx].position = final_position;
                next.touch();
                Some(next)
            })
            .await?;

        match moved {
            Some(game) => {
                if game.current_turn_player_id != player_id {
                    log::warn!(
                        "{code}: {player_id} moved outside their turn (turn holder {})",
                        game.current_turn_player_id
                    );
                }
                Ok(game)
            }
            None => {
                let game = self.get(code).await?;
                if game.is_over() {
                    Err(GameError::GameOver)
                } else {
                    Err(GameError::UnknownPlayer(player_id.to_string()))
                }
            }
        }
    }

    /// Hands the turn to the next player and clears the roll.
    ///
    /// Advances from the index observed on entry, so two clients completing
    /// the same turn move it forward once.
    pub async fn complete_turn(&self, code: &LobbyCode) -> GameResult<GameState> {
        let observed = self.get(code).await?;
        if observed.is_over() {
            return Err(GameError::GameOver);
        }
        let from = observed.current_turn_index;

        let advanced = self
            .store
            .update_if::<GameState, _>(code, |g| {
                if g.status != GameStatus::Playing || g.current_turn_index != from {
                    return None;
                }
                let mut next = g.clone();
                next.advance_turn();
                next.touch();
                Some(next)
            })
            .await?;

        match advanced {
            Some(game) => {
                log::info!(
                    "{code}: turn {from} -> {} ({})",
                    game.current_turn_index,
                    game.current_turn_player_id
                );
                Ok(game)
            }
            None => {
                let game = self.get(code).await?;
                if game.is_over() {
                    return Err(GameError::GameOver);
                }
                log::debug!("{code}: turn {from} already completed");
                Ok(game)
            }
        }
    }

    /// Ends the game. The winner must be standing on cell 100.
    pub async fn declare_winner(&self, code: &LobbyCode, player_id: &str) -> GameResult<GameState> {
        let won = self
            .store
            .update_if::<GameState, _>(code, |g| {
                if g.status != GameStatus::Playing || !g.at_finish(player_id) {
                    return None;
                }
                let mut next = g.clone();
                next.status = GameStatus::Won;
                next.winner_id = Some(player_id.to_string());
                next.dice_value = None;
                next.is_rolling = false;
                next.touch();
                Some(next)
            })
            .await?;

        if let Some(game) = won {
            log::info!("{code}: {player_id} wins");
            return Ok(game);
        }

        let game = self.get(code).await?;
        if game.is_over() {
            return if game.winner_id.as_deref() == Some(player_id) {
                Ok(game)
            } else {
                Err(GameError::GameOver)
            };
        }
        match game.player(player_id) {
            None => Err(GameError::UnknownPlayer(player_id.to_string())),
            Some(p) => Err(GameError::invalid(format!(
                "{player_id} is on cell {}, not {FINISH}",
                p.position
            ))),
        }
    }

    /// Play again with the same roster. Only a finished game can be reset.
    pub async fn reset(&self, code: &LobbyCode) -> GameResult<GameState> {
        let reset = self
            .store
            .update_if::<GameState, _>(code, |g| {
                if g.status != GameStatus::Won {
                    return None;
                }
                let mut next = g.clone();
                next.reset();
                next.touch();
                Some(next)
            })
            .await?;

        match reset {
            Some(game) => {
                log::info!("{code}: reset");
                Ok(game)
            }
            None => {
                self.get(code).await?;
                Err(GameError::StillPlaying)
            }
        }
    }
}
