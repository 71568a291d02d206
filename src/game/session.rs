//! Lobby roster life-cycle and mid-game departure repair.
//!
//! ✔ unique 6-char codes (insert-unique, bounded retries)
//! ✔ idempotent join, ready-up, host-only start
//! ✔ host teardown while waiting, host migration while playing
//! ✔ turn-order repair when a player drops out mid-game
//! ✔ host-seated bots

use std::sync::Arc;

use chrono::Utc;

use crate::game::error::{GameError, GameResult};
use crate::game::types::{
    player_color, GameState, Lobby, LobbyCode, LobbyStatus, Player, MAX_PLAYERS, MIN_PLAYERS,
};
use crate::store::{InsertOutcome, RecordKind, StateStore};

const MAX_NAME_LEN: usize = 32;
const MAX_PLAYER_ID_LEN: usize = 64;

type CodeSource = Arc<dyn Fn() -> LobbyCode + Send + Sync>;

/// What a departure did to the lobby and game.
#[derive(Debug, Clone, PartialEq)]
pub enum Departure {
    /// The player was not (or no longer) on the roster; nothing changed.
    NotMember,
    /// The host left a waiting lobby; lobby and game are gone.
    TornDown,
    /// At most one player would remain; lobby and game are gone and the
    /// remaining clients should return to lobby selection.
    Abandoned,
    /// Removed from a waiting lobby.
    Left(Lobby),
    /// Removed from a started lobby before its game record existed.
    LeftStarted(Lobby),
    /// Removed mid-game with the turn order repaired.
    Repaired { lobby: Option<Lobby>, game: GameState },
}

#[derive(Clone)]
pub struct Membership<S> {
    store: S,
    code_attempts: usize,
    codes: CodeSource,
}

pub(crate) fn validate_player_id(id: &str) -> GameResult<()> {
    if id.trim().is_empty() || id.len() > MAX_PLAYER_ID_LEN {
        return Err(GameError::invalid(format!(
            "player id must be 1..={MAX_PLAYER_ID_LEN} chars"
        )));
    }
    Ok(())
}

fn clean_name(name: &str) -> GameResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(GameError::invalid(format!(
            "name must be 1..={MAX_NAME_LEN} chars"
        )));
    }
    Ok(name.to_string())
}

/// Whether a match can go on once `departed` is gone: at least two
/// players left and one of them human.
fn playable_without(players: &[Player], departed: &str) -> bool {
    let (mut left, mut humans) = (0usize, 0usize);
    for p in players.iter().filter(|p| p.id != departed) {
        left += 1;
        humans += usize::from(!p.is_bot);
    }
    left >= usize::from(MIN_PLAYERS) && humans > 0
}

/// First free `bot-N` seat for `lobby`.
fn next_bot(lobby: &Lobby) -> Player {
    let n = (1..=usize::from(MAX_PLAYERS))
        .find(|n| !lobby.contains(&format!("bot-{n}")))
        .unwrap_or(lobby.players.len() + 1);
    Player::bot(
        format!("bot-{n}"),
        format!("Bot {n}"),
        player_color(lobby.players.len()),
    )
}

/// `Ok(true)` when the lobby is already playing.
fn check_startable(lobby: &Lobby, requester: &str) -> GameResult<bool> {
    if lobby.host_id != requester {
        return Err(GameError::Forbidden);
    }
    if lobby.status == LobbyStatus::Playing {
        return Ok(true);
    }
    if lobby.players.len() < usize::from(MIN_PLAYERS) {
        return Err(GameError::InsufficientPlayers);
    }
    if !lobby.all_ready() {
        return Err(GameError::NotReady);
    }
    Ok(false)
}

impl<S: StateStore> Membership<S> {
    pub fn new(store: S, code_attempts: usize) -> Self {
        Self {
            store,
            code_attempts: code_attempts.max(1),
            codes: Arc::new(LobbyCode::generate),
        }
    }

    /// Replaces the random code generator.
    pub fn with_code_source(mut self, codes: impl Fn() -> LobbyCode + Send + Sync + 'static) -> Self {
        self.codes = Arc::new(codes);
        self
    }

    pub async fn get(&self, code: &LobbyCode) -> GameResult<Lobby> {
        self.store
            .read::<Lobby>(code)
            .await?
            .ok_or(GameError::NotFound)
    }

    /// Opens a lobby with the host as its only, ready member.
    pub async fn create_lobby(
        &self,
        host_id: &str,
        host_name: &str,
        max_players: u8,
    ) -> GameResult<Lobby> {
        validate_player_id(host_id)?;
        let host_name = clean_name(host_name)?;
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&max_players) {
            return Err(GameError::invalid(format!(
                "max players must be {MIN_PLAYERS}..={MAX_PLAYERS}"
            )));
        }

        let mut host = Player::new(host_id.to_string(), host_name, player_color(0));
        host.ready = true;
        host.is_host = true;

        for attempt in 1..=self.code_attempts {
            let now = Utc::now();
            let lobby = Lobby {
                code: (self.codes)(),
                host_id: host_id.to_string(),
                max_players,
                players: vec![host.clone()],
                status: LobbyStatus::Waiting,
                created_at: now,
                updated_at: now,
            };
            match self.store.insert(&lobby).await? {
                InsertOutcome::Inserted => {
                    log::info!("lobby {} created by {host_id}", lobby.code);
                    return Ok(lobby);
                }
                InsertOutcome::Duplicate => {
                    log::debug!("lobby code {} taken (attempt {attempt})", lobby.code);
                }
            }
        }
        Err(GameError::CodeExhausted)
    }

    /// Adds a player to a waiting lobby. Joining twice returns the lobby as is.
    pub async fn join_lobby(&self, code: &LobbyCode, player_id: &str, name: &str) -> GameResult<Lobby> {
        validate_player_id(player_id)?;
        let name = clean_name(name)?;

        let lobby = self
            .store
            .read::<Lobby>(code)
            .await?
            .filter(|l| l.status == LobbyStatus::Waiting)
            .ok_or(GameError::NotFound)?;
        if lobby.contains(player_id) {
            return Ok(lobby);
        }
        if lobby.is_full() {
            return Err(GameError::Full);
        }

        let joined = self
            .store
            .update_if::<Lobby, _>(code, |l| {
                if l.status != LobbyStatus::Waiting || l.contains(player_id) || l.is_full() {
                    return None;
                }
                let mut next = l.clone();
                let color = player_color(next.players.len());
                next.players
                    .push(Player::new(player_id.to_string(), name.clone(), color));
                next.touch();
                Some(next)
            })
            .await?;
        if let Some(lobby) = joined {
            log::info!("{player_id} joined lobby {code}");
            return Ok(lobby);
        }

        match self.store.read::<Lobby>(code).await? {
            Some(l) if l.status == LobbyStatus::Waiting && l.contains(player_id) => Ok(l),
            Some(l) if l.status == LobbyStatus::Waiting && l.is_full() => Err(GameError::Full),
            _ => Err(GameError::NotFound),
        }
    }

    /// Seats a server-driven bot in a waiting lobby. Host only.
    pub async fn add_bot(&self, code: &LobbyCode, requester_id: &str) -> GameResult<Lobby> {
        let lobby = self
            .store
            .read::<Lobby>(code)
            .await?
            .filter(|l| l.status == LobbyStatus::Waiting)
            .ok_or(GameError::NotFound)?;
        if lobby.host_id != requester_id {
            return Err(GameError::Forbidden);
        }
        if lobby.is_full() {
            return Err(GameError::Full);
        }

        let seated = self
            .store
            .update_if::<Lobby, _>(code, |l| {
                if l.status != LobbyStatus::Waiting || l.host_id != requester_id || l.is_full() {
                    return None;
                }
                let mut next = l.clone();
                next.players.push(next_bot(l));
                next.touch();
                Some(next)
            })
            .await?;
        if let Some(lobby) = seated {
            log::info!("{code}: bot seated ({} players)", lobby.players.len());
            return Ok(lobby);
        }

        match self.store.read::<Lobby>(code).await? {
            Some(l) if l.status == LobbyStatus::Waiting && l.host_id != requester_id => {
                Err(GameError::Forbidden)
            }
            Some(l) if l.status == LobbyStatus::Waiting => Err(GameError::Full),
            _ => Err(GameError::NotFound),
        }
    }

    /// Unseats a bot from a waiting lobby. Host only.
    pub async fn remove_bot(&self, code: &LobbyCode, requester_id: &str, bot_id: &str) -> GameResult<Lobby> {
        let lobby = self
            .store
            .read::<Lobby>(code)
            .await?
            .filter(|l| l.status == LobbyStatus::Waiting)
            .ok_or(GameError::NotFound)?;
        if lobby.host_id != requester_id {
            return Err(GameError::Forbidden);
        }
        if !lobby.player(bot_id).is_some_and(|p| p.is_bot) {
            return Err(GameError::UnknownPlayer(bot_id.to_string()));
        }

        let removed = self
            .store
            .update_if::<Lobby, _>(code, |l| {
                if l.status != LobbyStatus::Waiting || !l.player(bot_id).is_some_and(|p| p.is_bot) {
                    return None;
                }
                let mut next = l.clone();
                next.players.retain(|p| p.id != bot_id);
                next.touch();
                Some(next)
            })
            .await?;
        match removed {
            Some(lobby) => {
                log::info!("{code}: {bot_id} unseated");
                Ok(lobby)
            }
            None => Err(GameError::UnknownPlayer(bot_id.to_string())),
        }
    }

    /// Sets one member's ready flag. The host and bots always stay ready.
    pub async fn toggle_ready(&self, code: &LobbyCode, player_id: &str, ready: bool) -> GameResult<Lobby> {
        let updated = self
            .store
            .update_if::<Lobby, _>(code, |l| {
                let idx = l.players.iter().position(|p| p.id == player_id)?;
                let p = &l.players[idx];
                if p.is_host || p.is_bot || p.ready == ready {
                    return None;
                }
                let mut next = l.clone();
                next.players[idx].ready = ready;
                next.touch();
                Some(next)
            })
            .await?;
        if let Some(lobby) = updated {
            return Ok(lobby);
        }

        let lobby = self.get(code).await?;
        if lobby.contains(player_id) {
            Ok(lobby)
        } else {
            Err(GameError::UnknownPlayer(player_id.to_string()))
        }
    }

    /// Flips the lobby to playing. Host only; later calls are no-ops.
    pub async fn start_game(&self, code: &LobbyCode, requester_id: &str) -> GameResult<Lobby> {
        let lobby = self.get(code).await?;
        if check_startable(&lobby, requester_id)? {
            return Ok(lobby);
        }

        let started = self
            .store
            .update_if::<Lobby, _>(code, |l| {
                if !matches!(check_startable(l, requester_id), Ok(false)) {
                    return None;
                }
                let mut next = l.clone();
                next.status = LobbyStatus::Playing;
                next.touch();
                Some(next)
            })
            .await?;
        if let Some(lobby) = started {
            log::info!("lobby {code} started by {requester_id}");
            return Ok(lobby);
        }

        let lobby = self.get(code).await?;
        check_startable(&lobby, requester_id)?;
        Ok(lobby)
    }

    /// Explicit leave. `None` when the lobby no longer exists afterwards.
    pub async fn leave(&self, code: &LobbyCode, player_id: &str) -> GameResult<Option<Lobby>> {
        let lobby = self.get(code).await?;
        if !lobby.contains(player_id) {
            return Err(GameError::UnknownPlayer(player_id.to_string()));
        }

        let departure = match lobby.status {
            LobbyStatus::Waiting => self.leave_waiting(&lobby, player_id).await?,
            LobbyStatus::Playing => self.repair_departure(code, player_id).await?,
        };
        match departure {
            Departure::Left(lobby) | Departure::LeftStarted(lobby) => Ok(Some(lobby)),
            Departure::Repaired { lobby, .. } => Ok(lobby),
            Departure::TornDown | Departure::Abandoned => Ok(None),
            Departure::NotMember => self.store.read::<Lobby>(code).await.map_err(Into::into),
        }
    }

    /// Host-only deletion of the lobby and its game.
    pub async fn close_lobby(&self, code: &LobbyCode, requester_id: &str) -> GameResult<()> {
        let lobby = self.get(code).await?;
        if lobby.host_id != requester_id {
            return Err(GameError::Forbidden);
        }
        self.teardown(code).await?;
        log::info!("lobby {code} closed by host");
        Ok(())
    }

    /// Removes a player whose session ended without an explicit leave.
    ///
    /// Safe to call repeatedly for the same player: once they are gone the
    /// call reports [`Departure::NotMember`].
    pub async fn repair_departure(&self, code: &LobbyCode, player_id: &str) -> GameResult<Departure> {
        if let Some(game) = self.store.read::<GameState>(code).await? {
            return self.repair_game(code, player_id, &game).await;
        }
        match self.store.read::<Lobby>(code).await? {
            Some(lobby) if lobby.contains(player_id) => match lobby.status {
                LobbyStatus::Waiting => self.leave_waiting(&lobby, player_id).await,
                LobbyStatus::Playing => self.leave_started(&lobby, player_id).await,
            },
            _ => Ok(Departure::NotMember),
        }
    }

    async fn repair_game(&self, code: &LobbyCode, player_id: &str, game: &GameState) -> GameResult<Departure> {
        if game.index_of(player_id).is_none() {
            return Ok(Departure::NotMember);
        }
        if !playable_without(&game.players, player_id) {
            self.teardown(code).await?;
            log::info!("game {code} abandoned after {player_id} left");
            return Ok(Departure::Abandoned);
        }

        let repaired = self
            .store
            .update_if::<GameState, _>(code, |g| {
                if !playable_without(&g.players, player_id) {
                    return None;
                }
                g.without_player(player_id)
            })
            .await?;

        let Some(game) = repaired else {
            // Lost a race with another repair; judge from the fresh record.
            return match self.store.read::<GameState>(code).await? {
                Some(g) if g.index_of(player_id).is_some() && !playable_without(&g.players, player_id) => {
                    self.teardown(code).await?;
                    Ok(Departure::Abandoned)
                }
                _ => Ok(Departure::NotMember),
            };
        };
        log::info!(
            "{code}: {player_id} dropped, turn now {} ({}), host {}",
            game.current_turn_index,
            game.current_turn_player_id,
            game.host_id
        );

        let host_id = game.host_id.clone();
        let lobby = self
            .store
            .update_if::<Lobby, _>(code, |l| {
                let mut next = l.clone();
                next.players.retain(|p| p.id != player_id);
                if next.contains(&host_id) {
                    next.set_host(&host_id);
                }
                next.touch();
                Some(next)
            })
            .await?;

        Ok(Departure::Repaired { lobby, game })
    }

    /// Departure between `start_game` and the game record being created.
    async fn leave_started(&self, lobby: &Lobby, player_id: &str) -> GameResult<Departure> {
        let code = &lobby.code;
        if !playable_without(&lobby.players, player_id) {
            self.teardown(code).await?;
            log::info!("lobby {code} abandoned after {player_id} left before the first turn");
            return Ok(Departure::Abandoned);
        }

        let left = self
            .store
            .update_if::<Lobby, _>(code, |l| {
                if !l.contains(player_id) || !playable_without(&l.players, player_id) {
                    return None;
                }
                let mut next = l.clone();
                next.players.retain(|p| p.id != player_id);
                if next.host_id == player_id {
                    let heir = next.players.iter().find(|p| !p.is_bot)?.id.clone();
                    next.set_host(&heir);
                }
                next.touch();
                Some(next)
            })
            .await?;

        let Some(lobby) = left else {
            return match self.store.read::<Lobby>(code).await? {
                Some(l) if l.contains(player_id) => {
                    self.teardown(code).await?;
                    Ok(Departure::Abandoned)
                }
                _ => Ok(Departure::NotMember),
            };
        };
        log::info!("{player_id} left started lobby {code}, host {}", lobby.host_id);

        // A game built from the old roster may have landed meanwhile.
        if let Some(game) = self.store.read::<GameState>(code).await? {
            if game.index_of(player_id).is_some() {
                return self.repair_game(code, player_id, &game).await;
            }
        }
        Ok(Departure::LeftStarted(lobby))
    }

    async fn leave_waiting(&self, lobby: &Lobby, player_id: &str) -> GameResult<Departure> {
        if lobby.host_id == player_id {
            self.teardown(&lobby.code).await?;
            log::info!("host left lobby {}, lobby deleted", lobby.code);
            return Ok(Departure::TornDown);
        }

        let left = self
            .store
            .update_if::<Lobby, _>(&lobby.code, |l| {
                if !l.contains(player_id) {
                    return None;
                }
                let mut next = l.clone();
                next.players.retain(|p| p.id != player_id);
                next.touch();
                Some(next)
            })
            .await?;
        match left {
            Some(lobby) => {
                log::info!("{player_id} left lobby {}", lobby.code);
                Ok(Departure::Left(lobby))
            }
            None => Ok(Departure::NotMember),
        }
    }

    async fn teardown(&self, code: &LobbyCode) -> GameResult<()> {
        self.store.remove(RecordKind::Game, code).await?;
        self.store.remove(RecordKind::Lobby, code).await?;
        Ok(())
    }
}
