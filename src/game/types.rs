use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::board::FINISH;

pub type PlayerId = String;

pub const CODE_LEN: usize = 6;
pub const CODE_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const MIN_PLAYERS: u8 = 2;
pub const MAX_PLAYERS: u8 = 6;

/// Palette handed out by join index.
pub const PLAYER_COLORS: [&str; 6] = [
    "#e74c3c", "#3498db", "#2ecc71", "#f39c12", "#9b59b6", "#e67e22",
];

pub fn player_color(index: usize) -> String {
    PLAYER_COLORS[index % PLAYER_COLORS.len()].to_string()
}

/// Shareable lobby identity. Always stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LobbyCode(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyCodeError {
    #[error("lobby code must be {expected} chars, got {found}")]
    InvalidLength { expected: usize, found: usize },
    #[error("invalid character '{ch}' at position {index}")]
    InvalidCharacter { ch: char, index: usize },
}

impl LobbyCode {
    /// Case-insensitive parse.
    pub fn parse(value: &str) -> Result<Self, LobbyCodeError> {
        let upper = value.trim().to_ascii_uppercase();
        let found = upper.chars().count();
        if found != CODE_LEN {
            return Err(LobbyCodeError::InvalidLength {
                expected: CODE_LEN,
                found,
            });
        }
        if let Some((index, ch)) = upper
            .chars()
            .enumerate()
            .find(|(_, ch)| !CODE_ALPHABET.contains(*ch))
        {
            return Err(LobbyCodeError::InvalidCharacter { ch, index });
        }
        Ok(Self(upper))
    }

    pub fn generate() -> Self {
        use rand::Rng;

        let alphabet = CODE_ALPHABET.as_bytes();
        let mut rng = rand::rng();
        let code = (0..CODE_LEN)
            .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LobbyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for LobbyCode {
    type Err = LobbyCodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for LobbyCode {
    type Error = LobbyCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LobbyCode> for String {
    fn from(code: LobbyCode) -> Self {
        code.0
    }
}

/// A participant, in the lobby roster and in the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub position: u8,
    pub color: String,
    #[serde(default)]
    pub is_bot: bool,
    /// Lobby phase only.
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub is_host: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: String, color: String) -> Self {
        Self {
            id,
            name,
            position: 0,
            color,
            is_bot: false,
            ready: false,
            is_host: false,
        }
    }

    /// A server-driven seat. Always ready.
    pub fn bot(id: PlayerId, name: String, color: String) -> Self {
        Self {
            is_bot: true,
            ready: true,
            ..Self::new(id, name, color)
        }
    }
}

/// Lobby life-cycle. Never goes back to `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobbyStatus {
    Waiting,
    Playing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lobby {
    pub code: LobbyCode,
    pub host_id: PlayerId,
    pub max_players: u8,
    /// Join order.
    pub players: Vec<Player>,
    pub status: LobbyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lobby {
    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.player(id).is_some()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= usize::from(self.max_players)
    }

    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.ready)
    }

    /// Hands the host flag to `id` on both the roster and `host_id`.
    pub fn set_host(&mut self, id: &str) {
        for p in &mut self.players {
            p.is_host = p.id == id;
            if p.is_host {
                p.ready = true;
            }
        }
        self.host_id = id.to_string();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Game life-cycle. `Won` is terminal until an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Playing,
    Won,
}

/// Authoritative record of an in-progress match, keyed by the lobby code.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub code: LobbyCode,
    /// Turn order.
    pub players: Vec<Player>,
    pub current_turn_index: usize,
    /// Always `players[current_turn_index].id`.
    pub current_turn_player_id: PlayerId,
    pub host_id: PlayerId,
    pub dice_value: Option<u8>,
    pub is_rolling: bool,
    pub status: GameStatus,
    pub winner_id: Option<PlayerId>,
    pub updated_at: DateTime<Utc>,
}

impl GameState {
    /// Fresh game from a lobby roster, join order as turn order.
    ///
    /// Returns `None` for an empty roster.
    pub fn from_lobby(lobby: &Lobby) -> Option<Self> {
        let first = lobby.players.first()?;
        let players = lobby
            .players
            .iter()
            .map(|p| Player {
                position: 0,
                ready: false,
                ..p.clone()
            })
            .collect();

        Some(Self {
            code: lobby.code.clone(),
            current_turn_index: 0,
            current_turn_player_id: first.id.clone(),
            host_id: lobby.host_id.clone(),
            players,
            dice_value: None,
            is_rolling: false,
            status: GameStatus::Playing,
            winner_id: None,
            updated_at: Utc::now(),
        })
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.current_turn_index)
    }

    pub fn is_over(&self) -> bool {
        self.status == GameStatus::Won
    }

    /// Moves the turn to `index` and refreshes the cached turn-holder id.
    pub fn set_turn(&mut self, index: usize) {
        self.current_turn_index = index;
        if let Some(p) = self.players.get(index) {
            self.current_turn_player_id = p.id.clone();
        }
    }

    pub fn advance_turn(&mut self) {
        if self.players.is_empty() {
            return;
        }
        self.set_turn((self.current_turn_index + 1) % self.players.len());
        self.dice_value = None;
        self.is_rolling = false;
    }

    /// Back to the start line with the same roster.
    pub fn reset(&mut self) {
        for p in &mut self.players {
            p.position = 0;
        }
        self.set_turn(0);
        self.dice_value = None;
        self.is_rolling = false;
        self.status = GameStatus::Playing;
        self.winner_id = None;
    }

    /// Drops `departed` from the turn order and repairs the turn pointer.
    ///
    /// An on-turn departure lands on whoever now occupies the same slot
    /// (modulo the shorter roster). Otherwise the current turn-holder keeps
    /// the turn at their new index. A departing host hands the flag to the
    /// first remaining human. Returns `None` when `departed` is not in the
    /// game or nobody would be left.
    pub fn without_player(&self, departed: &str) -> Option<GameState> {
        let idx = self.index_of(departed)?;
        if self.players.len() <= 1 {
            return None;
        }

        let mut next = self.clone();
        let on_turn = idx == self.current_turn_index;
        let was_host = self.host_id == departed;
        next.players.remove(idx);

        let new_index = if on_turn {
            next.dice_value = None;
            next.is_rolling = false;
            self.current_turn_index % next.players.len()
        } else {
            next.index_of(&self.current_turn_player_id)
                .unwrap_or(self.current_turn_index % next.players.len())
        };
        next.set_turn(new_index);

        if was_host {
            let heir = next
                .players
                .iter()
                .find(|p| !p.is_bot)
                .unwrap_or(&next.players[0])
                .id
                .clone();
            for p in &mut next.players {
                p.is_host = p.id == heir;
            }
            next.host_id = heir;
        }
        next.touch();
        Some(next)
    }

    /// Players sorted by position, leader first. Ties keep turn order.
    pub fn standings(&self) -> Vec<&Player> {
        let mut ranked: Vec<&Player> = self.players.iter().collect();
        ranked.sort_by(|a, b| b.position.cmp(&a.position));
        ranked
    }

    pub fn at_finish(&self, id: &str) -> bool {
        self.player(id).is_some_and(|p| p.position == FINISH)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
