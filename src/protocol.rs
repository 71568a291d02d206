//! Wire-protocol shared by the WS handler and its clients.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::types::{GameState, Lobby, LobbyCode, PlayerId};
use crate::game::GameError;
use crate::store::Change;

// ---------- client → server ----------
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    /// Keeps the socket's presence entry fresh.
    Heartbeat,
    /// Explicit leave; the socket closes afterwards.
    Leave,
}

// ---------- server → client ----------
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum ServerMsg {
    Welcome {
        code: LobbyCode,
        player_id: PlayerId,
        session: Uuid,
    },
    /// `lobby` is `None` once the lobby has been deleted.
    LobbyChanged { lobby: Option<Lobby> },
    /// `game` is `None` once the game has been deleted.
    GameChanged { game: Option<GameState> },
    PresenceLost { player_id: PlayerId },
    Error { error: String, message: String },
}

impl From<Change<Lobby>> for ServerMsg {
    fn from(change: Change<Lobby>) -> Self {
        ServerMsg::LobbyChanged {
            lobby: change.record().cloned(),
        }
    }
}

impl From<Change<GameState>> for ServerMsg {
    fn from(change: Change<GameState>) -> Self {
        ServerMsg::GameChanged {
            game: change.record().cloned(),
        }
    }
}

impl From<&GameError> for ServerMsg {
    fn from(e: &GameError) -> Self {
        ServerMsg::Error {
            error: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}
