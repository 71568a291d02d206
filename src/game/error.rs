use crate::game::types::{LobbyCodeError, PlayerId};
use crate::store::StoreError;

pub type GameResult<T> = Result<T, GameError>;

/// Every way a lobby or turn operation can be refused.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("lobby or game not found")]
    NotFound,
    #[error("player {0} is not part of this lobby")]
    UnknownPlayer(PlayerId),
    #[error("lobby is full")]
    Full,
    #[error("only the host may do that")]
    Forbidden,
    #[error("need at least 2 players to start")]
    InsufficientPlayers,
    #[error("not every player is ready")]
    NotReady,
    /// Another actor already rolled or advanced this turn. Resync, do not retry.
    #[error("not your turn anymore (turn is now {current_turn_index})")]
    TurnConflict { current_turn_index: usize },
    #[error("game is over")]
    GameOver,
    #[error("game is still in progress")]
    StillPlaying,
    #[error("could not allocate a free lobby code")]
    CodeExhausted,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LobbyCodeError> for GameError {
    fn from(e: LobbyCodeError) -> Self {
        GameError::InvalidArgument(e.to_string())
    }
}

impl GameError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        GameError::InvalidArgument(msg.into())
    }

    /// Short machine-readable tag used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            GameError::InvalidArgument(_) => "invalid_argument",
            GameError::NotFound => "not_found",
            GameError::UnknownPlayer(_) => "unknown_player",
            GameError::Full => "full",
            GameError::Forbidden => "forbidden",
            GameError::InsufficientPlayers => "insufficient_players",
            GameError::NotReady => "not_ready",
            GameError::TurnConflict { .. } => "turn_conflict",
            GameError::GameOver => "game_over",
            GameError::StillPlaying => "still_playing",
            GameError::CodeExhausted => "code_exhausted",
            GameError::Store(_) => "unavailable",
        }
    }
}
