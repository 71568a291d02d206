//! `GameError` → HTTP response.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

use crate::game::GameError;

impl ResponseError for GameError {
    fn status_code(&self) -> StatusCode {
        match self {
            GameError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            GameError::NotFound | GameError::UnknownPlayer(_) => StatusCode::NOT_FOUND,
            GameError::Forbidden => StatusCode::FORBIDDEN,
            GameError::Full
            | GameError::InsufficientPlayers
            | GameError::NotReady
            | GameError::TurnConflict { .. }
            | GameError::GameOver
            | GameError::StillPlaying => StatusCode::CONFLICT,
            GameError::CodeExhausted | GameError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let GameError::Store(e) = self {
            log::warn!("store error: {e}");
        }
        let mut body = json!({ "error": self.kind(), "message": self.to_string() });
        if let GameError::TurnConflict { current_turn_index } = self {
            body["current_turn_index"] = json!(current_turn_index);
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}
