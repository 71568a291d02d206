pub mod board;
pub mod error;
pub mod session;
pub mod turn;
pub mod types;

pub use error::{GameError, GameResult};
pub use session::{Departure, Membership};
pub use turn::TurnEngine;
