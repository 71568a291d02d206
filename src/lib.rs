//! Snakes & Ladders multiplayer server.
//!
//! `game` is the turn-coordination core (board, turn state machine,
//! lobby membership and disconnect repair). It talks to the outside world
//! only through the injected [`store::StateStore`]. `sync` carries presence
//! tracking and the client-side sync bridge, `http` and `ws` the actix
//! surface.

pub mod config;
pub mod game;
pub mod http;
pub mod metrics;
pub mod protocol;
pub mod state;
pub mod store;
pub mod sync;
pub mod ws;
