pub mod error;
pub mod games;
pub mod health;
pub mod lobby;
pub mod presence;
pub mod routes;
