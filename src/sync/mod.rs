//! Everything between the core and its clients: presence tracking, the
//! client-side sync bridge and the bot driver.

pub mod bots;
pub mod bridge;
pub mod presence;

pub use bots::BotDriver;
pub use bridge::{LocalView, Subscription, SyncBridge};
pub use presence::{PresenceLoss, PresenceTracker};
