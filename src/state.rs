//! Shared handles injected into every HTTP and WS handler.

use crate::config::Settings;
use crate::game::{Membership, TurnEngine};
use crate::store::Backend;
use crate::sync::{BotDriver, PresenceTracker};

#[derive(Clone)]
pub struct AppState {
    pub store: Backend,
    pub membership: Membership<Backend>,
    pub turns: TurnEngine<Backend>,
    pub presence: PresenceTracker,
    pub bots: BotDriver<Backend>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(store: Backend, settings: Settings) -> Self {
        AppState {
            membership: Membership::new(store.clone(), settings.code_attempts),
            turns: TurnEngine::new(store.clone()),
            presence: PresenceTracker::new(settings.presence_ttl(), settings.disconnect_grace()),
            bots: BotDriver::new(store.clone(), settings.bot_think(), settings.sync_poll_interval()),
            store,
            settings,
        }
    }
}
