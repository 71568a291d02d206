//! Runtime configuration for the Snakes & Ladders server.

use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Address the HTTP + WS server binds to.
    pub server_addr: String,
    /// Redis connection string; `None` keeps every record in process memory.
    pub redis_url: Option<String>,
    /// Seconds without a heartbeat before a player counts as gone.
    pub presence_ttl: u64,
    /// Seconds a closed socket may stay away before disconnect repair runs.
    pub disconnect_grace: u64,
    /// Seconds between presence sweeps.
    pub presence_sweep: u64,
    /// Polling period (ms) used by the sync bridge when push fails.
    pub sync_poll_interval_ms: u64,
    /// Lobby-code collisions tolerated before `createLobby` gives up.
    pub code_attempts: usize,
    /// Compare-and-set retries for a conditional update under contention.
    pub cas_attempts: usize,
    /// Pause (ms) before a bot rolls.
    pub bot_think_ms: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Self {
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into());
        let redis_url = env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty());

        Settings {
            server_addr,
            redis_url,
            presence_ttl: env_or("PRESENCE_TTL", 30),
            disconnect_grace: env_or("DISCONNECT_GRACE", 10),
            presence_sweep: env_or("PRESENCE_SWEEP", 2),
            sync_poll_interval_ms: env_or("SYNC_POLL_INTERVAL", 1_000),
            code_attempts: env_or("CODE_ATTEMPTS", 5),
            cas_attempts: env_or("CAS_ATTEMPTS", 8),
            bot_think_ms: env_or("BOT_THINK", 1_500),
        }
    }

    pub fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_ttl)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace)
    }

    pub fn presence_sweep(&self) -> Duration {
        Duration::from_secs(self.presence_sweep.max(1))
    }

    pub fn sync_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync_poll_interval_ms.max(50))
    }

    pub fn bot_think(&self) -> Duration {
        Duration::from_millis(self.bot_think_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server_addr: "127.0.0.1:8080".into(),
            redis_url: None,
            presence_ttl: 30,
            disconnect_grace: 10,
            presence_sweep: 2,
            sync_poll_interval_ms: 1_000,
            code_attempts: 5,
            cas_attempts: 8,
            bot_think_ms: 1_500,
        }
    }
}
