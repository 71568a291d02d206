//! Per-game liveness.
//
//  One entry per (lobby code, player). A socket announces itself and gets a
//  session id; heartbeats and socket close are matched against that id so a
//  late close from a replaced socket never marks a reconnected player gone.
//
//  A player is reported lost when
//    · no heartbeat for `ttl`, or
//    · their socket closed and they did not come back within `grace`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::interval;
use uuid::Uuid;

use crate::game::types::{Lobby, LobbyCode, PlayerId};
use crate::game::{Departure, GameResult, Membership};
use crate::metrics::{GAMES_ABANDONED, PRESENCE_LOSSES};
use crate::store::StateStore;

const FEED_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
struct Liveness {
    session: Uuid,
    last_seen: Instant,
    dropped_at: Option<Instant>,
}

/// A player whose session ended without an explicit leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceLoss {
    pub code: LobbyCode,
    pub player_id: PlayerId,
}

#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<Inner>,
}

struct Inner {
    ttl: Duration,
    grace: Duration,
    live: DashMap<(LobbyCode, PlayerId), Liveness>,
    feeds: DashMap<LobbyCode, broadcast::Sender<PlayerId>>,
}

impl PresenceTracker {
    pub fn new(ttl: Duration, grace: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                ttl,
                grace,
                live: DashMap::new(),
                feeds: DashMap::new(),
            }),
        }
    }

    /// Registers a fresh socket for `player_id`, replacing any older one.
    pub fn announce(&self, code: &LobbyCode, player_id: &str) -> Uuid {
        self.announce_at(code, player_id, Instant::now())
    }

    pub fn announce_at(&self, code: &LobbyCode, player_id: &str, now: Instant) -> Uuid {
        let session = Uuid::new_v4();
        self.inner.live.insert(
            (code.clone(), player_id.to_string()),
            Liveness {
                session,
                last_seen: now,
                dropped_at: None,
            },
        );
        log::debug!("{code}: {player_id} online (session {session})");
        session
    }

    /// Refreshes liveness. `false` if `session` is not the player's current one.
    pub fn heartbeat(&self, code: &LobbyCode, player_id: &str, session: Uuid) -> bool {
        self.heartbeat_at(code, player_id, session, Instant::now())
    }

    pub fn heartbeat_at(&self, code: &LobbyCode, player_id: &str, session: Uuid, now: Instant) -> bool {
        match self.inner.live.get_mut(&(code.clone(), player_id.to_string())) {
            Some(mut entry) if entry.session == session => {
                entry.last_seen = now;
                entry.dropped_at = None;
                true
            }
            _ => false,
        }
    }

    /// The socket behind `session` closed.
    pub fn drop_session(&self, code: &LobbyCode, player_id: &str, session: Uuid) {
        self.drop_session_at(code, player_id, session, Instant::now())
    }

    pub fn drop_session_at(&self, code: &LobbyCode, player_id: &str, session: Uuid, now: Instant) {
        if let Some(mut entry) = self.inner.live.get_mut(&(code.clone(), player_id.to_string())) {
            if entry.session == session {
                entry.dropped_at = Some(now);
            } else {
                log::debug!("{code}: ignoring close of stale session {session} for {player_id}");
            }
        }
    }

    /// Explicit leave: stop tracking without reporting a loss.
    pub fn forget(&self, code: &LobbyCode, player_id: &str) {
        self.inner.live.remove(&(code.clone(), player_id.to_string()));
    }

    /// Drops every entry for a game that no longer exists.
    pub fn forget_game(&self, code: &LobbyCode) {
        self.inner.live.retain(|(c, _), _| c != code);
        self.release_feed(code);
    }

    /// Drops the loss feed for `code` once no stream reads it.
    pub fn release_feed(&self, code: &LobbyCode) {
        self.inner
            .feeds
            .remove_if(code, |_, tx| tx.receiver_count() == 0);
    }

    /// Loss feeds still held open.
    pub fn feed_count(&self) -> usize {
        self.inner.feeds.len()
    }

    pub fn online(&self, code: &LobbyCode, player_id: &str) -> bool {
        self.inner
            .live
            .get(&(code.clone(), player_id.to_string()))
            .is_some_and(|e| e.dropped_at.is_none())
    }

    /// Players currently connected to `code`, sorted.
    pub fn members(&self, code: &LobbyCode) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self
            .inner
            .live
            .iter()
            .filter(|e| &e.key().0 == code && e.value().dropped_at.is_none())
            .map(|e| e.key().1.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Removes and reports every player considered gone at `now`.
    pub fn sweep_at(&self, now: Instant) -> Vec<PresenceLoss> {
        let (ttl, grace) = (self.inner.ttl, self.inner.grace);
        let expired: Vec<(LobbyCode, PlayerId)> = self
            .inner
            .live
            .iter()
            .filter(|e| {
                let l = e.value();
                let silent = now.saturating_duration_since(l.last_seen) >= ttl;
                let gone = l
                    .dropped_at
                    .is_some_and(|at| now.saturating_duration_since(at) >= grace);
                silent || gone
            })
            .map(|e| e.key().clone())
            .collect();

        let mut lost = Vec::with_capacity(expired.len());
        for key in expired {
            // A heartbeat may have landed since the scan.
            let removed = self.inner.live.remove_if(&key, |_, l| {
                now.saturating_duration_since(l.last_seen) >= ttl
                    || l.dropped_at
                        .is_some_and(|at| now.saturating_duration_since(at) >= grace)
            });
            let Some(((code, player_id), _)) = removed else {
                continue;
            };
            log::info!("{code}: presence lost for {player_id}");
            let heard = match self.inner.feeds.get(&code) {
                Some(tx) => tx.send(player_id.clone()).is_ok(),
                None => true,
            };
            if !heard {
                self.release_feed(&code);
            }
            lost.push(PresenceLoss { code, player_id });
        }
        lost
    }

    /// Stream of player ids reported lost in `code`.
    pub fn on_loss(&self, code: &LobbyCode) -> BoxStream<'static, PlayerId> {
        let rx = self
            .inner
            .feeds
            .entry(code.clone())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .subscribe();
        stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(pid) => return Some((pid, rx)),
                    Err(RecvError::Lagged(missed)) => {
                        log::warn!("presence feed lagged, {missed} losses dropped");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

/// Runs disconnect repair for one reported loss. Failures are logged only.
pub async fn handle_loss<S: StateStore>(
    tracker: &PresenceTracker,
    membership: &Membership<S>,
    loss: &PresenceLoss,
) {
    PRESENCE_LOSSES.inc();
    match membership.repair_departure(&loss.code, &loss.player_id).await {
        Ok(Departure::Abandoned) | Ok(Departure::TornDown) => {
            GAMES_ABANDONED.inc();
            tracker.forget_game(&loss.code);
        }
        Ok(Departure::NotMember) => {
            log::debug!("{}: {} already gone", loss.code, loss.player_id);
        }
        Ok(_) => {}
        Err(e) => log::warn!(
            "{}: disconnect repair for {} failed: {e}",
            loss.code,
            loss.player_id
        ),
    }
}

/// Explicit leave from any surface. Stops tracking the player, and the
/// whole game when the leave deleted the lobby.
pub async fn leave<S: StateStore>(
    tracker: &PresenceTracker,
    membership: &Membership<S>,
    code: &LobbyCode,
    player_id: &str,
) -> GameResult<Option<Lobby>> {
    let outcome = membership.leave(code, player_id).await;
    tracker.forget(code, player_id);
    let lobby = outcome?;
    if lobby.is_none() {
        tracker.forget_game(code);
    }
    Ok(lobby)
}

/// Spawn the presence sweep loop as a Tokio task.
pub fn start<S: StateStore>(
    tracker: PresenceTracker,
    membership: Membership<S>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            for loss in tracker.sweep_at(Instant::now()) {
                handle_loss(&tracker, &membership, &loss).await;
            }
        }
    })
}
