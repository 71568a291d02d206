//! Client-side view of the shared store.
//!
//! [`SyncBridge`] delivers typed changes for one record, pushing from the
//! store's change feed and falling back to periodic re-reads when the feed
//! cannot be set up or goes away. [`LocalView`] layers a local move
//! animation over the last authoritative [`GameState`].

use std::time::Duration;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::game::board::{plan_move, MovePlan};
use crate::game::types::{GameState, LobbyCode, PlayerId};
use crate::store::{Change, Record, StateStore};

#[derive(Clone)]
pub struct SyncBridge<S> {
    store: S,
    poll_interval: Duration,
}

/// Live registration; the handler stops when this is dropped.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<S: StateStore> SyncBridge<S> {
    pub fn new(store: S, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    /// Calls `handler` for every change to the `R` record under `code`.
    pub fn on_state_change<R, F>(&self, code: &LobbyCode, mut handler: F) -> Subscription
    where
        R: Record,
        F: FnMut(Change<R>) + Send + 'static,
    {
        let store = self.store.clone();
        let poll_interval = self.poll_interval;
        let code = code.clone();

        let task = tokio::spawn(async move {
            match store.subscribe(R::KIND, &code).await {
                Ok(mut feed) => {
                    while let Some(event) = feed.next().await {
                        match event.decode::<R>() {
                            Some(Ok(change)) => handler(change),
                            Some(Err(e)) => log::warn!("{code}: undecodable change: {e}"),
                            None => {}
                        }
                    }
                    log::warn!("{code}: {} change feed ended, polling", R::KIND);
                }
                Err(e) => log::warn!("{code}: subscribe failed ({e}), polling"),
            }
            poll(store, code, poll_interval, handler).await;
        });

        Subscription { task }
    }
}

async fn poll<S, R, F>(store: S, code: LobbyCode, every: Duration, mut handler: F)
where
    S: StateStore,
    R: Record,
    F: FnMut(Change<R>) + Send,
{
    let mut last: Option<Option<R>> = None;
    loop {
        match store.read::<R>(&code).await {
            Ok(current) => {
                if last.as_ref() != Some(&current) {
                    match &current {
                        Some(record) => handler(Change::Updated(record.clone())),
                        // Nothing to report if the record never existed.
                        None if last.is_some() => handler(Change::Deleted),
                        None => {}
                    }
                    last = Some(current);
                }
            }
            Err(e) => log::debug!("{code}: poll failed: {e}"),
        }
        sleep(every).await;
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Animation {
    mover: PlayerId,
    turn_index: usize,
    plan: MovePlan,
    frames: Vec<u8>,
    shown: usize,
}

/// Authoritative state plus an optional in-flight move animation.
///
/// Intermediate cells are display-only and never written anywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalView {
    base: GameState,
    overlay: Option<Animation>,
}

impl LocalView {
    pub fn new(base: GameState) -> Self {
        Self {
            base,
            overlay: None,
        }
    }

    pub fn authoritative(&self) -> &GameState {
        &self.base
    }

    pub fn is_animating(&self) -> bool {
        self.overlay
            .as_ref()
            .is_some_and(|a| a.shown < a.frames.len())
    }

    /// Starts animating `die` for `player_id` from their stored cell.
    pub fn begin_move(&mut self, player_id: &str, die: u8) -> Option<&MovePlan> {
        let start = self.base.player(player_id)?.position;
        let plan = plan_move(start, die);
        self.overlay = Some(Animation {
            mover: player_id.to_string(),
            turn_index: self.base.current_turn_index,
            frames: plan.frames(),
            plan,
            shown: 0,
        });
        self.overlay.as_ref().map(|a| &a.plan)
    }

    /// Shows the next frame; `None` once the animation has finished.
    pub fn advance(&mut self) -> Option<u8> {
        let anim = self.overlay.as_mut()?;
        let cell = *anim.frames.get(anim.shown)?;
        anim.shown += 1;
        Some(cell)
    }

    /// Cell to draw for `player_id` right now.
    pub fn displayed_position(&self, player_id: &str) -> Option<u8> {
        let stored = self.base.player(player_id)?.position;
        match &self.overlay {
            Some(a) if a.mover == player_id && a.shown > 0 => Some(a.frames[a.shown - 1]),
            _ => Some(stored),
        }
    }

    /// Replaces the base wholesale with a newer authoritative state.
    ///
    /// The animation survives only while that state is still the same turn
    /// and the mover's stored cell is still where the animation started.
    pub fn reconcile(&mut self, next: GameState) {
        let keep = self.overlay.as_ref().is_some_and(|a| {
            next.current_turn_index == a.turn_index
                && next.is_over() == self.base.is_over()
                && next.player(&a.mover).map(|p| p.position) == Some(a.plan.start)
        });
        if !keep {
            self.overlay = None;
        }
        self.base = next;
    }
}
