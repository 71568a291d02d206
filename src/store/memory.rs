//! In-process store: `DashMap` rows plus one broadcast channel per key.
//!
//! Conditional updates run under the row's shard lock, and the change event
//! is sent before the lock is released, so subscribers see writes in order.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::game::types::LobbyCode;
use crate::store::{
    changes_channel, record_key, ChangeEvent, ChangeOp, InsertOutcome, Record, RecordKind,
    StateStore, StoreResult,
};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: DashMap<String, serde_json::Value>,
    channels: DashMap<String, broadcast::Sender<ChangeEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows (both kinds).
    pub fn len(&self) -> usize {
        self.inner.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.rows.is_empty()
    }

    /// Live change-feed channels.
    pub fn feed_count(&self) -> usize {
        self.inner.channels.len()
    }

    fn publish(&self, event: ChangeEvent) {
        let channel = changes_channel(event.kind, &event.code);
        let delivered = match self.inner.channels.get(&channel) {
            Some(tx) => tx.send(event).is_ok(),
            None => return,
        };
        if !delivered {
            self.prune(&channel);
        }
    }

    /// Drops a channel nobody listens to any more.
    fn prune(&self, channel: &str) {
        self.inner
            .channels
            .remove_if(channel, |_, tx| tx.receiver_count() == 0);
    }
}

impl StateStore for MemoryStore {
    async fn read<R: Record>(&self, code: &LobbyCode) -> StoreResult<Option<R>> {
        let key = record_key(R::KIND, code);
        match self.inner.rows.get(&key) {
            Some(row) => Ok(Some(serde_json::from_value(row.value().clone())?)),
            None => Ok(None),
        }
    }

    async fn insert<R: Record>(&self, record: &R) -> StoreResult<InsertOutcome> {
        let key = record_key(R::KIND, record.code());
        let value = serde_json::to_value(record)?;
        match self.inner.rows.entry(key) {
            Entry::Occupied(_) => Ok(InsertOutcome::Duplicate),
            Entry::Vacant(slot) => {
                let _row = slot.insert(value);
                self.publish(ChangeEvent::new(ChangeOp::Insert, record)?);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn update_if<R, F>(&self, code: &LobbyCode, transition: F) -> StoreResult<Option<R>>
    where
        R: Record,
        F: Fn(&R) -> Option<R> + Send + Sync,
    {
        let key = record_key(R::KIND, code);
        let Some(mut row) = self.inner.rows.get_mut(&key) else {
            return Ok(None);
        };
        let current: R = serde_json::from_value(row.value().clone())?;
        let Some(next) = transition(&current) else {
            return Ok(None);
        };
        *row = serde_json::to_value(&next)?;
        self.publish(ChangeEvent::new(ChangeOp::Update, &next)?);
        drop(row);
        Ok(Some(next))
    }

    async fn put<R: Record>(&self, record: &R) -> StoreResult<()> {
        let key = record_key(R::KIND, record.code());
        let value = serde_json::to_value(record)?;
        let op = match self.inner.rows.entry(key) {
            Entry::Occupied(mut slot) => {
                slot.insert(value);
                ChangeOp::Update
            }
            Entry::Vacant(slot) => {
                slot.insert(value);
                ChangeOp::Insert
            }
        };
        self.publish(ChangeEvent::new(op, record)?);
        Ok(())
    }

    async fn remove(&self, kind: RecordKind, code: &LobbyCode) -> StoreResult<bool> {
        let removed = self.inner.rows.remove(&record_key(kind, code)).is_some();
        if removed {
            self.publish(ChangeEvent::deleted(kind, code));
        }
        self.prune(&changes_channel(kind, code));
        Ok(removed)
    }

    async fn subscribe(
        &self,
        kind: RecordKind,
        code: &LobbyCode,
    ) -> StoreResult<BoxStream<'static, ChangeEvent>> {
        let channel = changes_channel(kind, code);
        // Subscribe under the entry lock so a concurrent prune cannot orphan us.
        let rx = self
            .inner
            .channels
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        let reader = FeedReader {
            rx: Some(rx),
            inner: self.inner.clone(),
            channel,
        };
        let feed = stream::unfold(reader, |mut reader| async move {
            let event = reader.next_event().await?;
            Some((event, reader))
        });
        Ok(feed.boxed())
    }
}

/// One subscriber. The last reader to go drops its channel from the map.
struct FeedReader {
    rx: Option<broadcast::Receiver<ChangeEvent>>,
    inner: Arc<Inner>,
    channel: String,
}

impl FeedReader {
    async fn next_event(&mut self) -> Option<ChangeEvent> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("change feed lagged, {missed} events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for FeedReader {
    fn drop(&mut self) {
        drop(self.rx.take());
        self.inner
            .channels
            .remove_if(&self.channel, |_, tx| tx.receiver_count() == 0);
    }
}
