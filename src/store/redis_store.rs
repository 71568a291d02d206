//! Redis-backed store.
//!
//! Every write runs as a Lua script that also PUBLISHes the change event,
//! so the notification order on `<key>:changes` is the write order.
//! Conditional updates are optimistic: read the row, run the transition in
//! Rust, then swap only if the row still holds the exact bytes we read.

use futures::stream::BoxStream;
use futures_util::StreamExt;
use once_cell::sync::Lazy;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client as RedisClient, Script};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};

use crate::game::types::LobbyCode;
use crate::store::{
    changes_channel, record_key, ChangeEvent, ChangeOp, InsertOutcome, Record, RecordKind,
    StateStore, StoreError, StoreResult,
};

/// KEYS[1]=row, KEYS[2]=channel, ARGV[1]=row json, ARGV[2]=event json
static INSERT_NX: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('SET', KEYS[1], ARGV[1], 'NX') then
            redis.call('PUBLISH', KEYS[2], ARGV[2])
            return 1
        end
        return 0
        ",
    )
});

/// KEYS[1]=row, KEYS[2]=channel, ARGV[1]=expected json, ARGV[2]=new json, ARGV[3]=event json
static COMPARE_AND_SET: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            redis.call('SET', KEYS[1], ARGV[2])
            redis.call('PUBLISH', KEYS[2], ARGV[3])
            return 1
        end
        return 0
        ",
    )
});

/// KEYS[1]=row, KEYS[2]=channel, ARGV[1]=row json, ARGV[2]=event json
static SET_AND_PUBLISH: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        redis.call('SET', KEYS[1], ARGV[1])
        redis.call('PUBLISH', KEYS[2], ARGV[2])
        return 1
        ",
    )
});

/// KEYS[1]=row, KEYS[2]=channel, ARGV[1]=event json
static DELETE_AND_PUBLISH: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('DEL', KEYS[1]) == 1 then
            redis.call('PUBLISH', KEYS[2], ARGV[1])
            return 1
        end
        return 0
        ",
    )
});

#[derive(Clone)]
pub struct RedisStore {
    client: RedisClient,
    conn: MultiplexedConnection,
    cas_attempts: usize,
}

impl RedisStore {
    /// Opens the client and a multiplexed connection, retrying with backoff.
    pub async fn connect(url: &str, cas_attempts: usize) -> anyhow::Result<Self> {
        let client = RedisClient::open(url)?;
        let strategy = ExponentialBackoff::from_millis(50).map(jitter).take(5);
        let conn = Retry::spawn(strategy, || client.get_multiplexed_async_connection()).await?;
        log::info!("connected to redis at {url}");
        Ok(Self {
            client,
            conn,
            cas_attempts: cas_attempts.max(1),
        })
    }

    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn read_raw(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        Ok(raw)
    }
}

impl StateStore for RedisStore {
    async fn read<R: Record>(&self, code: &LobbyCode) -> StoreResult<Option<R>> {
        match self.read_raw(&record_key(R::KIND, code)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn insert<R: Record>(&self, record: &R) -> StoreResult<InsertOutcome> {
        let row = serde_json::to_string(record)?;
        let event = serde_json::to_string(&ChangeEvent::new(ChangeOp::Insert, record)?)?;
        let mut conn = self.conn.clone();
        let inserted: i32 = INSERT_NX
            .key(record_key(R::KIND, record.code()))
            .key(changes_channel(R::KIND, record.code()))
            .arg(row)
            .arg(event)
            .invoke_async(&mut conn)
            .await?;
        Ok(if inserted == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Duplicate
        })
    }

    async fn update_if<R, F>(&self, code: &LobbyCode, transition: F) -> StoreResult<Option<R>>
    where
        R: Record,
        F: Fn(&R) -> Option<R> + Send + Sync,
    {
        let key = record_key(R::KIND, code);
        let channel = changes_channel(R::KIND, code);

        for attempt in 1..=self.cas_attempts {
            let Some(raw) = self.read_raw(&key).await? else {
                return Ok(None);
            };
            let current: R = serde_json::from_str(&raw)?;
            let Some(next) = transition(&current) else {
                return Ok(None);
            };

            let row = serde_json::to_string(&next)?;
            let event = serde_json::to_string(&ChangeEvent::new(ChangeOp::Update, &next)?)?;
            let mut conn = self.conn.clone();
            let swapped: i32 = COMPARE_AND_SET
                .key(&key)
                .key(&channel)
                .arg(raw)
                .arg(row)
                .arg(event)
                .invoke_async(&mut conn)
                .await?;
            if swapped == 1 {
                return Ok(Some(next));
            }
            log::debug!("{key}: concurrent write, re-evaluating (attempt {attempt})");
        }

        Err(StoreError::Contended(self.cas_attempts))
    }

    async fn put<R: Record>(&self, record: &R) -> StoreResult<()> {
        let row = serde_json::to_string(record)?;
        let event = serde_json::to_string(&ChangeEvent::new(ChangeOp::Update, record)?)?;
        let mut conn = self.conn.clone();
        let _: i32 = SET_AND_PUBLISH
            .key(record_key(R::KIND, record.code()))
            .key(changes_channel(R::KIND, record.code()))
            .arg(row)
            .arg(event)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove(&self, kind: RecordKind, code: &LobbyCode) -> StoreResult<bool> {
        let event = serde_json::to_string(&ChangeEvent::deleted(kind, code))?;
        let mut conn = self.conn.clone();
        let removed: i32 = DELETE_AND_PUBLISH
            .key(record_key(kind, code))
            .key(changes_channel(kind, code))
            .arg(event)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }

    async fn subscribe(
        &self,
        kind: RecordKind,
        code: &LobbyCode,
    ) -> StoreResult<BoxStream<'static, ChangeEvent>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| StoreError::Subscribe(e.to_string()))?;
        pubsub
            .subscribe(changes_channel(kind, code))
            .await
            .map_err(|e| StoreError::Subscribe(e.to_string()))?;

        let feed = pubsub.into_on_message().filter_map(|msg| async move {
            let payload = msg.get_payload::<String>().ok()?;
            match serde_json::from_str::<ChangeEvent>(&payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    log::warn!("dropping malformed change event: {e}");
                    None
                }
            }
        });
        Ok(feed.boxed())
    }
}
