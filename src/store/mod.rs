//! Shared state store: the only place lobby and game records live.
//!
//! Keys / channels
//! ---------------
//! lobby:<CODE>            – Lobby record (JSON)
//! game:<CODE>             – GameState record (JSON)
//! <key>:changes           – change events for that key, in write order

pub mod memory;
pub mod redis_store;

use std::fmt;
use std::future::Future;

use futures::stream::BoxStream;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::game::types::{GameState, Lobby, LobbyCode};

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),
    #[error("record codec: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("conditional update lost {0} races in a row")]
    Contended(usize),
    #[error("change feed unavailable: {0}")]
    Subscribe(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Lobby,
    Game,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Lobby => f.write_str("lobby"),
            RecordKind::Game => f.write_str("game"),
        }
    }
}

pub fn record_key(kind: RecordKind, code: &LobbyCode) -> String {
    format!("{kind}:{code}")
}

pub fn changes_channel(kind: RecordKind, code: &LobbyCode) -> String {
    format!("{kind}:{code}:changes")
}

/// A row type the store knows how to key.
pub trait Record: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {
    const KIND: RecordKind;

    fn code(&self) -> &LobbyCode;
}

impl Record for Lobby {
    const KIND: RecordKind = RecordKind::Lobby;

    fn code(&self) -> &LobbyCode {
        &self.code
    }
}

impl Record for GameState {
    const KIND: RecordKind = RecordKind::Game;

    fn code(&self) -> &LobbyCode {
        &self.code
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// Broadcast after every successful mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: RecordKind,
    pub code: LobbyCode,
    pub op: ChangeOp,
    /// New row; `None` for deletes.
    pub record: Option<serde_json::Value>,
}

impl ChangeEvent {
    pub fn new<R: Record>(op: ChangeOp, record: &R) -> StoreResult<Self> {
        Ok(Self {
            kind: R::KIND,
            code: record.code().clone(),
            op,
            record: Some(serde_json::to_value(record)?),
        })
    }

    pub fn deleted(kind: RecordKind, code: &LobbyCode) -> Self {
        Self {
            kind,
            code: code.clone(),
            op: ChangeOp::Delete,
            record: None,
        }
    }

    /// Typed view of this event, `None` if it belongs to another kind.
    pub fn decode<R: Record>(&self) -> Option<StoreResult<Change<R>>> {
        if self.kind != R::KIND {
            return None;
        }
        let change = match (&self.op, &self.record) {
            (ChangeOp::Delete, _) | (_, None) => Ok(Change::Deleted),
            (op, Some(value)) => serde_json::from_value::<R>(value.clone())
                .map(|r| {
                    if *op == ChangeOp::Insert {
                        Change::Inserted(r)
                    } else {
                        Change::Updated(r)
                    }
                })
                .map_err(StoreError::from),
        };
        Some(change)
    }
}

/// Typed change as seen by a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<R> {
    Inserted(R),
    Updated(R),
    Deleted,
}

impl<R> Change<R> {
    pub fn record(&self) -> Option<&R> {
        match self {
            Change::Inserted(r) | Change::Updated(r) => Some(r),
            Change::Deleted => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row already holds that key; nothing was written.
    Duplicate,
}

/// Capabilities the core needs from its environment.
///
/// `update_if` is the compare-and-swap primitive: `transition` sees the
/// current stored value and returns the replacement, or `None` when its
/// predicate does not hold. `None` from `update_if` means zero rows were
/// affected (predicate failed or the row is missing); it is not an error.
pub trait StateStore: Clone + Send + Sync + 'static {
    fn read<R: Record>(&self, code: &LobbyCode)
        -> impl Future<Output = StoreResult<Option<R>>> + Send;

    fn insert<R: Record>(&self, record: &R) -> impl Future<Output = StoreResult<InsertOutcome>> + Send;

    fn update_if<R, F>(
        &self,
        code: &LobbyCode,
        transition: F,
    ) -> impl Future<Output = StoreResult<Option<R>>> + Send
    where
        R: Record,
        F: Fn(&R) -> Option<R> + Send + Sync;

    /// Unconditional last-writer-wins overwrite.
    fn put<R: Record>(&self, record: &R) -> impl Future<Output = StoreResult<()>> + Send;

    /// Returns whether a row was deleted.
    fn remove(&self, kind: RecordKind, code: &LobbyCode)
        -> impl Future<Output = StoreResult<bool>> + Send;

    /// Change feed for one key, in write order.
    fn subscribe(
        &self,
        kind: RecordKind,
        code: &LobbyCode,
    ) -> impl Future<Output = StoreResult<BoxStream<'static, ChangeEvent>>> + Send;
}

/// Store picked at startup.
#[derive(Clone)]
pub enum Backend {
    Memory(MemoryStore),
    Redis(RedisStore),
}

impl StateStore for Backend {
    async fn read<R: Record>(&self, code: &LobbyCode) -> StoreResult<Option<R>> {
        match self {
            Backend::Memory(s) => s.read(code).await,
            Backend::Redis(s) => s.read(code).await,
        }
    }

    async fn insert<R: Record>(&self, record: &R) -> StoreResult<InsertOutcome> {
        match self {
            Backend::Memory(s) => s.insert(record).await,
            Backend::Redis(s) => s.insert(record).await,
        }
    }

    async fn update_if<R, F>(&self, code: &LobbyCode, transition: F) -> StoreResult<Option<R>>
    where
        R: Record,
        F: Fn(&R) -> Option<R> + Send + Sync,
    {
        match self {
            Backend::Memory(s) => s.update_if(code, transition).await,
            Backend::Redis(s) => s.update_if(code, transition).await,
        }
    }

    async fn put<R: Record>(&self, record: &R) -> StoreResult<()> {
        match self {
            Backend::Memory(s) => s.put(record).await,
            Backend::Redis(s) => s.put(record).await,
        }
    }

    async fn remove(&self, kind: RecordKind, code: &LobbyCode) -> StoreResult<bool> {
        match self {
            Backend::Memory(s) => s.remove(kind, code).await,
            Backend::Redis(s) => s.remove(kind, code).await,
        }
    }

    async fn subscribe(
        &self,
        kind: RecordKind,
        code: &LobbyCode,
    ) -> StoreResult<BoxStream<'static, ChangeEvent>> {
        match self {
            Backend::Memory(s) => s.subscribe(kind, code).await,
            Backend::Redis(s) => s.subscribe(kind, code).await,
        }
    }
}

impl Backend {
    /// Readiness check for the health endpoint.
    pub async fn ping(&self) -> StoreResult<()> {
        match self {
            Backend::Memory(_) => Ok(()),
            Backend::Redis(s) => s.ping().await,
        }
    }
}
