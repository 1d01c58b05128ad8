//! Process-wide registry of active sessions.
//!
//! A sharded map with per-shard locking; each stored session carries its own
//! async mutex so handler calls on one session are strictly serialized while
//! different sessions proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use uuid::Uuid;

const SHARD_COUNT: usize = 16;

pub const DEFAULT_SESSION_TTL_HOURS: i64 = 2;

/// Anything the registry can evict on idle timeout.
pub trait Expirable {
    fn last_activity(&self) -> DateTime<Utc>;
}

impl Expirable for crate::cat::CatSession {
    fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }
}

impl Expirable for crate::learn::LearningSession {
    fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }
}

#[derive(Debug)]
pub struct Registry<T> {
    shards: Vec<RwLock<HashMap<Uuid, Arc<Mutex<T>>>>>,
    ttl: Duration,
}

impl<T: Expirable> Registry<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            ttl,
        }
    }

    fn shard(&self, id: &Uuid) -> &RwLock<HashMap<Uuid, Arc<Mutex<T>>>> {
        let bytes = id.as_bytes();
        let idx = (bytes[0] as usize) % SHARD_COUNT;
        &self.shards[idx]
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn insert(&self, id: Uuid, session: T) -> Arc<Mutex<T>> {
        let handle = Arc::new(Mutex::new(session));
        self.shard(&id).write().insert(id, Arc::clone(&handle));
        handle
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Mutex<T>>> {
        self.shard(id).read().get(id).cloned()
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<Mutex<T>>> {
        self.shard(id).write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles of every live session; used by the sweeper, which must lock
    /// each session before deciding anything about it.
    pub fn snapshot(&self) -> Vec<(Uuid, Arc<Mutex<T>>)> {
        self.shards
            .iter()
            .flat_map(|shard| {
                shard
                    .read()
                    .iter()
                    .map(|(id, handle)| (*id, Arc::clone(handle)))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Whether a session would be considered expired at `now`.
    pub fn is_expired(&self, session: &T, now: DateTime<Utc>) -> bool {
        now - session.last_activity() > self.ttl
    }
}
