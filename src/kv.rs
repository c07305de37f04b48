// =============================================================================
// KV/PubSub interface — the only external backend the core depends on
// =============================================================================
//
// `KvStore` is the opaque interface §6 describes: `get`/`set`/`publish` plus
// the set primitives used by the out-of-scope auth collaborator. Production
// deployments would implement it against a real network KV/pubsub backend;
// this crate ships only `InMemoryKv`, grounded on the Python original's
// `RedisClient` falling back to `fakeredis` when no real Redis is reachable —
// here that fallback *is* the production path, per design note "Singleton KV
// client with dual backend": the core must not depend on which is active.
// =============================================================================

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Channel buffer size for pub/sub broadcast — generous enough that a slow
/// subscriber only drops old messages rather than blocking publishers
/// (pub/sub is explicitly best-effort, newest-wins per §1 Non-goals).
const CHANNEL_CAPACITY: usize = 64;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn publish(&self, channel: &str, message: Vec<u8>) -> Result<()>;
    async fn sadd(&self, key: &str, member: &str) -> Result<()>;
    async fn srem(&self, key: &str, member: &str) -> Result<()>;
    async fn smembers(&self, key: &str) -> Result<HashSet<String>>;
    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    /// Subscribe to `channel`. Only `InMemoryKv` exposes this directly (a
    /// real network backend would hand back its own subscription handle);
    /// kept on the trait so tests can observe publishes without reaching
    /// into the concrete type.
    fn subscribe(&self, channel: &str) -> broadcast::Receiver<Vec<u8>>;
}

#[derive(Default)]
struct InMemoryKvInner {
    values: HashMap<String, Vec<u8>>,
    sets: HashMap<String, HashSet<String>>,
    channels: HashMap<String, broadcast::Sender<Vec<u8>>>,
}

/// In-memory `KvStore` implementation: the default and only backend this
/// crate ships, since a real network KV is an out-of-scope external
/// collaborator.
pub struct InMemoryKv {
    inner: RwLock<InMemoryKvInner>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(InMemoryKvInner::default()),
        }
    }

    fn channel_sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        let mut inner = self.inner.write();
        inner
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for InMemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.inner.write().values.insert(key.to_string(), value);
        Ok(())
    }

    async fn publish(&self, channel: &str, message: Vec<u8>) -> Result<()> {
        // No subscribers is not an error — publish is fire-and-forget.
        let _ = self.channel_sender(channel).send(message);
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.inner
            .write()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        if let Some(set) = self.inner.write().sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<String>> {
        Ok(self.inner.read().sets.get(key).cloned().unwrap_or_default())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .sets
            .get(key)
            .map(|set| set.contains(member))
            .unwrap_or(false))
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<Vec<u8>> {
        self.channel_sender(channel).subscribe()
    }
}
