use crate::core::errors::{Result, SchedulerError};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::path::Path;
use tracing::debug;

/// Narrow key-value backend used by the service tracker.
///
/// Each operation must be atomic per key. Nothing is layered on top: no
/// retries, no locking across keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    async fn set(&self, key: &str, value: Bytes) -> Result<()>;

    /// Removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Keys matching `pattern`: an exact key, or a prefix ending in `*`
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
}

/// How a `keys` pattern selects keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPattern<'a> {
    Exact(&'a str),
    Prefix(&'a str),
}

impl<'a> KeyPattern<'a> {
    pub fn parse(pattern: &'a str) -> Result<Self> {
        match pattern.strip_suffix('*') {
            Some(prefix) if prefix.contains('*') => Err(SchedulerError::validation_field(
                format!("unsupported key pattern '{pattern}', only a trailing '*' is allowed"),
                "pattern",
            )),
            Some(prefix) => Ok(Self::Prefix(prefix)),
            None if pattern.contains('*') => Err(SchedulerError::validation_field(
                format!("unsupported key pattern '{pattern}', only a trailing '*' is allowed"),
                "pattern",
            )),
            None => Ok(Self::Exact(pattern)),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Exact(exact) => key == *exact,
            Self::Prefix(prefix) => key.starts_with(prefix),
        }
    }
}

/// Process-local store, for tests and single-instance setups
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    entries: std::sync::Arc<DashMap<String, Bytes>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = KeyPattern::parse(pattern)?;
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| pattern.matches(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Persistent store on top of a sled tree
#[derive(Debug, Clone)]
pub struct SledStore {
    tree: sled::Tree,
}

impl SledStore {
    const TREE: &'static str = "tracked_services";

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .map_err(|e| SchedulerError::database(format!("open {}", path.display()), e))?;
        debug!(path = %path.display(), "opened sled store");
        Self::from_db(&db)
    }

    pub fn from_db(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(Self::TREE)?,
        })
    }

    /// Wait until every write reached disk
    pub async fn flush(&self) -> Result<()> {
        self.tree
            .flush_async()
            .await
            .map_err(|e| SchedulerError::database("flush", e))?;
        Ok(())
    }
}

fn key_from_bytes(raw: &[u8]) -> Result<String> {
    String::from_utf8(raw.to_vec())
        .map_err(|e| SchedulerError::serialization("utf8 key", e))
}

#[async_trait]
impl KeyValueStore for SledStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let value = self
            .tree
            .get(key.as_bytes())
            .map_err(|e| SchedulerError::database(format!("get {key}"), e))?;
        Ok(value.map(|ivec| Bytes::copy_from_slice(&ivec)))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        self.tree
            .insert(key.as_bytes(), &value[..])
            .map_err(|e| SchedulerError::database(format!("set {key}"), e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.tree
            .remove(key.as_bytes())
            .map_err(|e| SchedulerError::database(format!("delete {key}"), e))?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        match KeyPattern::parse(pattern)? {
            KeyPattern::Exact(key) => {
                let present = self
                    .tree
                    .contains_key(key.as_bytes())
                    .map_err(|e| SchedulerError::database(format!("keys {pattern}"), e))?;
                Ok(if present { vec![key.to_string()] } else { Vec::new() })
            }
            KeyPattern::Prefix(prefix) => self
                .tree
                .scan_prefix(prefix.as_bytes())
                .keys()
                .map(|raw| {
                    let raw = raw.map_err(|e| SchedulerError::database(format!("keys {pattern}"), e))?;
                    key_from_bytes(&raw)
                })
                .collect(),
        }
    }
}
