use crate::core::errors::{Result, SchedulerError, ValueKind};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::base::PartialState;

/// Shared key-value context of a running play or workflow.
///
/// A key keeps the JSON kind of the first value stored under it; setting a
/// value of another kind is rejected.
#[derive(Debug, Default)]
pub struct PlayContext {
    values: DashMap<String, Value>,
}

impl PlayContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a context from a [`PlayContext::snapshot`]
    pub fn from_snapshot(snapshot: Map<String, Value>) -> Self {
        let ctx = Self::new();
        ctx.restore(snapshot);
        ctx
    }

    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<()> {
        self.set_value(key, serde_json::to_value(value)?)
    }

    pub fn set_value(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        match self.values.entry(key) {
            Entry::Occupied(mut entry) => {
                let existing_type = ValueKind::of(entry.get());
                let new_type = ValueKind::of(&value);
                if existing_type != new_type {
                    return Err(SchedulerError::SetTypeMismatch {
                        key: entry.key().clone(),
                        existing_type,
                        new_type,
                    });
                }
                entry.insert(value);
            }
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
        }
        Ok(())
    }

    /// Store `value` under `key` whatever kind was stored there before
    pub fn replace<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<()> {
        self.values.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Read a value and deserialize it into `T`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .get_value(key)
            .ok_or_else(|| SchedulerError::NotInContext {
                key: key.to_string(),
            })?;
        let existing_type = ValueKind::of(&value);
        serde_json::from_value(value).map_err(|e| SchedulerError::GetTypeMismatch {
            key: key.to_string(),
            existing_type,
            expected_type: std::any::type_name::<T>().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if self.contains(key) {
            self.get(key).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.remove(key).map(|(_, v)| v)
    }

    /// Keys from `keys` that are not present
    pub fn missing<'a>(&self, keys: &'a [String]) -> Vec<&'a str> {
        keys.iter()
            .filter(|k| !self.contains(k))
            .map(String::as_str)
            .collect()
    }

    /// Merge the output of a step; stops at the first type mismatch
    pub fn update(&self, partial: PartialState) -> Result<()> {
        for (key, value) in partial {
            self.set_value(key, value)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Overwrite the stored values with `snapshot`, without kind checks
    pub fn restore(&self, snapshot: Map<String, Value>) {
        for (key, value) in snapshot {
            self.values.insert(key, value);
        }
    }
}
