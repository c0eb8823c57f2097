use crate::core::config::SchedulerConfig;
use crate::core::errors::{Result, SchedulerError};
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::model::{NodeId, SchedulerServiceState, TrackedServiceModel, UserRequestedState};
use super::presence::ServicesPresence;
use super::store::{InMemoryStore, KeyValueStore, SledStore};

/// Persists one [`TrackedServiceModel`] per node id through a
/// [`KeyValueStore`].
///
/// Every call is a single round trip to the store; read-modify-write helpers
/// race per key with last-write-wins.
#[derive(Clone)]
pub struct ServiceTracker {
    store: Arc<dyn KeyValueStore>,
    key_prefix: String,
    check_status_interval: Duration,
}

impl ServiceTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &SchedulerConfig) -> Self {
        Self {
            store,
            key_prefix: config.tracker_key_prefix.clone(),
            check_status_interval: config.check_status_interval(),
        }
    }

    /// Tracker on a [`SledStore`] at `config.storage_path`, in memory otherwise
    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = match &config.storage_path {
            Some(path) => {
                info!(path = %path.display(), "tracking services in sled store");
                Arc::new(SledStore::open(path)?)
            }
            None => Arc::new(InMemoryStore::new()),
        };
        Ok(Self::new(store, config))
    }

    /// Storage key of a node
    pub fn key(&self, node_id: &NodeId) -> String {
        format!("{}{}", self.key_prefix, node_id)
    }

    /// Node id encoded in a storage key produced by [`Self::key`]
    pub fn node_id_from_key(&self, key: &str) -> Result<NodeId> {
        let raw = key.strip_prefix(&self.key_prefix).ok_or_else(|| {
            SchedulerError::validation_field(
                format!("key '{key}' does not start with '{}'", self.key_prefix),
                "key",
            )
        })?;
        Uuid::parse_str(raw).map_err(|e| {
            SchedulerError::validation_field(format!("key '{key}' has no node id: {e}"), "key")
        })
    }

    pub async fn save(&self, node_id: &NodeId, model: &TrackedServiceModel) -> Result<()> {
        let payload = serde_json::to_vec(model)?;
        self.store.set(&self.key(node_id), Bytes::from(payload)).await?;
        debug!(%node_id, "saved tracked service");
        Ok(())
    }

    /// `None` when the node is not tracked
    pub async fn load(&self, node_id: &NodeId) -> Result<Option<TrackedServiceModel>> {
        match self.store.get(&self.key(node_id)).await? {
            Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, node_id: &NodeId) -> Result<()> {
        self.store.delete(&self.key(node_id)).await?;
        debug!(%node_id, "removed tracked service");
        Ok(())
    }

    /// Every tracked record keyed by its storage key
    pub async fn all(&self) -> Result<HashMap<String, TrackedServiceModel>> {
        let keys = self.store.keys(&format!("{}*", self.key_prefix)).await?;
        let mut records = HashMap::with_capacity(keys.len());
        for key in keys {
            // a key may vanish between listing and reading
            if let Some(payload) = self.store.get(&key).await? {
                records.insert(key, serde_json::from_slice(&payload)?);
            }
        }
        Ok(records)
    }

    pub async fn tracked_node_ids(&self) -> Result<Vec<NodeId>> {
        let keys = self.store.keys(&format!("{}*", self.key_prefix)).await?;
        keys.iter().map(|key| self.node_id_from_key(key)).collect()
    }

    async fn set_requested_state(&self, node_id: &NodeId, requested: UserRequestedState) -> Result<()> {
        let model = match self.load(node_id).await? {
            Some(mut model) => {
                model.requested_state = requested;
                model
            }
            None => {
                info!(%node_id, ?requested, "tracking new service");
                TrackedServiceModel::new(requested)
            }
        };
        self.save(node_id, &model).await
    }

    /// Record that the user wants the service running, tracking it if needed
    pub async fn set_request_as_running(&self, node_id: &NodeId) -> Result<()> {
        self.set_requested_state(node_id, UserRequestedState::Running).await
    }

    pub async fn set_request_as_stopped(&self, node_id: &NodeId) -> Result<()> {
        self.set_requested_state(node_id, UserRequestedState::Stopped).await
    }

    /// Store a new status payload; returns whether it differs from the last one.
    ///
    /// Untracked nodes are ignored and report no change.
    pub async fn set_if_status_changed(
        &self,
        node_id: &NodeId,
        status: serde_json::Value,
    ) -> Result<bool> {
        let Some(mut model) = self.load(node_id).await? else {
            return Ok(false);
        };
        if model.service_status.as_ref() == Some(&status) {
            return Ok(false);
        }
        model.service_status = Some(status);
        self.save(node_id, &model).await?;
        Ok(true)
    }

    /// Update the scheduler state; `last_state_change` moves only on a real change
    pub async fn set_current_state(
        &self,
        node_id: &NodeId,
        state: SchedulerServiceState,
    ) -> Result<bool> {
        let Some(mut model) = self.load(node_id).await? else {
            return Ok(false);
        };
        if model.current_state == state {
            return Ok(false);
        }
        debug!(%node_id, from = %model.current_state, to = %state, "service state changed");
        model.current_state = state;
        model.last_state_change = Utc::now();
        self.save(node_id, &model).await?;
        Ok(true)
    }

    /// Push the next status check `delay` into the future, the configured
    /// interval when `None`
    pub async fn set_check_status_after(
        &self,
        node_id: &NodeId,
        delay: Option<Duration>,
    ) -> Result<()> {
        let Some(mut model) = self.load(node_id).await? else {
            return Ok(());
        };
        let delay = delay.unwrap_or(self.check_status_interval);
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| SchedulerError::validation_field(e.to_string(), "delay"))?;
        model.check_status_after = Some(Utc::now() + delay);
        self.save(node_id, &model).await
    }

    pub async fn set_service_status_task_uid(
        &self,
        node_id: &NodeId,
        task_uid: Option<String>,
    ) -> Result<()> {
        let Some(mut model) = self.load(node_id).await? else {
            return Ok(());
        };
        model.service_status_task_uid = task_uid;
        self.save(node_id, &model).await
    }

    pub async fn set_services_presence(
        &self,
        node_id: &NodeId,
        presence: ServicesPresence,
    ) -> Result<()> {
        let Some(mut model) = self.load(node_id).await? else {
            return Ok(());
        };
        model.services_presence = presence;
        self.save(node_id, &model).await
    }
}
