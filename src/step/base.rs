use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::context::PlayContext;

/// Values produced by a step, merged into the context once the step succeeds
pub type PartialState = Map<String, Value>;

/// Step - a named, compute-only unit of work
///
/// `execute` must be safe to call more than once. `revert` cleans up what
/// `execute` created and must succeed even when `execute` never ran or ran
/// only partially.
#[async_trait]
pub trait Step: Send + Sync {
    /// Unique name of the step, used as its registry key
    fn name(&self) -> &str;

    /// Context keys that must be present before `execute` runs
    fn requires(&self) -> Vec<String> {
        Vec::new()
    }

    /// Context keys that must be present before `revert` runs
    fn revert_requires(&self) -> Vec<String> {
        Vec::new()
    }

    /// Extra attempts after a failed `execute`
    fn execute_retries(&self) -> u32 {
        0
    }

    /// Extra attempts after a failed `revert`
    fn revert_retries(&self) -> u32 {
        0
    }

    /// Pause before each retry
    fn wait_between_attempts(&self) -> Duration {
        Duration::ZERO
    }

    async fn execute(&self, ctx: &PlayContext) -> anyhow::Result<PartialState>;

    async fn revert(&self, _ctx: &PlayContext) -> anyhow::Result<PartialState> {
        Ok(PartialState::new())
    }
}

pub type StepHandler =
    Arc<dyn for<'a> Fn(&'a PlayContext) -> BoxFuture<'a, anyhow::Result<PartialState>> + Send + Sync>;

/// Closure-backed step, handy for small steps and tests
#[derive(Clone)]
pub struct FnStep {
    name: String,
    requires: Vec<String>,
    revert_requires: Vec<String>,
    execute_retries: u32,
    revert_retries: u32,
    wait_between_attempts: Duration,
    execute: StepHandler,
    revert: Option<StepHandler>,
}

impl FnStep {
    pub fn new<F>(name: impl Into<String>, execute: F) -> Self
    where
        F: for<'a> Fn(&'a PlayContext) -> BoxFuture<'a, anyhow::Result<PartialState>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            requires: Vec::new(),
            revert_requires: Vec::new(),
            execute_retries: 0,
            revert_retries: 0,
            wait_between_attempts: Duration::ZERO,
            execute: Arc::new(execute),
            revert: None,
        }
    }

    pub fn with_requires<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.requires = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_revert_requires<S: Into<String>>(
        mut self,
        keys: impl IntoIterator<Item = S>,
    ) -> Self {
        self.revert_requires = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_execute_retries(mut self, retries: u32) -> Self {
        self.execute_retries = retries;
        self
    }

    pub fn with_revert_retries(mut self, retries: u32) -> Self {
        self.revert_retries = retries;
        self
    }

    pub fn with_wait_between_attempts(mut self, wait: Duration) -> Self {
        self.wait_between_attempts = wait;
        self
    }

    pub fn with_revert<F>(mut self, revert: F) -> Self
    where
        F: for<'a> Fn(&'a PlayContext) -> BoxFuture<'a, anyhow::Result<PartialState>>
            + Send
            + Sync
            + 'static,
    {
        self.revert = Some(Arc::new(revert));
        self
    }

    pub fn into_step(self) -> Arc<dyn Step> {
        Arc::new(self)
    }
}

impl fmt::Debug for FnStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("revert_requires", &self.revert_requires)
            .field("execute_retries", &self.execute_retries)
            .field("revert_retries", &self.revert_retries)
            .field("has_revert", &self.revert.is_some())
            .finish()
    }
}

#[async_trait]
impl Step for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<String> {
        self.requires.clone()
    }

    fn revert_requires(&self) -> Vec<String> {
        self.revert_requires.clone()
    }

    fn execute_retries(&self) -> u32 {
        self.execute_retries
    }

    fn revert_retries(&self) -> u32 {
        self.revert_retries
    }

    fn wait_between_attempts(&self) -> Duration {
        self.wait_between_attempts
    }

    async fn execute(&self, ctx: &PlayContext) -> anyhow::Result<PartialState> {
        (self.execute)(ctx).await
    }

    async fn revert(&self, ctx: &PlayContext) -> anyhow::Result<PartialState> {
        match &self.revert {
            Some(revert) => revert(ctx).await,
            None => Ok(PartialState::new()),
        }
    }
}

/// Build a [`PartialState`] from key/value pairs
pub fn partial_state<K, I>(pairs: I) -> PartialState
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_step_execute_and_default_revert() {
        let step = FnStep::new("double", |ctx| {
            async move {
                let x: i64 = ctx.get("x")?;
                Ok::<_, anyhow::Error>(partial_state([("y", json!(x * 2))]))
            }
            .boxed()
        })
        .with_requires(["x"]);

        let ctx = PlayContext::new();
        ctx.set("x", 21).unwrap();

        assert_eq!(step.name(), "double");
        assert_eq!(step.requires(), vec!["x".to_string()]);
        let out = step.execute(&ctx).await.unwrap();
        assert_eq!(out.get("y"), Some(&json!(42)));
        assert!(step.revert(&ctx).await.unwrap().is_empty());
        assert_eq!(step.execute_retries(), 0);
        assert_eq!(step.wait_between_attempts(), Duration::ZERO);
    }

    #[test]
    fn test_fn_step_attempt_settings() {
        let step = FnStep::new("pull", |_| {
            async { Ok::<_, anyhow::Error>(PartialState::new()) }.boxed()
        })
        .with_revert_requires(["volume"])
        .with_execute_retries(3)
        .with_revert_retries(1)
        .with_wait_between_attempts(Duration::from_millis(10));

        assert_eq!(step.revert_requires(), vec!["volume".to_string()]);
        assert_eq!(step.execute_retries(), 3);
        assert_eq!(step.revert_retries(), 1);
        assert_eq!(step.wait_between_attempts(), Duration::from_millis(10));
    }
}
