use crate::core::config::SchedulerConfig;
use crate::core::errors::{Result, SchedulerError};
use crate::step::{run_attempts, PlayContext, Step};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::catalog::PlayCatalog;
use super::scene::SceneName;

/// Context key under which the last step failure is published before
/// switching to the `on_error_scene`
pub const EXCEPTION_INFO_KEY: &str = "exception_info";

/// Where a play currently is; persisted by the caller to resume a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayTracker {
    pub play_name: String,
    /// Scene being played, or the entry scene before the run starts
    pub scene: SceneName,
    pub current_step: Option<String>,
    /// Index of the step being run; a resumed run starts from here
    pub current_step_index: Option<usize>,
}

impl PlayTracker {
    pub fn new(play_name: impl Into<String>, entry_scene: impl Into<SceneName>) -> Self {
        Self {
            play_name: play_name.into(),
            scene: entry_scene.into(),
            current_step: None,
            current_step_index: None,
        }
    }
}

/// Failure recorded while a play was routed to an error scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneFailure {
    pub scene: SceneName,
    pub step: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct PlayReport {
    /// Scenes in the order they were played
    pub visited: Vec<SceneName>,
    /// Failures handled by an `on_error_scene`
    pub failures: Vec<SceneFailure>,
}

impl PlayReport {
    pub fn last_scene(&self) -> Option<&str> {
        self.visited.last().map(String::as_str)
    }
}

/// Drives scenes of a [`PlayCatalog`]: steps run one after the other, success
/// follows `next_scene`, failure follows `on_error_scene`.
#[derive(Debug, Clone)]
pub struct PlayRunner {
    catalog: PlayCatalog,
    max_scene_transitions: usize,
    step_timeout: Option<Duration>,
}

impl PlayRunner {
    pub fn new(catalog: PlayCatalog, config: &SchedulerConfig) -> Self {
        Self {
            catalog,
            max_scene_transitions: config.max_scene_transitions,
            step_timeout: config.step_timeout(),
        }
    }

    pub fn catalog(&self) -> &PlayCatalog {
        &self.catalog
    }

    /// Play from `tracker.scene` until a scene has nowhere to go.
    ///
    /// A step error in a scene without `on_error_scene` is returned as is.
    pub async fn run(&self, tracker: &mut PlayTracker, ctx: &PlayContext) -> Result<PlayReport> {
        let mut scene = self.catalog.get(&tracker.scene)?;
        let mut start_from = tracker.current_step_index.unwrap_or(0);
        let mut report = PlayReport::default();
        let mut transitions = 0;

        info!(play = %tracker.play_name, scene = %scene.name(), start_from, "starting play");

        loop {
            tracker.scene = scene.name().to_string();
            report.visited.push(scene.name().to_string());
            debug!(scene = %scene.name(), steps = ?scene.step_names(), "playing scene");

            let outcome = self
                .play_steps(scene.steps(), start_from, tracker, ctx)
                .await;
            start_from = 0;

            let next = match outcome {
                Ok(()) => scene.next_scene(),
                Err(e) => {
                    let Some(on_error_scene) = scene.on_error_scene() else {
                        error!(scene = %scene.name(), error = %e, "step failed, no error scene");
                        return Err(e);
                    };
                    error!(
                        scene = %scene.name(),
                        on_error_scene = %on_error_scene,
                        error = %e,
                        "step failed, switching to error scene"
                    );
                    let failure = SceneFailure {
                        scene: scene.name().to_string(),
                        step: tracker.current_step.clone().unwrap_or_default(),
                        message: e.to_string(),
                    };
                    // reserved key, whatever a step left there is overwritten
                    ctx.replace(EXCEPTION_INFO_KEY, &failure)?;
                    report.failures.push(failure);
                    Some(on_error_scene)
                }
            };

            match next {
                Some(name) => {
                    if transitions >= self.max_scene_transitions {
                        return Err(SchedulerError::SceneTransitionLimit {
                            play: tracker.play_name.clone(),
                            limit: self.max_scene_transitions,
                        });
                    }
                    transitions += 1;
                    scene = self.catalog.get(name)?;
                    tracker.current_step = None;
                    tracker.current_step_index = None;
                }
                None => break,
            }
        }

        info!(play = %tracker.play_name, visited = ?report.visited, "play finished");
        Ok(report)
    }

    async fn play_steps(
        &self,
        steps: &[Arc<dyn Step>],
        start_from: usize,
        tracker: &mut PlayTracker,
        ctx: &PlayContext,
    ) -> Result<()> {
        for (index, step) in steps.iter().enumerate().skip(start_from) {
            tracker.current_step = Some(step.name().to_string());
            tracker.current_step_index = Some(index);

            let required = step.requires();
            if let Some(missing) = ctx.missing(&required).first() {
                return Err(SchedulerError::NotInContext {
                    key: missing.to_string(),
                });
            }

            let step = step.as_ref();
            let partial = run_attempts(
                step.name(),
                &format!("step {}", step.name()),
                step.execute_retries(),
                step.wait_between_attempts(),
                self.step_timeout,
                move || step.execute(ctx),
            )
            .await?;
            debug!(step = %step.name(), outputs = partial.len(), "step done");
            ctx.update(partial)?;
        }
        Ok(())
    }
}

/// Failure details published by the last failing scene, if any
pub fn exception_info(ctx: &PlayContext) -> Result<Option<SceneFailure>> {
    ctx.get_opt(EXCEPTION_INFO_KEY)
}
