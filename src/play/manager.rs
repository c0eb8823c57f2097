//! Plays running in the background, keyed by play name
//!
//! [`PlayManager::start`] spawns a [`PlayRunner::run`] on the tokio runtime.
//! A play can be awaited or cancelled; either way the caller gets the
//! [`PlayTracker`] back, so a cancelled play can be resumed later from the
//! step it was on.

use crate::core::errors::{Result, SchedulerError};
use crate::step::PlayContext;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::runner::{PlayReport, PlayRunner, PlayTracker};

/// How a play ended
#[derive(Debug)]
pub struct FinishedPlay {
    /// Position of the play when it stopped
    pub tracker: PlayTracker,
    pub result: Result<PlayReport>,
}

struct RunningPlay {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<FinishedPlay>,
}

#[derive(Clone)]
pub struct PlayManager {
    runner: Arc<PlayRunner>,
    plays: Arc<DashMap<String, RunningPlay>>,
}

impl PlayManager {
    pub fn new(runner: PlayRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            plays: Arc::new(DashMap::new()),
        }
    }

    pub fn runner(&self) -> &PlayRunner {
        &self.runner
    }

    /// Start `tracker.play_name` in the background.
    ///
    /// A name can be reused once the previous play finished; its result is
    /// discarded if nobody waited for it.
    pub fn start(&self, tracker: PlayTracker, ctx: Arc<PlayContext>) -> Result<()> {
        let play = tracker.play_name.clone();
        let entry = self.plays.entry(play.clone());
        if let Entry::Occupied(occupied) = &entry {
            if !occupied.get().handle.is_finished() {
                return Err(SchedulerError::PlayAlreadyRunning { play });
            }
        }

        let (cancel, cancel_rx) = oneshot::channel();
        let runner = self.runner.clone();
        let name = play.clone();
        let handle = tokio::spawn(async move {
            let mut tracker = tracker;
            let result = tokio::select! {
                result = runner.run(&mut tracker, &ctx) => result,
                Ok(()) = cancel_rx => Err(SchedulerError::PlayCancelled { play: name }),
            };
            FinishedPlay { tracker, result }
        });

        info!(play = %play, "play started");
        entry.insert(RunningPlay { cancel, handle });
        Ok(())
    }

    /// Whether a play with this name is started and not finished yet
    pub fn is_running(&self, play: &str) -> bool {
        self.plays
            .get(play)
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Names of the plays that have not finished yet
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .plays
            .iter()
            .filter(|entry| !entry.value().handle.is_finished())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Wait for a play to finish on its own
    pub async fn wait(&self, play: &str) -> Result<FinishedPlay> {
        let running = self.take(play)?;
        // keep the sender alive, dropping it is not a cancellation
        let _cancel = running.cancel;
        join(play, running.handle).await
    }

    /// Cancel a play and wait until its task has stopped.
    ///
    /// The returned tracker points at the step that was interrupted. A play
    /// that already finished is returned as it ended.
    pub async fn cancel_and_wait(&self, play: &str) -> Result<FinishedPlay> {
        let running = self.take(play)?;
        if running.cancel.send(()).is_err() {
            warn!(play, "play already stopped before cancellation");
        }
        let finished = join(play, running.handle).await?;
        info!(
            play,
            scene = %finished.tracker.scene,
            step = ?finished.tracker.current_step,
            "play cancelled"
        );
        Ok(finished)
    }

    fn take(&self, play: &str) -> Result<RunningPlay> {
        self.plays
            .remove(play)
            .map(|(_, running)| running)
            .ok_or_else(|| SchedulerError::PlayNotRunning {
                play: play.to_string(),
            })
    }
}

impl std::fmt::Debug for PlayManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayManager")
            .field("plays", &self.running())
            .finish()
    }
}

async fn join(play: &str, handle: JoinHandle<FinishedPlay>) -> Result<FinishedPlay> {
    handle
        .await
        .map_err(|e| SchedulerError::internal(format!("task of play '{play}' failed: {e}")))
}
