//! WaveRunner: concurrency inside a wave, ordering across waves, reverts

use dy_scheduler::dag::{DagManager, RunOutcome, WaveRunner, WorkflowDefinition};
use dy_scheduler::step::{partial_state, FnStep, PartialState, PlayContext, Step, StepRegistry};
use dy_scheduler::SchedulerConfig;
use futures::FutureExt;
use serde_json::json;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Journal = Arc<Mutex<Vec<String>>>;

/// Step that journals its execute and revert calls
fn journaled(name: &'static str, journal: &Journal) -> Arc<dyn Step> {
    let on_execute = journal.clone();
    let on_revert = journal.clone();
    FnStep::new(name, move |_| {
        let journal = on_execute.clone();
        async move {
            journal.lock().unwrap().push(format!("apply:{name}"));
            Ok::<_, anyhow::Error>(partial_state([(name, json!(true))]))
        }
        .boxed()
    })
    .with_revert(move |_| {
        let journal = on_revert.clone();
        async move {
            journal.lock().unwrap().push(format!("revert:{name}"));
            Ok::<_, anyhow::Error>(PartialState::new())
        }
        .boxed()
    })
    .into_step()
}

fn failing(name: &'static str) -> Arc<dyn Step> {
    FnStep::new(name, |_| {
        async { Err::<PartialState, _>(anyhow::anyhow!("docker daemon unreachable")) }.boxed()
    })
    .into_step()
}

/// Step whose execute fails `failures` times before succeeding
fn flaky(name: &'static str, failures: u32, calls: &Arc<AtomicU32>) -> FnStep {
    let calls = calls.clone();
    FnStep::new(name, move |_| {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if call < failures {
                anyhow::bail!("registry timeout on attempt {}", call + 1);
            }
            Ok(partial_state([(name, json!(true))]))
        }
        .boxed()
    })
}

fn manager(definition: WorkflowDefinition) -> DagManager {
    let mut manager = DagManager::new();
    manager.register_workflow("wf", definition).unwrap();
    manager.setup().unwrap();
    manager
}

fn position(journal: &Journal, entry: &str) -> usize {
    journal
        .lock()
        .unwrap()
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("{entry} never ran"))
}

#[tokio::test]
async fn test_waves_run_in_order() {
    let journal: Journal = Arc::default();
    let registry = StepRegistry::new();
    for name in ["A", "B", "C", "D"] {
        registry.register(journaled(name, &journal));
    }
    let manager = manager(WorkflowDefinition::from_pairs([
        ("A", vec![]),
        ("B", vec!["A"]),
        ("C", vec!["A"]),
        ("D", vec!["B", "C", "A"]),
    ]));

    let runner = WaveRunner::new(registry, &SchedulerConfig::development());
    let ctx = PlayContext::new();
    let report = runner.run_workflow(&manager, "wf", &ctx).await.unwrap();

    assert!(report.is_success());
    assert!(position(&journal, "apply:A") < position(&journal, "apply:B"));
    assert!(position(&journal, "apply:A") < position(&journal, "apply:C"));
    assert!(position(&journal, "apply:B") < position(&journal, "apply:D"));
    assert!(position(&journal, "apply:C") < position(&journal, "apply:D"));
    assert_eq!(ctx.len(), 4);

    let report = runner.revert_workflow(&manager, "wf", &ctx).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.reverted.first().map(String::as_str), Some("D"));
    assert_eq!(report.reverted.last().map(String::as_str), Some("A"));
}

#[tokio::test]
async fn test_parallelism_is_bounded() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let registry = StepRegistry::new();
    let mut definition = WorkflowDefinition::new();

    for i in 0..6 {
        let name = format!("step_{i}");
        let (running, peak) = (running.clone(), peak.clone());
        registry.register(
            FnStep::new(name.clone(), move |_| {
                let (running, peak) = (running.clone(), peak.clone());
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(PartialState::new())
                }
                .boxed()
            })
            .into_step(),
        );
        definition = definition.step(name, &[]);
    }

    let config = SchedulerConfig::builder().max_parallel_steps(2).build().unwrap();
    let runner = WaveRunner::new(registry, &config);
    let report = runner
        .run_workflow(&manager(definition), "wf", &PlayContext::new())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.completed[0].len(), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_failed_wave_reverts_started_steps() {
    let journal: Journal = Arc::default();
    let registry = StepRegistry::new();
    registry.register(journaled("pull", &journal));
    registry.register(journaled("volumes", &journal));
    registry.register(failing("sidecar"));
    registry.register(journaled("proxy", &journal));

    let manager = manager(
        WorkflowDefinition::new()
            .step("pull", &[])
            .step("volumes", &["pull"])
            .step("sidecar", &["pull"])
            .step("proxy", &["sidecar"]),
    );
    let runner = WaveRunner::new(registry, &SchedulerConfig::development());
    let report = runner
        .run_workflow(&manager, "wf", &PlayContext::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Reverted);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "sidecar");
    assert!(report.failed[0].1.contains("docker daemon unreachable"));

    // proxy never started, so it is neither applied nor reverted
    let entries = journal.lock().unwrap().clone();
    assert!(!entries.iter().any(|e| e.ends_with(":proxy")));
    assert!(position(&journal, "revert:volumes") < position(&journal, "revert:pull"));
    assert!(report.reverted.contains(&"sidecar".to_string()));
}

#[tokio::test]
async fn test_failed_wave_without_revert() {
    let journal: Journal = Arc::default();
    let registry = StepRegistry::new();
    registry.register(journaled("pull", &journal));
    registry.register(failing("sidecar"));

    let manager = manager(WorkflowDefinition::new().step("pull", &[]).step("sidecar", &["pull"]));
    let config = SchedulerConfig::builder().revert_on_failure(false).build().unwrap();
    let report = WaveRunner::new(registry, &config)
        .run_workflow(&manager, "wf", &PlayContext::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert!(report.reverted.is_empty());
    assert_eq!(*journal.lock().unwrap(), vec!["apply:pull".to_string()]);
}

#[tokio::test]
async fn test_step_timeout() {
    let registry = StepRegistry::new();
    registry.register(
        FnStep::new("slow", |_| {
            async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Ok::<_, anyhow::Error>(PartialState::new())
            }
            .boxed()
        })
        .into_step(),
    );
    let config = SchedulerConfig::builder()
        .step_timeout(Some(Duration::from_millis(200)))
        .revert_on_failure(false)
        .build()
        .unwrap();

    let report = WaveRunner::new(registry, &config)
        .run_workflow(&manager(WorkflowDefinition::new().step("slow", &[])), "wf", &PlayContext::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert!(report.failed[0].1.contains("timed out"));
}

#[tokio::test]
async fn test_failed_revert_is_not_reported_as_reverted() {
    let registry = StepRegistry::new();
    registry.register(
        FnStep::new("volumes", |_| {
            async { Ok::<_, anyhow::Error>(PartialState::new()) }.boxed()
        })
        .with_revert(|_| {
            async { Err::<PartialState, _>(anyhow::anyhow!("cannot remove volume")) }.boxed()
        })
        .into_step(),
    );
    registry.register(failing("sidecar"));

    let manager = manager(WorkflowDefinition::new().step("volumes", &[]).step("sidecar", &[]));
    let report = WaveRunner::new(registry, &SchedulerConfig::development())
        .run_workflow(&manager, "wf", &PlayContext::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::RevertFailed);
    assert!(!report.is_success());
    assert_eq!(report.revert_failures.len(), 1);
    assert_eq!(report.revert_failures[0].0, "volumes");
    assert!(report.revert_failures[0].1.contains("cannot remove volume"));
    assert_eq!(report.reverted, vec!["sidecar".to_string()]);
}

#[tokio::test]
async fn test_execute_retries() {
    let calls = Arc::new(AtomicU32::new(0));
    let registry = StepRegistry::new();
    registry.register(
        flaky("pull", 2, &calls)
            .with_execute_retries(2)
            .with_wait_between_attempts(Duration::from_millis(10))
            .into_step(),
    );
    let manager = manager(WorkflowDefinition::new().step("pull", &[]));
    let ctx = PlayContext::new();
    let report = WaveRunner::new(registry, &SchedulerConfig::development())
        .run_workflow(&manager, "wf", &ctx)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(ctx.get::<bool>("pull").unwrap());
}

#[tokio::test]
async fn test_execute_retries_exhausted() {
    let calls = Arc::new(AtomicU32::new(0));
    let registry = StepRegistry::new();
    registry.register(flaky("pull", 2, &calls).with_execute_retries(1).into_step());
    let manager = manager(WorkflowDefinition::new().step("pull", &[]));
    let config = SchedulerConfig::builder().revert_on_failure(false).build().unwrap();
    let report = WaveRunner::new(registry, &config)
        .run_workflow(&manager, "wf", &PlayContext::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(report.failed[0].1.contains("attempt 2"));
}

#[tokio::test]
async fn test_revert_requires_keys_and_retries() {
    let reverts = Arc::new(AtomicU32::new(0));
    let counter = reverts.clone();
    let registry = StepRegistry::new();
    registry.register(
        FnStep::new("volumes", |_| {
            async { Ok::<_, anyhow::Error>(PartialState::new()) }.boxed()
        })
        .with_revert_requires(["volume_id"])
        .with_revert_retries(1)
        .with_revert(move |_| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    anyhow::bail!("volume busy");
                }
                Ok(PartialState::new())
            }
            .boxed()
        })
        .into_step(),
    );
    let manager = manager(WorkflowDefinition::new().step("volumes", &[]));
    let runner = WaveRunner::new(registry, &SchedulerConfig::development());
    let ctx = PlayContext::new();

    // the revert body never runs without its keys
    let report = runner.revert_workflow(&manager, "wf", &ctx).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Failed);
    assert!(report.revert_failures[0].1.contains("volume_id"));
    assert_eq!(reverts.load(Ordering::SeqCst), 0);

    ctx.set("volume_id", "vol-1").unwrap();
    let report = runner.revert_workflow(&manager, "wf", &ctx).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.reverted, vec!["volumes".to_string()]);
    assert_eq!(reverts.load(Ordering::SeqCst), 2);
}
