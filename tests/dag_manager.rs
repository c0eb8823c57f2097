//! DagManager: registration, setup lifecycle and wave ordering

use dy_scheduler::dag::{DagManager, Wave, WorkflowDefinition};
use dy_scheduler::SchedulerError;
use pretty_assertions::assert_eq;

fn wave(steps: &[&str]) -> Wave {
    steps.iter().map(|s| s.to_string()).collect()
}

fn diamond() -> WorkflowDefinition {
    WorkflowDefinition::from_pairs([
        ("A", vec![]),
        ("B", vec!["A"]),
        ("C", vec!["A"]),
        ("D", vec!["B", "C", "A"]),
    ])
}

fn set_up(workflows: &[(&str, WorkflowDefinition)]) -> DagManager {
    let mut manager = DagManager::new();
    for (name, definition) in workflows {
        manager.register_workflow(*name, definition.clone()).unwrap();
    }
    manager.setup().unwrap();
    manager
}

#[test]
fn test_diamond_waves() {
    let manager = set_up(&[("diamond", diamond())]);
    let sequences = manager.get_workflow_step_sequences("diamond").unwrap();

    assert_eq!(sequences.apply, vec![wave(&["A"]), wave(&["B", "C"]), wave(&["D"])]);
    assert_eq!(sequences.revert, vec![wave(&["D"]), wave(&["B", "C"]), wave(&["A"])]);
}

#[test]
fn test_revert_is_apply_reversed() {
    let chain = WorkflowDefinition::new()
        .step("pull", &[])
        .step("volumes", &[])
        .step("sidecar", &["pull", "volumes"])
        .step("proxy", &["sidecar"])
        .step("ports", &["sidecar"])
        .step("ready", &["proxy", "ports"]);
    let manager = set_up(&[("diamond", diamond()), ("chain", chain)]);

    for name in manager.registered_workflows() {
        let sequences = manager.get_workflow_step_sequences(&name).unwrap();
        let mut reversed = sequences.apply.clone();
        reversed.reverse();
        assert_eq!(reversed, sequences.revert, "workflow {name}");
    }
}

#[test]
fn test_dependencies_sit_in_earlier_waves() {
    let definition = WorkflowDefinition::new()
        .step("a", &[])
        .step("b", &["a"])
        .step("c", &[])
        .step("d", &["b", "c"])
        .step("e", &["a"])
        .step("f", &["d", "e"]);
    let manager = set_up(&[("wf", definition.clone())]);
    let sequences = manager.get_workflow_step_sequences("wf").unwrap();

    for step in definition.steps() {
        let index = sequences.apply_wave_index(&step.name).unwrap();
        if step.requires.is_empty() {
            assert_eq!(index, 0, "root step {} must be in the first wave", step.name);
        }
        for dependency in &step.requires {
            assert!(sequences.apply_wave_index(dependency).unwrap() < index);
        }
    }
    assert_eq!(sequences.step_count(), definition.len());
}

#[test]
fn test_cycle_fails_setup() {
    let mut manager = DagManager::new();
    manager
        .register_workflow(
            "cycle",
            WorkflowDefinition::from_pairs([("A", vec!["C"]), ("B", vec!["A"]), ("C", vec!["B"])]),
        )
        .unwrap();

    let err = manager.setup().unwrap_err();
    assert!(err.to_string().contains("not a DAG"));
    assert_eq!(err.category(), "graph_definition");
    assert!(!err.is_recoverable());
}

#[test]
fn test_cycle_fails_registration_after_setup() {
    let mut manager = set_up(&[("diamond", diamond())]);
    let err = manager
        .register_workflow(
            "cycle",
            WorkflowDefinition::from_pairs([("A", vec!["C"]), ("B", vec!["A"]), ("C", vec!["B"])]),
        )
        .unwrap_err();
    assert!(err.to_string().contains("not a DAG"));
    assert!(manager.get_workflow_definition("cycle").is_none());
}

#[test]
fn test_registering_twice_is_deterministic() {
    let mut manager = DagManager::new();
    manager.register_workflow("wf", diamond()).unwrap();
    manager.setup().unwrap();
    let first = manager.get_workflow_step_sequences("wf").unwrap();

    manager.register_workflow("wf", diamond()).unwrap();
    let second = manager.get_workflow_step_sequences("wf").unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_re_registration_overwrites() {
    let mut manager = DagManager::new();
    manager.register_workflow("wf", diamond()).unwrap();
    manager
        .register_workflow("wf", WorkflowDefinition::new().step("only", &[]))
        .unwrap();
    manager.setup().unwrap();

    assert_eq!(manager.registered_workflows(), vec!["wf".to_string()]);
    let sequences = manager.get_workflow_step_sequences("wf").unwrap();
    assert_eq!(sequences.apply, vec![wave(&["only"])]);

    // after setup the new definition replaces the cached sequences too
    manager.register_workflow("wf", diamond()).unwrap();
    assert_eq!(manager.get_workflow_step_sequences("wf").unwrap().apply.len(), 3);
}

#[test]
fn test_lookup_errors() {
    let mut manager = DagManager::new();
    manager.register_workflow("wf", diamond()).unwrap();
    assert!(matches!(
        manager.get_workflow_step_sequences("wf"),
        Err(SchedulerError::NotSetUp { .. })
    ));

    manager.setup().unwrap();
    match manager.get_workflow_step_sequences("other") {
        Err(SchedulerError::WorkflowNotRegistered { name, registered }) => {
            assert_eq!(name, "other");
            assert_eq!(registered, vec!["wf".to_string()]);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    manager.teardown();
    assert!(matches!(
        manager.get_workflow_step_sequences("wf"),
        Err(SchedulerError::NotSetUp { .. })
    ));
}

#[test]
fn test_independent_managers() {
    let first = set_up(&[("wf", diamond())]);
    let second = set_up(&[("wf", WorkflowDefinition::new().step("x", &[]))]);

    assert_eq!(first.get_workflow_step_sequences("wf").unwrap().step_count(), 4);
    assert_eq!(second.get_workflow_step_sequences("wf").unwrap().step_count(), 1);
}

#[test]
fn test_register_from_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("start_service.yaml");
    std::fs::write(
        &path,
        r#"
name: start_service
description: bring a dynamic service up
steps:
  - name: pull_images
  - name: create_volumes
  - name: start_sidecar
    requires: [pull_images, create_volumes]
  - name: start_proxy
    requires: [start_sidecar]
"#,
    )
    .unwrap();

    let mut manager = DagManager::new();
    let name = manager.register_yaml_file(&path).unwrap();
    assert_eq!(name, "start_service");
    manager.setup().unwrap();

    let sequences = manager.get_workflow_step_sequences(&name).unwrap();
    assert_eq!(
        sequences.apply,
        vec![
            wave(&["create_volumes", "pull_images"]),
            wave(&["start_sidecar"]),
            wave(&["start_proxy"]),
        ]
    );
}
