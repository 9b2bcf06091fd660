//! 선언적 스위트 로딩부터 실행, 스팬 내보내기까지의 통합 테스트
//!
//! - YAML 정의 → 레지스트리 빌드 → 실행 → 컨텍스트 트리 검증
//! - 허용된 스텝 실패가 시나리오를 중단하지 않음
//! - 치명적 실패 후에도 배포된 컴포넌트 정리
//! - 스팬 부모/자식 관계와 JSON lines 내보내기

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use serde::Deserialize;

use pipebench_core::action::StepEnv;
use pipebench_core::component::{Component, ComponentBuilder, ComponentPhase};
use pipebench_core::context::{ContextSnapshot, ExecutionContext, ExecutionStatus};
use pipebench_core::error::{ExecutionError, PipebenchError};
use pipebench_core::hook::HookStrategy;
use pipebench_core::loader::{SuiteFormat, parse_suite};
use pipebench_core::plugin::Registries;
use pipebench_core::telemetry::{
    JsonLinesClient, NoopMeterProvider, RecordingTracerProvider, TelemetryRuntime,
};
use pipebench_core::StepAction;

type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FlakyConfig {
    failures: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RecordingComponentConfig {
    fail_on: Option<ComponentPhase>,
}

fn registries(journal: &Journal) -> Registries {
    let mut reg = Registries::new();

    let log = Arc::clone(journal);
    reg.components.register("recording", move |name: &str, cfg: RecordingComponentConfig| {
        let mut builder = ComponentBuilder::new(name);
        for phase in ComponentPhase::ALL {
            let log = Arc::clone(&log);
            let label = format!("{name}.{phase}");
            let component = name.to_owned();
            let fail_on = cfg.fail_on;
            builder = builder.on(phase, move |_env| {
                log.lock().unwrap().push(label.clone());
                if fail_on == Some(phase) {
                    return Err(ExecutionError::PhaseFailure {
                        component: component.clone(),
                        phase: phase.value().to_owned(),
                        reason: "refused".to_owned(),
                    }
                    .into());
                }
                Ok(())
            });
        }
        Ok(Box::new(builder.build()?) as Box<dyn Component>)
    });

    let log = Arc::clone(journal);
    reg.actions.register("record", move |name: &str, _cfg: ()| {
        let log = Arc::clone(&log);
        let label = name.to_owned();
        let action = move |_env: &StepEnv<'_>| -> Result<serde_json::Value, PipebenchError> {
            log.lock().unwrap().push(format!("step.{label}"));
            Ok(serde_json::Value::Null)
        };
        Ok(Box::new(action) as Box<dyn StepAction>)
    });

    reg.actions.register("flaky", |name: &str, cfg: FlakyConfig| {
        let calls = AtomicU32::new(0);
        let step = name.to_owned();
        let action = move |_env: &StepEnv<'_>| -> Result<serde_json::Value, PipebenchError> {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= cfg.failures {
                return Err(ExecutionError::StepFailure {
                    step: step.clone(),
                    reason: format!("attempt {n} failed"),
                }
                .into());
            }
            Ok(serde_json::json!({ "calls": n }))
        };
        Ok(Box::new(action) as Box<dyn StepAction>)
    });

    let log = Arc::clone(journal);
    reg.hooks.register("note", move |name: &str, _cfg: ()| {
        let log = Arc::clone(&log);
        let label = name.to_owned();
        let hook = move |ctx: &ExecutionContext| -> Result<(), PipebenchError> {
            let element = ctx
                .get_framework_element()
                .map(|e| e.name)
                .unwrap_or_default();
            log.lock().unwrap().push(format!("hook.{label}@{element}"));
            Ok(())
        };
        Ok(Box::new(hook) as Box<dyn HookStrategy>)
    });

    reg
}

fn find<'a>(node: &'a ContextSnapshot, name: &str) -> Option<&'a ContextSnapshot> {
    if node.name == name {
        return Some(node);
    }
    node.children.iter().find_map(|c| find(c, name))
}

const SUITE: &str = r#"
name: integration
metadata:
  test.run: ci
components:
  - name: backend
    type: recording
  - name: loadgen
    type: recording
hooks:
  before_suite:
    - name: banner
      type: note
scenarios:
  - name: ramp
    hooks:
      before_scenario:
        - name: enter
          type: note
    steps:
      - name: always-fails
        action: flaky
        config: { failures: 100 }
        on_error: { retries: 1, continue: true }
      - name: recovers
        action: flaky
        config: { failures: 2 }
        on_error: { retries: 2 }
      - name: last
        action: record
        hooks:
          after_step:
            - name: done
              type: note
"#;

#[test]
fn tolerated_step_failure_does_not_abort_scenario() {
    let journal = Journal::default();
    let mut suite = parse_suite(SUITE, SuiteFormat::Yaml)
        .unwrap()
        .build(&registries(&journal))
        .unwrap();

    let report = suite.run(Arc::new(TelemetryRuntime::disabled()));
    assert!(report.is_success(), "suite failed: {:?}", report.error);

    let tree = report.snapshot();
    assert_eq!(tree.status, ExecutionStatus::Success);

    let failed = find(&tree, "always-fails").unwrap();
    assert_eq!(failed.kind, "step");
    assert_eq!(failed.status, ExecutionStatus::Error);
    assert_eq!(failed.error.as_ref().unwrap().kind, "StepFailure");

    let recovered = find(&tree, "recovers").unwrap();
    assert_eq!(recovered.status, ExecutionStatus::Success);
    assert_eq!(recovered.metadata["test.step.result"], serde_json::json!({ "calls": 3 }));

    // 허용된 실패는 조상 컨텍스트를 바꾸지 않음
    assert_eq!(find(&tree, "ramp").unwrap().status, ExecutionStatus::Success);

    let entries = journal.lock().unwrap().clone();
    assert!(entries.contains(&"step.last".to_owned()));
    assert!(entries.contains(&"hook.banner@integration".to_owned()));
    assert!(entries.contains(&"hook.enter@ramp".to_owned()));
    assert!(entries.contains(&"hook.done@last".to_owned()));
}

#[test]
fn components_walk_lifecycle_phase_major() {
    let journal = Journal::default();
    let mut suite = parse_suite(SUITE, SuiteFormat::Yaml)
        .unwrap()
        .build(&registries(&journal))
        .unwrap();
    suite.run(Arc::new(TelemetryRuntime::disabled()));

    let phases: Vec<String> = journal
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.starts_with("backend.") || e.starts_with("loadgen."))
        .cloned()
        .collect();
    assert_eq!(
        phases,
        vec![
            "backend.configure",
            "loadgen.configure",
            "backend.deploy",
            "loadgen.deploy",
            "backend.start",
            "loadgen.start",
            "backend.start_monitoring",
            "loadgen.start_monitoring",
            "loadgen.stop_monitoring",
            "backend.stop_monitoring",
            "loadgen.collect_monitoring_data",
            "backend.collect_monitoring_data",
            "loadgen.stop",
            "backend.stop",
            "loadgen.destroy",
            "backend.destroy",
        ]
    );
}

#[test]
fn fatal_phase_failure_still_destroys_deployed_components() {
    let content = r#"
name: broken
components:
  - name: backend
    type: recording
  - name: loadgen
    type: recording
    config: { fail_on: start }
scenarios:
  - name: never
    steps:
      - name: unreachable
        action: record
"#;
    let journal = Journal::default();
    let mut suite = parse_suite(content, SuiteFormat::Yaml)
        .unwrap()
        .build(&registries(&journal))
        .unwrap();
    let report = suite.run(Arc::new(TelemetryRuntime::disabled()));

    assert!(!report.is_success());
    let error = report.error.as_ref().unwrap();
    assert_eq!(error.kind(), "PhaseFailure");
    assert!(!error.is_load_error());

    let entries = journal.lock().unwrap().clone();
    assert!(!entries.contains(&"step.unreachable".to_owned()));
    // backend는 시작됐으므로 stop까지, loadgen은 start 실패라 destroy만
    assert!(entries.contains(&"backend.stop".to_owned()));
    assert!(!entries.contains(&"loadgen.stop".to_owned()));
    assert!(entries.contains(&"backend.destroy".to_owned()));
    assert!(entries.contains(&"loadgen.destroy".to_owned()));

    let tree = report.snapshot();
    assert_eq!(tree.status, ExecutionStatus::Error);
    assert!(find(&tree, "never").is_none());
}

#[test]
fn spans_follow_context_tree_and_export_as_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spans.jsonl");
    let tracer = Arc::new(RecordingTracerProvider::new());
    let telemetry = Arc::new(TelemetryRuntime::new(
        tracer.clone(),
        Arc::new(NoopMeterProvider),
        Arc::new(JsonLinesClient::new(&path)),
    ));

    let journal = Journal::default();
    let mut suite = parse_suite(SUITE, SuiteFormat::Yaml)
        .unwrap()
        .build(&registries(&journal))
        .unwrap();
    let report = suite.run(Arc::clone(&telemetry));
    assert!(report.is_success());

    let spans = tracer.finished_spans();
    let root = spans.iter().find(|s| s.name == "Run Suite integration").unwrap();
    assert!(root.parent_span_id.is_none());

    let scenario = spans.iter().find(|s| s.name == "Run Scenario ramp").unwrap();
    assert_eq!(scenario.parent_span_id.as_deref(), Some(root.span_id.as_str()));

    let step = spans.iter().find(|s| s.name == "Run Step always-fails").unwrap();
    assert_eq!(step.parent_span_id.as_deref(), Some(scenario.span_id.as_str()));
    assert!(step.status.is_error());
    assert_eq!(step.attributes["test.run"], "ci");

    let phase = spans
        .iter()
        .find(|s| s.name == "Run Component Phase backend deploy")
        .unwrap();
    assert_eq!(phase.parent_span_id.as_deref(), Some(root.span_id.as_str()));

    let exported = telemetry.flush().unwrap();
    assert_eq!(exported, spans.len());
    let lines = std::fs::read_to_string(&path).unwrap();
    assert_eq!(lines.lines().count(), spans.len());
    assert_eq!(telemetry.flush().unwrap(), 0);
}
