// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pw_adapters::{FakeBackendAdapter, FakeNotifyAdapter, FakeRun};
use pw_core::{
    AdapterError, ErrorKind, ExecutionMode, FakeClock, ParallelGroupSpec, RetryPolicy, SequentialIdGen, Status,
    StepSpec, SyncPolicy,
};
use std::collections::HashMap;
use std::time::Duration;

type TestEngine = Engine<FakeClock, SequentialIdGen>;

struct Setup {
    engine: TestEngine,
    local: FakeBackendAdapter,
    events: FakeNotifyAdapter,
}

fn config() -> EngineConfig {
    EngineConfig {
        max_workers: 8,
        poll_interval: Duration::from_secs(1),
        default_step_timeout: Duration::from_secs(3600),
        cancel_grace: Duration::from_secs(1),
        max_backoff: Duration::from_secs(60),
        ..EngineConfig::default()
    }
}

fn setup_with(config: EngineConfig, store: Store, remotes: &[FakeBackendAdapter]) -> Setup {
    let local = FakeBackendAdapter::new(Backend::Local);
    let mut registry = AdapterRegistry::new();
    registry.register(local.clone());
    for remote in remotes {
        registry.register(remote.clone());
    }
    let events = FakeNotifyAdapter::new();
    let engine = Engine::new(
        registry,
        store,
        config,
        FakeClock::new(),
        SequentialIdGen::new("id"),
    )
    .with_notify(Arc::new(events.clone()));
    Setup {
        engine,
        local,
        events,
    }
}

fn setup() -> Setup {
    setup_with(config(), Store::in_memory(), &[])
}

fn shell(id: &str, stage: u32) -> StepSpec {
    StepSpec::new(id, "shell", stage).with_param("command", format!("make {}", id))
}

/// checkout -> {a, b, c} in g1 -> deploy
fn three_stage(policy: SyncPolicy) -> PipelineDefinition {
    PipelineDefinition::new("release")
        .with_group(ParallelGroupSpec::new("g1", policy))
        .with_step(shell("checkout", 1))
        .with_step(shell("a", 2).in_group("g1"))
        .with_step(shell("b", 2).in_group("g1"))
        .with_step(shell("c", 2).in_group("g1"))
        .with_step(shell("deploy", 3))
}

impl Setup {
    async fn start(&self, definition: PipelineDefinition) -> Execution {
        self.engine
            .execute(Arc::new(definition), Trigger::manual("ci"))
            .await
            .unwrap()
    }

    async fn run(&self, definition: PipelineDefinition) -> Execution {
        let execution = self.start(definition).await;
        self.engine.wait(&execution.id).await.unwrap()
    }

    fn latest(&self, id: &ExecutionId) -> BTreeMap<String, Status> {
        self.engine
            .status(id)
            .unwrap()
            .latest()
            .into_iter()
            .map(|(step, attempt)| (step.to_string(), attempt.status))
            .collect()
    }

    fn launched(&self, step: &str) -> bool {
        self.local.launches().iter().any(|(s, _)| s == step)
    }
}

#[tokio::test(start_paused = true)]
async fn execute_returns_pending_then_runs_to_success() {
    let s = setup();
    let definition = PipelineDefinition::new("ci")
        .with_step(shell("build", 1))
        .with_step(shell("test", 2))
        .with_step(shell("package", 3));

    let execution = s.start(definition).await;
    assert_eq!(execution.status, Status::Pending);
    assert_eq!(execution.stage_count, 3);

    let done = s.engine.wait(&execution.id).await.unwrap();
    assert_eq!(done.status, Status::Success);
    assert!(done.error.is_none());
    assert_eq!(
        s.local
            .launches()
            .into_iter()
            .map(|(step, _)| step)
            .collect::<Vec<_>>(),
        vec!["build", "test", "package"]
    );
}

#[tokio::test(start_paused = true)]
async fn wait_all_failure_stops_later_stages() {
    let s = setup();
    s.local
        .script("b", vec![FakeRun::fail().after_polls(3)]);

    let done = s.run(three_stage(SyncPolicy::WaitAll)).await;

    assert_eq!(done.status, Status::Failed);
    let error = done.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Step);
    assert!(error.message.contains("g1"), "{}", error.message);
    assert!(error.message.contains("b"), "{}", error.message);

    let latest = s.latest(&done.id);
    assert_eq!(latest["a"], Status::Success);
    assert_eq!(latest["c"], Status::Success);
    assert_eq!(latest["b"], Status::Failed);
    assert!(!latest.contains_key("deploy"));
    assert!(!s.launched("deploy"));
}

#[tokio::test(start_paused = true)]
async fn wait_any_success_lets_the_execution_continue() {
    let s = setup();
    s.local.script("b", vec![FakeRun::fail()]);
    s.local
        .script("a", vec![FakeRun::succeed().after_polls(1)]);
    s.local
        .script("c", vec![FakeRun::succeed().after_polls(500)]);

    let done = s.run(three_stage(SyncPolicy::WaitAny)).await;

    assert_eq!(done.status, Status::Success);
    let latest = s.latest(&done.id);
    assert_eq!(latest["a"], Status::Success);
    assert_eq!(latest["b"], Status::Failed);
    assert_eq!(latest["deploy"], Status::Success);
}

#[tokio::test(start_paused = true)]
async fn fail_fast_cancels_slow_siblings() {
    let s = setup();
    s.local
        .script("a", vec![FakeRun::succeed().after_polls(500)]);
    s.local.script("b", vec![FakeRun::fail().after_polls(1)]);
    s.local
        .script("c", vec![FakeRun::succeed().after_polls(500)]);
    let start = tokio::time::Instant::now();

    let done = s.run(three_stage(SyncPolicy::FailFast)).await;

    assert_eq!(done.status, Status::Failed);
    assert!(start.elapsed() < Duration::from_secs(60));
    let latest = s.latest(&done.id);
    assert_eq!(latest["a"], Status::Cancelled);
    assert_eq!(latest["c"], Status::Cancelled);
    let cancelled = s.local.cancelled_steps();
    assert!(cancelled.contains(&"a".to_string()));
    assert!(cancelled.contains(&"c".to_string()));

    // No member moved to success after the failure was recorded
    let events = s.events.status_events();
    let failed_at = events
        .iter()
        .position(|e| e.step_id.as_deref() == Some("b") && e.new_status == Status::Failed)
        .unwrap();
    assert!(events[failed_at..]
        .iter()
        .all(|e| e.new_status != Status::Success || e.step_id.is_none()));
}

#[tokio::test(start_paused = true)]
async fn retried_step_records_every_attempt() {
    let s = setup();
    s.local.script(
        "flaky",
        vec![FakeRun::fail(), FakeRun::fail(), FakeRun::succeed()],
    );
    let definition = PipelineDefinition::new("ci").with_step(
        shell("flaky", 1).with_retry(RetryPolicy::new(2, Duration::from_secs(1))),
    );

    let done = s.run(definition).await;

    assert_eq!(done.status, Status::Success);
    let snapshot = s.engine.status(&done.id).unwrap();
    let attempts: Vec<(u32, Status)> = snapshot
        .attempts_of("flaky")
        .iter()
        .map(|a| (a.attempt, a.status))
        .collect();
    assert_eq!(
        attempts,
        vec![(1, Status::Failed), (2, Status::Failed), (3, Status::Success)]
    );
}

#[tokio::test(start_paused = true)]
async fn attempt_count_is_bounded_by_first_success() {
    // (max_retries, failures before success, expected attempts, final status)
    let cases = [
        (0, 0, 1, Status::Success),
        (0, 1, 1, Status::Failed),
        (3, 1, 2, Status::Success),
        (3, 3, 4, Status::Success),
        (2, 5, 3, Status::Failed),
    ];
    for (max_retries, failures, expected, status) in cases {
        let s = setup();
        let mut runs = vec![FakeRun::fail(); failures];
        runs.push(FakeRun::succeed());
        s.local.script("step", runs);
        let definition = PipelineDefinition::new("ci").with_step(
            shell("step", 1).with_retry(RetryPolicy::new(max_retries, Duration::from_secs(1))),
        );

        let done = s.run(definition).await;

        let snapshot = s.engine.status(&done.id).unwrap();
        assert_eq!(
            snapshot.attempts_of("step").len(),
            expected,
            "max_retries={} failures={}",
            max_retries,
            failures
        );
        assert_eq!(done.status, status);
    }
}

#[tokio::test(start_paused = true)]
async fn status_transitions_are_monotonic() {
    let s = setup();
    s.local
        .script("a", vec![FakeRun::fail(), FakeRun::succeed()]);
    s.local.script("b", vec![FakeRun::fail().after_polls(2)]);
    s.local
        .script("c", vec![FakeRun::succeed().after_polls(100)]);
    let mut definition = three_stage(SyncPolicy::FailFast);
    definition.steps[1].retry = RetryPolicy::new(1, Duration::from_secs(1));

    let done = s.run(definition).await;
    assert!(done.is_terminal());
    tokio::time::sleep(Duration::from_secs(5)).await;

    let mut last: HashMap<(Option<String>, Option<u32>), Status> = HashMap::new();
    for event in s.events.status_events() {
        let key = (event.step_id.clone(), event.attempt);
        let previous = last.get(&key).copied().unwrap_or(Status::Pending);
        assert!(!previous.is_terminal(), "transition after terminal: {:?}", event);
        assert_eq!(event.old_status, previous, "{:?}", event);
        last.insert(key, event.new_status);
    }
    assert!(last.values().all(Status::is_terminal));
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_running_steps() {
    let s = setup();
    s.local
        .script("build", vec![FakeRun::succeed().after_polls(10_000)]);
    let execution = s
        .start(PipelineDefinition::new("ci").with_step(shell("build", 1)).with_step(shell("ship", 2)))
        .await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(s.engine.cancel(&execution.id));
    let done = s.engine.wait(&execution.id).await.unwrap();

    assert_eq!(done.status, Status::Cancelled);
    assert_eq!(done.error.as_ref().unwrap().kind, ErrorKind::Cancelled);
    assert_eq!(s.latest(&done.id)["build"], Status::Cancelled);
    assert_eq!(s.local.cancelled_steps(), vec!["build".to_string()]);
    assert!(!s.launched("ship"));
    assert!(!s.engine.cancel(&execution.id));
}

#[tokio::test(start_paused = true)]
async fn cancel_unknown_execution_is_false() {
    let s = setup();
    assert!(!s.engine.cancel(&ExecutionId::from("nope")));
}

#[tokio::test(start_paused = true)]
async fn global_timeout_times_out_the_execution() {
    let s = setup();
    s.local
        .script("soak", vec![FakeRun::succeed().after_polls(10_000)]);
    let definition = PipelineDefinition::new("nightly")
        .with_step(shell("soak", 1))
        .with_timeout(Duration::from_secs(30));
    let start = tokio::time::Instant::now();

    let done = s.run(definition).await;

    assert_eq!(done.status, Status::Timeout);
    assert!(start.elapsed() < Duration::from_secs(40));
    assert_eq!(s.latest(&done.id)["soak"], Status::Timeout);
}

#[tokio::test(start_paused = true)]
async fn group_timeout_fails_the_execution() {
    let s = setup();
    s.local
        .script("a", vec![FakeRun::succeed().after_polls(10_000)]);
    let definition = PipelineDefinition::new("ci")
        .with_group(
            ParallelGroupSpec::new("g1", SyncPolicy::WaitAll).with_timeout(Duration::from_secs(20)),
        )
        .with_step(shell("a", 1).in_group("g1"))
        .with_step(shell("b", 1).in_group("g1"));

    let done = s.run(definition).await;

    assert_eq!(done.status, Status::Failed);
    assert_eq!(done.error.unwrap().kind, ErrorKind::Timeout);
    let latest = s.latest(&done.id);
    assert_eq!(latest["a"], Status::Timeout);
    assert_eq!(latest["b"], Status::Success);
}

#[tokio::test(start_paused = true)]
async fn rejected_definitions_create_no_execution() {
    let s = setup();

    let unknown_dependency =
        PipelineDefinition::new("ci").with_step(shell("test", 1).depends_on("build"));
    let err = s
        .engine
        .execute(Arc::new(unknown_dependency), Trigger::manual("ci"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "{:?}", err);

    let missing_param = PipelineDefinition::new("ci").with_step(StepSpec::new("build", "shell", 1));
    let err = s
        .engine
        .execute(Arc::new(missing_param), Trigger::manual("ci"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "{:?}", err);

    let mut push_only = PipelineDefinition::new("ci").with_step(shell("build", 1));
    push_only.triggers = vec![TriggerKind::Push];
    let err = s
        .engine
        .execute(Arc::new(push_only), Trigger::manual("ci"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TriggerRejected { .. }), "{:?}", err);

    assert!(s.engine.executions().is_empty());
    assert!(s.local.launches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unhealthy_backend_is_not_routed_to() {
    let s = setup();
    s.local.set_healthy(false);

    let err = s
        .engine
        .execute(
            Arc::new(PipelineDefinition::new("ci").with_step(shell("build", 1))),
            Trigger::manual("ci"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Adapter(_)), "{:?}", err);
    assert!(s.engine.executions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unconfigured_backend_is_rejected() {
    let s = setup();
    let definition = PipelineDefinition::new("ci")
        .with_step(shell("build", 1))
        .with_mode(ExecutionMode::Gitlab);

    let err = s
        .engine
        .execute(Arc::new(definition), Trigger::manual("ci"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Adapter(AdapterError::Unsupported(_))), "{:?}", err);
}

#[tokio::test(start_paused = true)]
async fn hybrid_mode_routes_stages_by_hint() {
    let jenkins = FakeBackendAdapter::new(Backend::Jenkins);
    let s = setup_with(config(), Store::in_memory(), &[jenkins.clone()]);
    let definition = PipelineDefinition::new("hybrid")
        .with_mode(ExecutionMode::Hybrid)
        .with_step(shell("compile", 1).with_param("backend", "jenkins"))
        .with_step(shell("smoke", 2));

    let done = s.run(definition).await;

    assert_eq!(done.status, Status::Success);
    assert_eq!(jenkins.launches(), vec![("compile".to_string(), 1)]);
    assert_eq!(s.local.launches(), vec![("smoke".to_string(), 1)]);
    let snapshot = s.engine.status(&done.id).unwrap();
    assert_eq!(snapshot.latest()["compile"].backend, Some(Backend::Jenkins));
}

#[tokio::test(start_paused = true)]
async fn parameters_merge_trigger_over_defaults() {
    let s = setup();
    let mut definition = PipelineDefinition::new("ci").with_step(shell("build", 1));
    definition
        .parameters
        .insert("channel".to_string(), "stable".to_string());
    definition
        .parameters
        .insert("arch".to_string(), "x86_64".to_string());

    let execution = s
        .engine
        .execute(
            Arc::new(definition),
            Trigger::manual("ci").with_param("channel", "beta"),
        )
        .await
        .unwrap();

    assert_eq!(execution.parameters["channel"], "beta");
    assert_eq!(execution.parameters["arch"], "x86_64");
}

#[tokio::test(start_paused = true)]
async fn conditions_see_earlier_stage_outcomes() {
    let s = setup();
    s.local.script("tests", vec![FakeRun::fail()]);
    let definition = PipelineDefinition::new("ci")
        .with_step(shell("tests", 1).allow_failure())
        .with_step(shell("publish", 2).with_condition("steps.tests.status == 'success'"))
        .with_step(shell("report", 2).with_condition("steps.tests.status == 'failed'"));

    let done = s.run(definition).await;

    assert_eq!(done.status, Status::Success);
    let latest = s.latest(&done.id);
    assert_eq!(latest["tests"], Status::Failed);
    assert_eq!(latest["publish"], Status::Skipped);
    assert_eq!(latest["report"], Status::Success);
    assert!(!s.launched("publish"));
}

#[tokio::test(start_paused = true)]
async fn logs_are_readable_per_step() {
    let s = setup();
    s.local
        .script("build", vec![FakeRun::succeed().with_logs("compiled 12 crates\n")]);
    s.local
        .script("test", vec![FakeRun::succeed().with_logs("ok: 40 passed\n")]);
    let done = s
        .run(
            PipelineDefinition::new("ci")
                .with_step(shell("build", 1))
                .with_step(shell("test", 2)),
        )
        .await;

    let all = s.engine.logs(&done.id, None, 0);
    assert_eq!(all.text, "compiled 12 crates\nok: 40 passed\n");
    let test = s.engine.logs(&done.id, Some("test"), 0);
    assert_eq!(test.text, "ok: 40 passed\n");
    assert_eq!(s.engine.logs(&done.id, Some("test"), test.cursor).text, "");
    assert_eq!(s.engine.logs(&ExecutionId::from("missing"), None, 0).text, "");
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_execution_events() {
    let s = setup();
    let mut events = s.engine.subscribe();

    let done = s
        .run(PipelineDefinition::new("ci").with_step(shell("build", 1)))
        .await;

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.execution_id(), &done.id);
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec![
            "execution:status",
            "stage:started",
            "step:status",
            "step:status",
            "stage:finished",
            "execution:status"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn worker_limit_bounds_concurrency() {
    let s = setup_with(
        EngineConfig {
            max_workers: 1,
            ..config()
        },
        Store::in_memory(),
        &[],
    );
    for step in ["a", "b", "c"] {
        s.local
            .script(step, vec![FakeRun::succeed().after_polls(4)]);
    }
    let definition = PipelineDefinition::new("ci")
        .with_step(shell("a", 1))
        .with_step(shell("b", 1))
        .with_step(shell("c", 1));
    let start = tokio::time::Instant::now();

    let done = s.run(definition).await;

    assert_eq!(done.status, Status::Success);
    // Five polls each, one at a time
    assert!(start.elapsed() >= Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn resume_reruns_only_unfinished_stages() {
    let s = setup();
    s.local.script("b", vec![FakeRun::fail()]);
    let definition = three_stage(SyncPolicy::WaitAll);
    let failed = s.run(definition).await;
    assert_eq!(failed.status, Status::Failed);
    let before = s.engine.status(&failed.id).unwrap();

    s.local.script("b", vec![FakeRun::succeed()]);
    let launches_before = s.local.launches().len();
    let resumed = s.engine.resume(&failed.id).await.unwrap();
    assert_eq!(resumed.trigger.kind, TriggerKind::Resume);
    assert_eq!(resumed.resumed_from.as_ref(), Some(&failed.id));
    assert_eq!(resumed.start_stage, 1);
    assert_eq!(resumed.parameters, failed.parameters);

    let done = s.engine.wait(&resumed.id).await.unwrap();
    assert_eq!(done.status, Status::Success);

    let relaunched: Vec<String> = s.local.launches()[launches_before..]
        .iter()
        .map(|(step, _)| step.clone())
        .collect();
    assert!(!relaunched.contains(&"checkout".to_string()));
    assert!(relaunched.contains(&"b".to_string()));
    assert!(relaunched.contains(&"deploy".to_string()));

    assert_eq!(s.engine.status(&failed.id).unwrap(), before);
    assert!(!s.latest(&done.id).contains_key("checkout"));
}

#[tokio::test(start_paused = true)]
async fn resume_starts_after_a_passed_wait_any_stage() {
    let s = setup();
    s.local.script("b", vec![FakeRun::fail()]);
    s.local
        .script("a", vec![FakeRun::succeed().after_polls(1)]);
    s.local
        .script("c", vec![FakeRun::succeed().after_polls(500)]);
    s.local.script("deploy", vec![FakeRun::fail()]);
    let failed = s.run(three_stage(SyncPolicy::WaitAny)).await;
    assert_eq!(failed.status, Status::Failed);

    s.local.script("deploy", vec![FakeRun::succeed()]);
    let launches_before = s.local.launches().len();
    let resumed = s.engine.resume(&failed.id).await.unwrap();
    assert_eq!(resumed.start_stage, 2);

    let done = s.engine.wait(&resumed.id).await.unwrap();
    assert_eq!(done.status, Status::Success);
    let relaunched: Vec<String> = s.local.launches()[launches_before..]
        .iter()
        .map(|(step, _)| step.clone())
        .collect();
    assert_eq!(relaunched, vec!["deploy".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn resume_requires_a_resumable_execution() {
    let s = setup();
    let done = s
        .run(PipelineDefinition::new("ci").with_step(shell("build", 1)))
        .await;

    let err = s.engine.resume(&done.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotResumable { .. }), "{:?}", err);
    assert!(s.engine.lock_definitions().is_empty());

    let err = s.engine.resume(&ExecutionId::from("nope")).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)), "{:?}", err);
}

#[tokio::test(start_paused = true)]
async fn failed_execution_keeps_its_definition() {
    let s = setup();
    s.local.script("build", vec![FakeRun::fail()]);
    let failed = s
        .run(PipelineDefinition::new("ci").with_step(shell("build", 1)))
        .await;

    assert!(s.engine.lock_definitions().contains_key(&failed.id));
}

#[tokio::test(start_paused = true)]
async fn resume_with_checks_the_pipeline_name() {
    let s = setup();
    s.local.script("build", vec![FakeRun::fail()]);
    let failed = s
        .run(PipelineDefinition::new("ci").with_step(shell("build", 1)))
        .await;

    let other = PipelineDefinition::new("other").with_step(shell("build", 1));
    let err = s
        .engine
        .resume_with(&failed.id, Arc::new(other))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::DefinitionMismatch { .. }), "{:?}", err);
}

#[tokio::test(start_paused = true)]
async fn recover_fails_executions_left_unfinished() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(crate::WAL_FILE);
    {
        let mut store = Store::open(&path).unwrap();
        let execution = Execution::new(
            "orphan",
            "ci",
            Trigger::manual("ci"),
            BTreeMap::new(),
            1,
            &FakeClock::new(),
        );
        store
            .commit(pw_core::Operation::ExecutionCreated { execution })
            .unwrap();
    }

    let s = setup_with(config(), Store::open(&path).unwrap(), &[]);
    let recovered = s.engine.recover().await;

    assert_eq!(recovered, vec![ExecutionId::from("orphan")]);
    let orphan = s.engine.status(&ExecutionId::from("orphan")).unwrap();
    assert_eq!(orphan.execution.status, Status::Failed);
    assert!(orphan.execution.is_resumable());
}

#[tokio::test(start_paused = true)]
async fn render_uses_the_backend_adapter() {
    let s = setup();
    let definition = PipelineDefinition::new("ci").with_step(shell("build", 1));

    let artifact = s.engine.render(&definition, Backend::Local).unwrap();
    assert_eq!(artifact.backend, Backend::Local);

    let err = s.engine.render(&definition, Backend::Github).unwrap_err();
    assert!(matches!(err, EngineError::Adapter(_)));
}
