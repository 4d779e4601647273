// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use std::sync::Mutex;

#[test]
fn builtins_cover_every_known_kind() {
    let registry = ExecutorRegistry::with_builtins();
    for kind in [
        StepKind::Shell,
        StepKind::Test,
        StepKind::Checkout,
        StepKind::ContainerBuild,
        StepKind::Deploy,
        StepKind::Notify,
    ] {
        assert!(registry.supports(&kind), "missing executor for {}", kind);
    }
    assert!(!registry.supports(&StepKind::Custom("helm".into())));
}

#[tokio::test]
async fn custom_kind_dispatches_to_registered_executor() {
    let fake = FakeStepExecutor::new();
    let mut registry = ExecutorRegistry::new();
    registry.register("helm", fake.clone());

    let executor = registry.get(&StepKind::Custom("helm".into())).unwrap();
    let ctx = StepContext {
        execution_id: ExecutionId::from("exec-1"),
        step_id: "chart".to_string(),
        attempt: 1,
        kind: StepKind::Custom("helm".into()),
        params: BTreeMap::new(),
        env: BTreeMap::new(),
        cancel: CancellationToken::new(),
        logs: LogSink::discard(),
    };
    executor.run(ctx).await.unwrap();

    assert_eq!(fake.attempts("chart"), 1);
}

#[tokio::test]
async fn message_executor_logs_and_returns_message() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&lines);
    let ctx = StepContext {
        execution_id: ExecutionId::from("exec-1"),
        step_id: "announce".to_string(),
        attempt: 1,
        kind: StepKind::Notify,
        params: BTreeMap::from([
            ("message".to_string(), json!("deployed")),
            ("channel".to_string(), json!("#releases")),
        ]),
        env: BTreeMap::new(),
        cancel: CancellationToken::new(),
        logs: LogSink::new(move |text| captured.lock().unwrap().push(text.to_string())),
    };

    let output = MessageExecutor.run(ctx).await.unwrap();

    assert_eq!(output, StepOutput::success("[#releases] deployed"));
    assert_eq!(*lines.lock().unwrap(), vec!["[#releases] deployed\n".to_string()]);
}

#[tokio::test]
async fn message_executor_requires_message() {
    let ctx = StepContext {
        execution_id: ExecutionId::from("exec-1"),
        step_id: "announce".to_string(),
        attempt: 1,
        kind: StepKind::Notify,
        params: BTreeMap::new(),
        env: BTreeMap::new(),
        cancel: CancellationToken::new(),
        logs: LogSink::discard(),
    };
    let result = MessageExecutor.run(ctx).await;
    assert!(matches!(result, Err(StepError::InvalidParams(_))));
}
