// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;
use crate::definition::Trigger;
use std::collections::BTreeMap;

#[test]
fn log_without_step_parses() {
    let json = r#"{"LogAppended":{"execution_id":"exec-1","text":"hello\n"}}"#;

    let op: Operation = serde_json::from_str(json).unwrap();

    match op {
        Operation::LogAppended { step_id, text, .. } => {
            assert_eq!(step_id, None);
            assert_eq!(text, "hello\n");
        }
        _ => panic!("expected LogAppended"),
    }
}

#[test]
fn operations_survive_json() {
    let clock = FakeClock::new();
    let execution = Execution::new(
        "exec-1",
        "ci",
        Trigger::manual("ci-bot"),
        BTreeMap::new(),
        2,
        &clock,
    );
    let step = StepExecution::new("se-1", execution.id.clone(), "build", 1, &clock);

    let ops = vec![
        Operation::ExecutionCreated {
            execution: execution.clone(),
        },
        Operation::StepAttemptCreated { step },
        Operation::LogAppended {
            execution_id: execution.id.clone(),
            step_id: Some("build".to_string()),
            text: "compiling\n".to_string(),
        },
    ];

    for op in ops {
        let json = serde_json::to_string(&op).unwrap();
        let parsed: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.execution_id(), &ExecutionId::from("exec-1"));
        assert_eq!(op, parsed);
    }
}

#[test]
fn names_are_snake_case() {
    let op = Operation::LogAppended {
        execution_id: ExecutionId::from("e"),
        step_id: None,
        text: String::new(),
    };
    assert_eq!(op.name(), "log_appended");
}
