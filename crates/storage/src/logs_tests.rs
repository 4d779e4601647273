// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn book() -> (LogBook, ExecutionId) {
    let id = ExecutionId::from("exec-1");
    let mut book = LogBook::default();
    book.append(&id, Some("build"), "compiling\n");
    book.append(&id, Some("test"), "running 3 tests\n");
    book.append(&id, None, "stage 1 done\n");
    book.append(&id, Some("build"), "finished\n");
    (book, id)
}

#[test]
fn reads_whole_execution_in_order() {
    let (book, id) = book();
    let chunk = book.read(&id, None, 0);
    assert_eq!(
        chunk.text,
        "compiling\nrunning 3 tests\nstage 1 done\nfinished\n"
    );
    assert_eq!(chunk.cursor, 4);
}

#[test]
fn filters_by_step() {
    let (book, id) = book();
    let chunk = book.read(&id, Some("build"), 0);
    assert_eq!(chunk.text, "compiling\nfinished\n");
    assert_eq!(chunk.cursor, 2);
}

#[test]
fn cursor_returns_only_new_text() {
    let (mut book, id) = book();
    let first = book.read(&id, Some("build"), 0);

    book.append(&id, Some("build"), "linked\n");
    let second = book.read(&id, Some("build"), first.cursor);

    assert_eq!(second.text, "linked\n");
    assert_eq!(second.cursor, 3);

    let idle = book.read(&id, Some("build"), second.cursor);
    assert!(idle.text.is_empty());
    assert_eq!(idle.cursor, 3);
}

#[test]
fn unknown_execution_is_empty() {
    let book = LogBook::default();
    let chunk = book.read(&ExecutionId::from("nope"), None, 7);
    assert_eq!(chunk, LogChunk { text: String::new(), cursor: 7 });
}

#[test]
fn empty_text_is_not_recorded() {
    let mut book = LogBook::default();
    let id = ExecutionId::from("exec-1");
    book.append(&id, None, "");
    assert!(book.is_empty(&id));
}
