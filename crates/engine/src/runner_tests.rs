// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;
use yare::parameterized;

fn carry(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn strings(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|s| s.to_string()).collect()
}

#[test]
fn expands_filename_and_carry_macros() {
    let command = strings(&["/bin/echo", "%FILENAME%", "%TICKET%", "plain"]);
    let expanded = expand_macros(
        &command,
        Path::new("/w/a.txt"),
        &carry(&[("TICKET", "T-17")]),
    );
    assert_eq!(expanded, strings(&["/bin/echo", "/w/a.txt", "T-17", "plain"]));
}

#[test]
fn unknown_macros_stay_verbatim() {
    let command = strings(&["/bin/echo", "%UNSET%"]);
    let expanded = expand_macros(&command, Path::new("/w/a.txt"), &HashMap::new());
    assert_eq!(expanded[1], "%UNSET%");
}

#[parameterized(
    plain_word = { "FILENAME" },
    missing_close = { "%OPEN" },
    inner_percent = { "%A%B%" },
    empty_name = { "%%" },
    bad_chars = { "%A B%" },
)]
fn malformed_macros_are_not_macros(token: &str) {
    assert_eq!(macro_name(token), None);
}

#[test]
fn macro_name_accepts_the_allowed_alphabet() {
    assert_eq!(macro_name("%A9_z-%"), Some("A9_z-"));
}

#[tokio::test]
async fn synchronous_queue_runs_on_the_caller() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let queue = RunnerQueue::start("sync", None);
    let mut log = BlockLog::new();

    let command = strings(&[
        "/bin/sh",
        "-c",
        &format!("echo ran > {}", out.display()),
    ]);
    queue.run(&command, Path::new("/unused"), &HashMap::new(), &mut log).await;

    // Synchronous execution: the child has exited by the time run returns.
    assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "ran");
    assert!(log.lines()[0].contains("retcode=0"));
}

#[test]
fn rejects_non_executable_program() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("data.txt");
    std::fs::write(&plain, "not a program").unwrap();

    assert!(!is_executable_file(&plain));
    assert!(!is_executable_file(&dir.path().join("missing")));
    assert!(is_executable_file(Path::new("/bin/sh")));
}

#[tokio::test]
async fn run_logs_rejection_for_non_executable() {
    let queue = RunnerQueue::start("sync", None);
    let mut log = BlockLog::new();
    queue
        .run(
            &strings(&["/etc/hostname"]),
            Path::new("/unused"),
            &HashMap::new(),
            &mut log,
        )
        .await;
    assert!(log.lines()[0].contains("not an executable program"));
}

#[tokio::test]
async fn single_worker_queue_preserves_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("order");
    let queue = RunnerQueue::start("serial", Some(1));
    let mut log = BlockLog::new();

    for step in ["one", "two", "three"] {
        let command = strings(&[
            "/bin/sh",
            "-c",
            &format!("echo {} >> {}", step, out.display()),
        ]);
        queue.run(&command, Path::new("/unused"), &HashMap::new(), &mut log).await;
    }
    // Submissions return immediately; stop drains the queue in FIFO order.
    queue.stop().await;

    assert_eq!(std::fs::read_to_string(&out).unwrap(), "one\ntwo\nthree\n");
    assert!(log.lines().iter().all(|l| l.contains("queued program")));
}

#[tokio::test]
async fn stop_without_workers_is_a_no_op() {
    let queue = RunnerQueue::start("sync", Some(0));
    queue.stop().await;
}

#[tokio::test]
async fn queues_resolve_named_and_fall_back_to_default() {
    let queues = RunnerQueues::build(None, &[("slow".to_string(), Some(1))]);

    assert!(queues.contains("slow"));
    assert!(queues.contains(DEFAULT_QUEUE));
    assert!(!queues.contains("missing"));

    assert_eq!(queues.resolve("slow").label(), "slow");
    assert_eq!(queues.resolve("missing").label(), DEFAULT_QUEUE);
    queues.stop_all().await;
}
