// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ward_core::FileEventKind;

fn exec_ref() -> ExecRef {
    ExecRef::new("a.txt".into(), None, None, FileEventKind::Modified)
}

#[test]
fn parse_argv_accepts_existing_directory_only() {
    let dir = tempfile::tempdir().unwrap();
    let copier = Copier::new();

    let parsed = copier
        .parse_argv(&Value::String(dir.path().display().to_string()))
        .unwrap();
    assert!(matches!(parsed, OpArgv::DestDir(p) if p == dir.path().canonicalize().unwrap()));

    assert!(copier
        .parse_argv(&Value::String("/nonexistent/ward-dest".into()))
        .is_none());
    assert!(copier.parse_argv(&Value::Number(5.into())).is_none());
}

#[tokio::test]
async fn perform_copies_under_original_name() {
    let src_dir = tempfile::tempdir().unwrap();
    let dest_dir = tempfile::tempdir().unwrap();
    // The source carries a uniquified name; the copy restores the original.
    let source = src_dir.path().join("a.txt-Wr0002");
    std::fs::write(&source, "hello").unwrap();

    let copier = Copier::new();
    let argv = OpArgv::DestDir(dest_dir.path().to_path_buf());
    let mut log = BlockLog::new();

    let result = copier
        .perform(&source, "a.txt", &argv, &mut exec_ref(), &mut log)
        .await
        .unwrap();

    assert_eq!(result, dest_dir.path().join("a.txt"));
    assert_eq!(std::fs::read_to_string(&result).unwrap(), "hello");
    assert!(source.exists(), "copy leaves the source in place");
    assert!(log.lines()[0].contains("success"));
}

#[tokio::test]
async fn perform_reports_failure_with_none() {
    let dest_dir = tempfile::tempdir().unwrap();
    let copier = Copier::new();
    let argv = OpArgv::DestDir(dest_dir.path().to_path_buf());
    let mut log = BlockLog::new();

    let result = copier
        .perform(
            Path::new("/nonexistent/source"),
            "a.txt",
            &argv,
            &mut exec_ref(),
            &mut log,
        )
        .await;

    assert!(result.is_none());
    assert!(log.lines()[0].contains("failed"));
}
