// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn parses_config_path_argument() {
    assert_eq!(
        parse_args(&args(&["/etc/ward.yaml"])),
        CliCommand::Run(PathBuf::from("/etc/ward.yaml"))
    );
}

#[test]
fn missing_argument_is_reported() {
    assert_eq!(parse_args(&[]), CliCommand::Missing);
}

#[test]
fn help_and_version_flags() {
    assert_eq!(parse_args(&args(&["--help"])), CliCommand::Help);
    assert_eq!(parse_args(&args(&["-h"])), CliCommand::Help);
    assert_eq!(parse_args(&args(&["--version"])), CliCommand::Version);
    assert_eq!(parse_args(&args(&["-v"])), CliCommand::Version);
}

#[test]
fn unknown_flags_are_rejected() {
    assert_eq!(
        parse_args(&args(&["--verbose"])),
        CliCommand::Unexpected("--verbose".to_string())
    );
}

#[test]
fn builtin_roster_orders_operations() {
    let registry = builtin_registry();
    assert_eq!(registry.schedule_seq(), ["copy_to", "move_to"]);
    assert_eq!(
        registry.run_update_seq(),
        ["copy_to", "move_to", "run_program"]
    );
    assert_eq!(registry.run_dismiss_seq(), ["run_program"]);
}

#[test]
fn open_meta_is_disabled_without_a_db_path() {
    let dir = tempfile::tempdir().unwrap();
    let global = ward_config::GlobalConfig {
        target_directory: dir.path().to_path_buf(),
        recursive_watch: false,
        remove_unoperate_file: false,
        meta_db_path: None,
        dupcheck_reserve_days: 3,
        missing_reserve_days: 2,
    };
    assert!(open_meta(&global).unwrap().is_none());

    let with_db = ward_config::GlobalConfig {
        meta_db_path: Some(dir.path().join("meta.db")),
        ..global
    };
    assert!(open_meta(&with_db).unwrap().is_some());
}
