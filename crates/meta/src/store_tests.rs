// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn store() -> MetaStore {
    MetaStore::open_in_memory(3, 2).unwrap()
}

#[test]
fn open_creates_tables_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meta.db");
    drop(MetaStore::open(&path, 3, 2).unwrap());

    // Reopening must find the schema in place.
    let mut reopened = MetaStore::open(&path, 3, 2).unwrap();
    assert!(!reopened
        .check_and_record_duplicate("a.txt", "sig", false)
        .unwrap());
}

#[test]
fn duplicate_first_contact_is_not_a_duplicate() {
    let mut store = store();
    assert!(!store
        .check_and_record_duplicate("a.txt", "sigA", false)
        .unwrap());
    assert!(store
        .check_and_record_duplicate("a.txt", "sigA", false)
        .unwrap());
}

#[test]
fn duplicate_keys_on_name_and_signature() {
    let mut store = store();
    store
        .check_and_record_duplicate("a.txt", "sigA", false)
        .unwrap();

    // Different signature or different label is a distinct row.
    assert!(!store
        .check_and_record_duplicate("a.txt", "sigB", false)
        .unwrap());
    assert!(!store
        .check_and_record_duplicate("b.txt", "sigA", false)
        .unwrap());
}

#[test]
fn duplicate_checkin_refreshes_last_contact() {
    let mut store = store();
    store
        .check_and_record_duplicate("a.txt", "sigA", false)
        .unwrap();

    // Age the row, then check in again: last_contact must come back up.
    store
        .db
        .execute(
            "UPDATE DuplicateCheck SET last_contact_time = 100",
            params![],
        )
        .unwrap();
    assert!(store
        .check_and_record_duplicate("a.txt", "sigA", false)
        .unwrap());

    let last: i64 = store
        .db
        .query_row(
            "SELECT last_contact_time FROM DuplicateCheck",
            params![],
            |row| row.get(0),
        )
        .unwrap();
    assert!(last > 100);
}

#[test]
fn presence_settle_protocol_full_lifecycle() {
    let mut store = store();
    let mut t = 1_000;
    let mut check = |s: &mut MetaStore, size: u64, mtime: i64| {
        t += 10;
        s.check_and_record_presence("sub", "f.dat", size, mtime, t)
            .unwrap()
    };

    // First sighting, then the file holds still and settles.
    assert_eq!(check(&mut store, 10, 500), PresenceReport::Fresh);
    assert_eq!(check(&mut store, 10, 500), PresenceReport::New);
    assert_eq!(check(&mut store, 10, 500), PresenceReport::Stable);

    // The file starts changing, keeps changing, then settles again.
    assert_eq!(check(&mut store, 20, 600), PresenceReport::Modifying);
    assert_eq!(check(&mut store, 30, 700), PresenceReport::Modifying);
    assert_eq!(check(&mut store, 30, 700), PresenceReport::Modified);
    assert_eq!(check(&mut store, 30, 700), PresenceReport::Stable);
}

#[parameterized(
    fresh_still_changing = { STATUS_FRESH, false, PresenceReport::Fresh },
    fresh_settled = { STATUS_FRESH, true, PresenceReport::New },
    existed_settled = { STATUS_EXISTED, true, PresenceReport::Stable },
    existed_changed = { STATUS_EXISTED, false, PresenceReport::Modifying },
    modifying_settled = { STATUS_MODIFYING, true, PresenceReport::Modified },
    modifying_changed = { STATUS_MODIFYING, false, PresenceReport::Modifying },
)]
fn presence_transition_table(prior: i64, matches: bool, expected: PresenceReport) {
    let mut store = store();
    store
        .db
        .execute(
            "INSERT INTO PresenceCheck VALUES ('', 'f', 10, 500, ?1, 100, 100)",
            params![prior],
        )
        .unwrap();

    let (size, mtime) = if matches { (10, 500) } else { (11, 501) };
    let report = store
        .check_and_record_presence("", "f", size, mtime, 200)
        .unwrap();
    assert_eq!(report, expected);
}

#[test]
fn presence_checkin_writes_observed_state() {
    let mut store = store();
    store
        .check_and_record_presence("", "f", 10, 500, 1_000)
        .unwrap();
    store
        .check_and_record_presence("", "f", 42, 999, 2_000)
        .unwrap();

    let (size, mtime, last): (i64, i64, i64) = store
        .db
        .query_row(
            "SELECT file_size, file_mtime, last_contact_time FROM PresenceCheck",
            params![],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!((size, mtime, last), (42, 999, 2_000));
}

#[test]
fn collect_deletions_returns_and_removes_stale_rows() {
    let mut store = store();
    store
        .check_and_record_presence("old", "gone.txt", 1, 1, 100)
        .unwrap();
    store
        .check_and_record_presence("", "also-gone.txt", 1, 1, 150)
        .unwrap();
    store
        .check_and_record_presence("", "alive.txt", 1, 1, 500)
        .unwrap();

    let mut gone = store.collect_deletions_and_purge(200).unwrap();
    gone.sort();
    assert_eq!(
        gone,
        vec![
            ("".to_string(), "also-gone.txt".to_string()),
            ("old".to_string(), "gone.txt".to_string()),
        ]
    );

    // Stale rows are really gone; the live one remains.
    let remaining: i64 = store
        .db
        .query_row("SELECT COUNT(*) FROM PresenceCheck", params![], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(remaining, 1);
    assert!(store.collect_deletions_and_purge(200).unwrap().is_empty());
}

#[test]
fn maintenance_prunes_expired_rows_but_keeps_lifetime_retained() {
    let mut store = store();
    store
        .db
        .execute_batch(
            "INSERT INTO DuplicateCheck VALUES ('old', 'sig', 100, 100, 0);
             INSERT INTO DuplicateCheck VALUES ('kept', 'sig', 100, 100, 1);
             INSERT INTO PresenceCheck VALUES ('', 'old', 1, 1, 0, 100, 100);",
        )
        .unwrap();

    // Past the two-hour gate, with the inserted rows far older than the
    // retention windows.
    let now = epoch_now() + MAINTAIN_GAP_SECS + 1;
    store.maintain(now).unwrap();

    let dup_names: Vec<String> = {
        let mut stmt = store
            .db
            .prepare("SELECT file_name FROM DuplicateCheck")
            .unwrap();
        let rows = stmt.query_map(params![], |row| row.get(0)).unwrap();
        rows.collect::<Result<Vec<_>, _>>().unwrap()
    };
    assert_eq!(dup_names, vec!["kept".to_string()]);

    let presence: i64 = store
        .db
        .query_row("SELECT COUNT(*) FROM PresenceCheck", params![], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(presence, 0);
}

#[test]
fn maintenance_is_gated_between_sweeps() {
    let mut store = store();
    store
        .db
        .execute(
            "INSERT INTO DuplicateCheck VALUES ('old', 'sig', 100, 100, 0)",
            params![],
        )
        .unwrap();

    // Within the gate window nothing is swept.
    store.maintain(epoch_now() + 10).unwrap();
    let count: i64 = store
        .db
        .query_row("SELECT COUNT(*) FROM DuplicateCheck", params![], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(count, 1);
}
