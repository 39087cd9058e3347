// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed metadata store.
//!
//! Two tables:
//! - `DuplicateCheck` keys `(file_name, file_sig)` and answers "have we seen
//!   this content under this label before".
//! - `PresenceCheck` keys `(file_relfolder, file_name)` and tracks the
//!   settle state of files found by the periodical scan.
//!
//! Rows age out on a maintenance sweep that runs at most every two hours,
//! piggy-backed on the check-in calls. `last_contact_time` for a live
//! presence row is monotonic non-decreasing across check-ins.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

/// Shared handle to the store. Only the engine and the periodical-scan
/// monitor hold one, and both run on the main loop, so the lock is never
/// contended.
pub type SharedMeta = Arc<Mutex<MetaStore>>;

/// Minimum gap between maintenance sweeps, in seconds.
const MAINTAIN_GAP_SECS: i64 = 7200;

const SECS_PER_DAY: i64 = 86_400;

// report_status column values.
const STATUS_FRESH: i64 = 0;
const STATUS_EXISTED: i64 = 1;
const STATUS_MODIFYING: i64 = 2;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("metadata database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Outcome of a presence check-in.
///
/// The settle protocol: a file is first seen as `Fresh`; once its size and
/// mtime hold still across two scans it is reported `New` exactly once,
/// then `Stable`. A stable file whose size or mtime moves goes through
/// `Modifying` until it holds still again, at which point `Modified` is
/// reported exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceReport {
    Fresh,
    New,
    Stable,
    Modifying,
    Modified,
}

pub struct MetaStore {
    db: Connection,
    dupcheck_retain_secs: i64,
    presence_retain_secs: i64,
    last_maintained: i64,
}

impl MetaStore {
    /// Open (creating if necessary) the store at `path`.
    ///
    /// Retention is given in days; values below one day are clamped by the
    /// config layer before they reach here.
    pub fn open(
        path: &Path,
        dupcheck_retain_days: u32,
        presence_retain_days: u32,
    ) -> Result<Self, MetaError> {
        Self::from_connection(
            Connection::open(path)?,
            dupcheck_retain_days,
            presence_retain_days,
        )
    }

    /// In-memory store, used by tests and usable for metadata that need not
    /// survive a restart.
    pub fn open_in_memory(
        dupcheck_retain_days: u32,
        presence_retain_days: u32,
    ) -> Result<Self, MetaError> {
        Self::from_connection(
            Connection::open_in_memory()?,
            dupcheck_retain_days,
            presence_retain_days,
        )
    }

    fn from_connection(
        db: Connection,
        dupcheck_retain_days: u32,
        presence_retain_days: u32,
    ) -> Result<Self, MetaError> {
        let mut store = Self {
            db,
            dupcheck_retain_secs: i64::from(dupcheck_retain_days) * SECS_PER_DAY,
            presence_retain_secs: i64::from(presence_retain_days) * SECS_PER_DAY,
            last_maintained: 0,
        };
        store.prepare()?;
        store.maintain(epoch_now())?;
        Ok(store)
    }

    fn prepare(&self) -> Result<(), MetaError> {
        self.db.execute_batch(
            "CREATE TABLE IF NOT EXISTS DuplicateCheck(
                 file_name TEXT NOT NULL,
                 file_sig TEXT NOT NULL,
                 first_contact_time INTEGER NOT NULL,
                 last_contact_time INTEGER NOT NULL,
                 lifetime_retain INTEGER NOT NULL,
                 PRIMARY KEY (file_name, file_sig)
             );
             CREATE INDEX IF NOT EXISTS idx_DuplicateCheck_retain
                 ON DuplicateCheck(last_contact_time, lifetime_retain);
             CREATE TABLE IF NOT EXISTS PresenceCheck(
                 file_relfolder TEXT NOT NULL,
                 file_name TEXT NOT NULL,
                 file_size INTEGER NOT NULL,
                 file_mtime INTEGER NOT NULL,
                 report_status INTEGER NOT NULL,
                 first_contact_time INTEGER NOT NULL,
                 last_contact_time INTEGER NOT NULL,
                 PRIMARY KEY (file_relfolder, file_name)
             );
             CREATE INDEX IF NOT EXISTS idx_PresenceCheck_last_contact
                 ON PresenceCheck(last_contact_time);",
        )?;
        Ok(())
    }

    /// Delete rows whose `last_contact_time` is older than `now - retain`.
    /// Gated so the sweep runs at most every [`MAINTAIN_GAP_SECS`].
    fn maintain(&mut self, now: i64) -> Result<(), MetaError> {
        if now - self.last_maintained < MAINTAIN_GAP_SECS {
            return Ok(());
        }
        self.last_maintained = now;

        let dup = self.db.execute(
            "DELETE FROM DuplicateCheck
             WHERE last_contact_time < ?1 AND lifetime_retain = 0",
            params![now - self.dupcheck_retain_secs],
        )?;
        let presence = self.db.execute(
            "DELETE FROM PresenceCheck WHERE last_contact_time < ?1",
            params![now - self.presence_retain_secs],
        )?;
        if dup > 0 || presence > 0 {
            debug!(dup, presence, "pruned expired metadata rows");
        }
        Ok(())
    }

    /// Record a `(label, signature)` sighting. Returns `true` when the pair
    /// was already known (a duplicate), refreshing its last-contact time;
    /// `false` when the pair is new and a row was inserted.
    pub fn check_and_record_duplicate(
        &mut self,
        name_or_label: &str,
        signature: &str,
        lifetime_retain: bool,
    ) -> Result<bool, MetaError> {
        let now = epoch_now();
        self.maintain(now)?;

        let existing: Option<i64> = self
            .db
            .query_row(
                "SELECT last_contact_time FROM DuplicateCheck
                 WHERE file_name = ?1 AND file_sig = ?2",
                params![name_or_label, signature],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(_) => {
                self.db.execute(
                    "UPDATE DuplicateCheck SET last_contact_time = ?1
                     WHERE file_name = ?2 AND file_sig = ?3",
                    params![now, name_or_label, signature],
                )?;
                Ok(true)
            }
            None => {
                self.db.execute(
                    "INSERT INTO DuplicateCheck(
                         file_name, file_sig,
                         first_contact_time, last_contact_time, lifetime_retain)
                     VALUES (?1, ?2, ?3, ?3, ?4)",
                    params![name_or_label, signature, now, i64::from(lifetime_retain)],
                )?;
                Ok(false)
            }
        }
    }

    /// Check a scanned file in against the presence table and report its
    /// settle transition. Always writes the observed `(size, mtime)` and
    /// `last_contact_time = now_ts` back to the row.
    pub fn check_and_record_presence(
        &mut self,
        relfolder: &str,
        name: &str,
        size: u64,
        mtime: i64,
        now_ts: i64,
    ) -> Result<PresenceReport, MetaError> {
        self.maintain(now_ts)?;
        let size = size as i64;

        let existing: Option<(i64, i64, i64)> = self
            .db
            .query_row(
                "SELECT file_size, file_mtime, report_status FROM PresenceCheck
                 WHERE file_relfolder = ?1 AND file_name = ?2",
                params![relfolder, name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((prior_size, prior_mtime, prior_status)) = existing else {
            self.db.execute(
                "INSERT INTO PresenceCheck(
                     file_relfolder, file_name, file_size, file_mtime,
                     report_status, first_contact_time, last_contact_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![relfolder, name, size, mtime, STATUS_FRESH, now_ts],
            )?;
            return Ok(PresenceReport::Fresh);
        };

        let settled = prior_size == size && prior_mtime == mtime;
        let (new_status, report) = if settled {
            match prior_status {
                STATUS_FRESH => (STATUS_EXISTED, PresenceReport::New),
                STATUS_MODIFYING => (STATUS_EXISTED, PresenceReport::Modified),
                _ => (STATUS_EXISTED, PresenceReport::Stable),
            }
        } else {
            match prior_status {
                STATUS_FRESH => (STATUS_FRESH, PresenceReport::Fresh),
                _ => (STATUS_MODIFYING, PresenceReport::Modifying),
            }
        };

        self.db.execute(
            "UPDATE PresenceCheck
             SET file_size = ?1, file_mtime = ?2, report_status = ?3,
                 last_contact_time = ?4
             WHERE file_relfolder = ?5 AND file_name = ?6",
            params![size, mtime, new_status, now_ts, relfolder, name],
        )?;
        Ok(report)
    }

    /// Return every `(relfolder, name)` not seen since `cutoff_ts`, deleting
    /// the rows as they are collected. The caller reports each returned pair
    /// as a deletion event.
    pub fn collect_deletions_and_purge(
        &mut self,
        cutoff_ts: i64,
    ) -> Result<Vec<(String, String)>, MetaError> {
        let gone = {
            let mut stmt = self.db.prepare(
                "SELECT file_relfolder, file_name FROM PresenceCheck
                 WHERE last_contact_time < ?1",
            )?;
            let rows = stmt.query_map(params![cutoff_ts], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        self.db.execute(
            "DELETE FROM PresenceCheck WHERE last_contact_time < ?1",
            params![cutoff_ts],
        )?;
        Ok(gone)
    }
}

fn epoch_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
