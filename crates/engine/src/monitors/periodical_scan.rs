// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodical-scan monitor.
//!
//! Walks the watched tree on the driver's periodical schedule and reports
//! files the kernel monitor may have missed, plus deletions detected
//! through the metadata presence table. The scan itself is cheap to skip:
//! a round only runs when enough time has passed since the last one AND
//! either the cron-aligned wall-clock boundary has advanced (cron mode) or
//! no filesystem event has been seen for a full interval (quiescence mode).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Timelike;
use parking_lot::Mutex;
use serde_yaml::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use ward_config::{truthy, IgnoranceFn, IgnoranceRegistry};
use ward_core::{ChangeEvent, FileEventKind, MonitorProps, TimeInterval};
use ward_meta::{PresenceReport, SharedMeta};

use crate::error::EngineError;
use crate::module::{
    epoch_now, relative_to, resolve_ignorance, EnginePulse, Monitor, MonitorStartup,
};

const DEFAULT_SCAN_INTERVAL: u64 = 1200;
const MIN_SCAN_INTERVAL: u64 = 120;

#[derive(Clone)]
struct ScanSettings {
    scan_interval: u64,
    cron_aligned: bool,
    blackouts: Vec<TimeInterval>,
    ignorance: Option<IgnoranceFn>,
    use_meta: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
            cron_aligned: false,
            blackouts: Vec::new(),
            ignorance: None,
            use_meta: false,
        }
    }
}

pub struct PeriodicalScan {
    settings: Mutex<ScanSettings>,
    meta: Mutex<Option<SharedMeta>>,
}

impl PeriodicalScan {
    pub fn new() -> Self {
        Self {
            settings: Mutex::new(ScanSettings::default()),
            meta: Mutex::new(None),
        }
    }
}

impl Default for PeriodicalScan {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Monitor for PeriodicalScan {
    fn props(&self) -> MonitorProps {
        MonitorProps {
            name: "periodical-scan",
        }
    }

    fn configure(
        &self,
        section: &Value,
        meta: Option<&SharedMeta>,
        ignorance: &IgnoranceRegistry,
    ) {
        let mut settings = self.settings.lock();

        if let Some(interval) = section.get("scan_interval").and_then(Value::as_i64) {
            // Negative interval selects cron-aligned mode.
            settings.cron_aligned = interval < 0;
            settings.scan_interval = interval.unsigned_abs().max(MIN_SCAN_INTERVAL);
        }

        settings.use_meta = section.get("use_meta").map(truthy).unwrap_or(false);
        if settings.use_meta {
            *self.meta.lock() = meta.cloned();
        }

        if let Some(windows) = section.get("blackout_time").and_then(Value::as_sequence) {
            for window in windows {
                match parse_blackout(window) {
                    Some(interval) => settings.blackouts.push(interval),
                    None => warn!(?window, "unusable blackout window ignored"),
                }
            }
        }

        settings.ignorance = resolve_ignorance(section, ignorance);
    }

    async fn start(&self, startup: MonitorStartup) -> Result<(), EngineError> {
        let settings = self.settings.lock().clone();
        let min_interval = Duration::from_secs((settings.scan_interval / 4).max(1));
        info!(
            interval = settings.scan_interval,
            cron_aligned = settings.cron_aligned,
            "periodical scan scheduled"
        );

        let mut worker = ScanWorker {
            events: startup.events,
            target: startup.target_directory,
            recursive: startup.recursive,
            meta: self.meta.lock().clone(),
            settings,
            pulse: startup.pulse,
            last_scan: 0,
        };
        startup.periodicals.register(
            "periodical-scan",
            min_interval,
            Box::new(move || worker.tick()),
        );
        Ok(())
    }

    async fn stop(&self) {
        debug!("periodical scan stopped");
    }
}

/// Accept both `{from: "HH:MM", to: "HH:MM"}` and `["HH:MM", "HH:MM"]`.
fn parse_blackout(window: &Value) -> Option<TimeInterval> {
    let (from, to) = match window {
        Value::Mapping(_) => (
            window.get("from")?.as_str()?,
            window.get("to")?.as_str()?,
        ),
        Value::Sequence(pair) => (pair.first()?.as_str()?, pair.get(1)?.as_str()?),
        _ => return None,
    };
    TimeInterval::parse(from, to).ok()
}

struct ScanWorker {
    events: mpsc::UnboundedSender<ChangeEvent>,
    target: PathBuf,
    recursive: bool,
    meta: Option<SharedMeta>,
    settings: ScanSettings,
    pulse: EnginePulse,
    last_scan: i64,
}

impl ScanWorker {
    fn tick(&mut self) {
        let now = epoch_now();
        if !self.should_scan(now, local_day_seconds()) {
            return;
        }

        // New-round signal: checkers with per-round state reset here.
        if let Some(ignorance) = &self.settings.ignorance {
            ignorance(None, None);
        }

        debug!(target = %self.target.display(), "periodical scan starting");
        self.walk(now);
        self.last_scan = epoch_now();
    }

    /// Whether a scan round is due at `now`.
    fn should_scan(&self, now: i64, local_day_secs: u64) -> bool {
        let interval = self.settings.scan_interval as i64;
        // A fraction of the interval must pass between rounds regardless of
        // mode, so event storms cannot cause over-scanning.
        if now - self.last_scan <= interval / 4 {
            return false;
        }

        let due = if self.settings.cron_aligned {
            now - (now % interval) > self.last_scan
        } else {
            now - self.pulse.last() > interval
        };
        if !due {
            return false;
        }

        !self
            .settings
            .blackouts
            .iter()
            .any(|window| window.contains(local_day_secs))
    }

    fn walk(&self, now: i64) {
        let mut walker = WalkDir::new(&self.target).follow_links(false);
        if !self.recursive {
            walker = walker.max_depth(1);
        }

        let ignorance = self.settings.ignorance.clone();
        let target = self.target.clone();
        let entries = walker.into_iter().filter_entry(move |entry| {
            if !entry.file_type().is_dir() || entry.path() == target {
                return true;
            }
            match &ignorance {
                Some(checker) => {
                    let rel = relative_to(entry.path(), &target);
                    !checker(Some(&rel), None)
                }
                None => true,
            }
        });

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    debug!(%error, "scan entry skipped");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            self.check_file(entry.path(), now);
        }

        self.report_deletions(now);
    }

    fn check_file(&self, path: &Path, now: i64) {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return;
        };
        let relfolder = path
            .parent()
            .map(|parent| relative_to(parent, &self.target))
            .unwrap_or_default();
        let Ok(meta) = std::fs::metadata(path) else {
            // Vanished mid-scan; the deletion sweep will pick it up.
            return;
        };
        let size = meta.len();
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let emit = match &self.meta {
            Some(store) => {
                match store
                    .lock()
                    .check_and_record_presence(&relfolder, &name, size, mtime, now)
                {
                    Ok(PresenceReport::New | PresenceReport::Modified) => true,
                    Ok(_) => false,
                    Err(error) => {
                        warn!(file = %path.display(), %error, "presence check-in failed, file dropped");
                        false
                    }
                }
            }
            // Without a metadata store, fall back to modification time.
            None => mtime > self.last_scan,
        };

        if emit {
            let _ = self
                .events
                .send(ChangeEvent::new(name, relfolder, FileEventKind::Modified));
        }
    }

    fn report_deletions(&self, now: i64) {
        let Some(store) = &self.meta else { return };
        match store.lock().collect_deletions_and_purge(now - 1) {
            Ok(gone) => {
                for (relfolder, name) in gone {
                    info!(folder = %relfolder, file = %name, "file disappeared from watched tree");
                    let _ = self
                        .events
                        .send(ChangeEvent::new(name, relfolder, FileEventKind::Deleted));
                }
            }
            Err(error) => warn!(%error, "deletion sweep failed"),
        }
    }
}

fn local_day_seconds() -> u64 {
    u64::from(chrono::Local::now().time().num_seconds_from_midnight())
}

#[cfg(test)]
#[path = "periodical_scan_tests.rs"]
mod tests;
