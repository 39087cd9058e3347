// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kernel filesystem-notification monitor.
//!
//! Watches every non-excluded directory of the target tree individually and
//! translates kernel notifications into engine events: close-after-write
//! and moved-in become MODIFIED, removals become DELETED. Newly created or
//! moved-in directories are watched as they appear; a periodic reviser
//! drops watches on directories the ignorance checker has since started
//! rejecting. Files slipping through between a directory's creation and its
//! watch registration are the periodical scan's to catch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde_yaml::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use ward_config::{IgnoranceFn, IgnoranceRegistry};
use ward_core::{ChangeEvent, FileEventKind, MonitorProps};
use ward_meta::SharedMeta;

use crate::error::EngineError;
use crate::module::{relative_to, resolve_ignorance, Monitor, MonitorStartup};

const MIN_REVISE_INTERVAL: u64 = 200;

/// Invoked when the kernel reports notification-queue overflow.
pub type OverflowCallback = Arc<dyn Fn() + Send + Sync>;

type WatcherSlot = Arc<Mutex<Option<RecommendedWatcher>>>;

pub struct FsNotify {
    watcher: WatcherSlot,
    ignorance: Mutex<Option<IgnoranceFn>>,
    revise_interval: Mutex<Option<u64>>,
    overflow_callback: Mutex<Option<OverflowCallback>>,
}

impl FsNotify {
    pub fn new() -> Self {
        Self {
            watcher: Arc::new(Mutex::new(None)),
            ignorance: Mutex::new(None),
            revise_interval: Mutex::new(None),
            overflow_callback: Mutex::new(None),
        }
    }

    /// Install a callback for kernel queue-overflow notifications.
    pub fn set_queue_overflow_callback(&self, callback: OverflowCallback) {
        *self.overflow_callback.lock() = Some(callback);
    }
}

impl Default for FsNotify {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Monitor for FsNotify {
    fn props(&self) -> MonitorProps {
        MonitorProps { name: "fs-notify" }
    }

    fn configure(
        &self,
        section: &Value,
        _meta: Option<&SharedMeta>,
        ignorance: &IgnoranceRegistry,
    ) {
        *self.ignorance.lock() = resolve_ignorance(section, ignorance);

        if let Some(interval) = section.get("revise-interval").and_then(Value::as_i64) {
            *self.revise_interval.lock() = Some((interval.max(0) as u64).max(MIN_REVISE_INTERVAL));
        }
    }

    async fn start(&self, startup: MonitorStartup) -> Result<(), EngineError> {
        let filter = WatchFilter {
            target: startup.target_directory.clone(),
            recursive: startup.recursive,
            ignorance: self.ignorance.lock().clone(),
        };
        let overflow = self.overflow_callback.lock().clone();
        let events = startup.events.clone();
        let (dir_tx, mut dir_rx) = mpsc::unbounded_channel::<PathBuf>();

        let handler_filter = filter.clone();
        let mut watcher = notify::recommended_watcher(
            move |result: Result<notify::Event, notify::Error>| match result {
                Ok(event) => route_event(&event, &handler_filter, &events, &dir_tx, overflow.as_ref()),
                Err(error) => warn!(%error, "filesystem watch error"),
            },
        )?;

        // Register the root, then (recursive only) every surviving subtree
        // directory. Per-directory registration is what lets the reviser
        // drop single directories later.
        watcher.watch(&startup.target_directory, RecursiveMode::NonRecursive)?;
        if startup.recursive {
            for dir in subtree_dirs(&startup.target_directory, filter.ignorance.as_ref()) {
                if let Err(error) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
                    warn!(dir = %dir.display(), %error, "could not watch directory");
                }
            }
        }
        *self.watcher.lock() = Some(watcher);

        // Directories appearing later are registered off the notify thread.
        let watcher_slot = Arc::clone(&self.watcher);
        tokio::spawn(async move {
            while let Some(dir) = dir_rx.recv().await {
                let mut slot = watcher_slot.lock();
                let Some(watcher) = slot.as_mut() else { break };
                match watcher.watch(&dir, RecursiveMode::NonRecursive) {
                    Ok(()) => debug!(dir = %dir.display(), "watching new directory"),
                    Err(error) => warn!(dir = %dir.display(), %error, "could not watch new directory"),
                }
            }
        });

        if let (Some(interval), Some(ignorance)) =
            (*self.revise_interval.lock(), filter.ignorance.clone())
        {
            let watcher_slot = Arc::clone(&self.watcher);
            let target = startup.target_directory.clone();
            startup.periodicals.register(
                "fs-notify-reviser",
                Duration::from_secs(interval),
                Box::new(move || revise_watches(&watcher_slot, &target, &ignorance)),
            );
        }

        info!(
            target = %startup.target_directory.display(),
            recursive = startup.recursive,
            "filesystem notification watch established"
        );
        Ok(())
    }

    async fn stop(&self) {
        // Dropping the watcher ends the notify thread; the directory-add
        // task exits when its channel closes with it.
        *self.watcher.lock() = None;
        debug!("filesystem notification watch dropped");
    }
}

/// Exclusion rules applied to every observed path.
#[derive(Clone)]
struct WatchFilter {
    target: PathBuf,
    recursive: bool,
    ignorance: Option<IgnoranceFn>,
}

impl WatchFilter {
    /// Whether a file event in `folder` for `name` should be dropped.
    fn excludes_file(&self, folder: &Path, name: &str) -> bool {
        if !self.recursive && folder != self.target {
            return true;
        }
        match &self.ignorance {
            Some(checker) => {
                let rel = relative_to(folder, &self.target);
                checker(Some(&rel), Some(name))
            }
            None => false,
        }
    }

    /// Whether a directory should not be watched.
    fn excludes_dir(&self, dir: &Path) -> bool {
        if !self.recursive {
            return dir != self.target;
        }
        match &self.ignorance {
            Some(checker) => {
                let rel = relative_to(dir, &self.target);
                checker(Some(&rel), None)
            }
            None => false,
        }
    }
}

/// The event shapes this monitor acts on.
#[derive(Debug, PartialEq, Eq)]
enum Classified {
    /// A file finished being written.
    CloseWrite,
    /// Something was moved into the tree.
    MovedIn,
    /// Something was created in place.
    Created,
    /// Something was removed.
    Removed,
    Other,
}

fn classify(kind: &EventKind) -> Classified {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => Classified::CloseWrite,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Classified::MovedIn,
        EventKind::Create(_) => Classified::Created,
        EventKind::Remove(_) => Classified::Removed,
        _ => Classified::Other,
    }
}

/// Translate one kernel notification. Runs on the notify thread: nothing
/// here blocks or takes engine locks.
fn route_event(
    event: &notify::Event,
    filter: &WatchFilter,
    events: &mpsc::UnboundedSender<ChangeEvent>,
    dirs: &mpsc::UnboundedSender<PathBuf>,
    overflow: Option<&OverflowCallback>,
) {
    if event.need_rescan() {
        warn!("kernel notification queue overflowed");
        if let Some(callback) = overflow {
            callback();
        }
        return;
    }

    let classified = classify(&event.kind);
    for path in &event.paths {
        match classified {
            Classified::CloseWrite => emit_file(path, FileEventKind::Modified, filter, events),
            Classified::MovedIn => {
                if path.is_dir() {
                    register_dir(path, filter, dirs);
                } else {
                    emit_file(path, FileEventKind::Modified, filter, events);
                }
            }
            Classified::Created => {
                // Created files are reported once their writer closes them;
                // created directories need a watch right away.
                if path.is_dir() {
                    register_dir(path, filter, dirs);
                }
            }
            Classified::Removed => emit_file(path, FileEventKind::Deleted, filter, events),
            Classified::Other => {}
        }
    }
}

fn emit_file(
    path: &Path,
    kind: FileEventKind,
    filter: &WatchFilter,
    events: &mpsc::UnboundedSender<ChangeEvent>,
) {
    let (Some(folder), Some(name)) = (path.parent(), path.file_name()) else {
        return;
    };
    let name = name.to_string_lossy().into_owned();
    if filter.excludes_file(folder, &name) {
        return;
    }
    let relfolder = relative_to(folder, &filter.target);
    debug!(file = %path.display(), ?kind, "kernel notification");
    let _ = events.send(ChangeEvent::new(name, relfolder, kind));
}

fn register_dir(path: &Path, filter: &WatchFilter, dirs: &mpsc::UnboundedSender<PathBuf>) {
    if !filter.recursive || filter.excludes_dir(path) {
        return;
    }
    let _ = dirs.send(path.to_path_buf());
}

/// All directories below `target` surviving the ignorance checker.
fn subtree_dirs(target: &Path, ignorance: Option<&IgnoranceFn>) -> Vec<PathBuf> {
    let target_owned = target.to_path_buf();
    let ignorance = ignorance.cloned();
    WalkDir::new(target)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(move |entry| {
            if !entry.file_type().is_dir() {
                return false;
            }
            match &ignorance {
                Some(checker) => {
                    let rel = relative_to(entry.path(), &target_owned);
                    !checker(Some(&rel), None)
                }
                None => true,
            }
        })
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .collect()
}

/// Drop watches on directories the ignorance checker now rejects.
fn revise_watches(slot: &WatcherSlot, target: &Path, ignorance: &IgnoranceFn) {
    let mut guard = slot.lock();
    let Some(watcher) = guard.as_mut() else { return };

    for entry in WalkDir::new(target)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
    {
        let rel = relative_to(entry.path(), target);
        if ignorance(Some(&rel), None) {
            match watcher.unwatch(entry.path()) {
                Ok(()) => info!(dir = %entry.path().display(), "watch revised away"),
                // Not watched (already revised or never registered).
                Err(_) => debug!(dir = %entry.path().display(), "no watch to revise"),
            }
        }
    }
}

#[cfg(test)]
#[path = "fs_notify_tests.rs"]
mod tests;
