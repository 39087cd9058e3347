// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The watcher engine: event sink for all monitors.
//!
//! `on_change` runs entirely on the driver task, so event handling is
//! serialized: match the first claiming watch entry, arbitrate a unique
//! name, consult the duplicate table, then execute the entry's pipeline
//! block by block. A failure while handling one file never prevents the
//! next; nothing is retried.

use std::path::{Path, PathBuf};

use regex::Regex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ward_config::{GlobalConfig, IgnoranceFn, IgnoranceRegistry, LoadedConfig};
use ward_core::{ChangeEvent, FileEventKind};
use ward_meta::{compute_signature, SharedMeta};

use crate::driver::PeriodicalRegistry;
use crate::error::EngineError;
use crate::module::{epoch_now, BlockLog, EnginePulse, ExecRef, MonitorStartup};
use crate::planner::{build_pipeline, OperationBlock, PipelineFlavor};
use crate::registry::ModuleRegistry;

/// Serial numbers for unique-name arbitration wrap here.
const SERIAL_MODULUS: u32 = 1024;

/// One compiled watch rule. Entries are tried in declaration order; the
/// first match claims the event.
pub struct WatchEntry {
    file_regex: Regex,
    path_regex: Option<Regex>,
    do_dupcheck: bool,
    content_check_label: Option<String>,
    process_as_uniqname: bool,
    ignorance_checker: Option<IgnoranceFn>,
    operation_update: Vec<OperationBlock>,
    operation_remove: Vec<OperationBlock>,
}

pub struct WatcherEngine {
    global: GlobalConfig,
    entries: Vec<WatchEntry>,
    registry: ModuleRegistry,
    meta: Option<SharedMeta>,
    pulse: EnginePulse,
    serial_counter: u32,
}

impl WatcherEngine {
    /// Configure all modules, compile the watch entries, and plan their
    /// pipelines. Regex and checker problems are startup-fatal.
    pub fn build(
        config: LoadedConfig,
        registry: ModuleRegistry,
        ignorance: &IgnoranceRegistry,
        meta: Option<SharedMeta>,
    ) -> Result<Self, EngineError> {
        registry.configure_all(&config.module_sections, meta.as_ref(), ignorance);

        let mut entries = Vec::with_capacity(config.entries.len());
        for raw in &config.entries {
            let file_regex = compile_match_regex(&raw.file_regex)?;
            let path_regex = raw
                .path_regex
                .as_deref()
                .map(compile_match_regex)
                .transpose()?;
            let ignorance_checker = match &raw.ignorance_checker {
                Some(name) => Some(ignorance.lookup(name).ok_or_else(|| {
                    EngineError::UnknownIgnoranceChecker(name.clone())
                })?),
                None => None,
            };

            entries.push(WatchEntry {
                file_regex,
                path_regex,
                do_dupcheck: raw.duplicate_check,
                content_check_label: raw.content_check_label.clone(),
                process_as_uniqname: raw.process_as_uniqname,
                ignorance_checker,
                operation_update: build_pipeline(
                    &registry,
                    &raw.update_operation,
                    PipelineFlavor::Update,
                ),
                operation_remove: build_pipeline(
                    &registry,
                    &raw.remove_operation,
                    PipelineFlavor::Dismiss,
                ),
            });
        }

        Ok(Self {
            global: config.global,
            entries,
            registry,
            meta,
            pulse: EnginePulse::new(),
            serial_counter: 1,
        })
    }

    pub fn pulse(&self) -> EnginePulse {
        self.pulse.clone()
    }

    /// Start every monitor against the watch root.
    pub async fn activate(
        &self,
        events: mpsc::UnboundedSender<ChangeEvent>,
        periodicals: PeriodicalRegistry,
    ) -> Result<(), EngineError> {
        for monitor in self.registry.monitors() {
            let name = monitor.props().name;
            monitor
                .start(MonitorStartup {
                    events: events.clone(),
                    target_directory: self.global.target_directory.clone(),
                    recursive: self.global.recursive_watch,
                    periodicals: periodicals.clone(),
                    pulse: self.pulse.clone(),
                })
                .await?;
            info!(monitor = name, "monitor started");
        }
        Ok(())
    }

    /// Stop monitors first (no new events), then operators (drain queues).
    pub async fn deactivate(&self) {
        for monitor in self.registry.monitors() {
            monitor.stop().await;
            info!(monitor = monitor.props().name, "monitor stopped");
        }
        for operator in self.registry.operators() {
            operator.stop().await;
            info!(operator = operator.props().name, "operator stopped");
        }
    }

    /// Single entry point for all monitors.
    pub async fn on_change(&mut self, event: ChangeEvent) {
        self.pulse.touch(epoch_now());

        let ChangeEvent {
            name,
            relfolder,
            kind,
        } = event;

        if !self.global.recursive_watch && !relfolder.is_empty() {
            return;
        }

        let folder = if relfolder.is_empty() {
            self.global.target_directory.clone()
        } else {
            self.global.target_directory.join(&relfolder)
        };
        let orig_path = folder.join(&name);
        if kind != FileEventKind::Deleted && !orig_path.is_file() {
            debug!(file = %orig_path.display(), "file vanished before processing");
            return;
        }

        for index in 0..self.entries.len() {
            if !self.entries[index].file_regex.is_match(&name) {
                continue;
            }
            if let Some(path_regex) = &self.entries[index].path_regex {
                if !path_regex.is_match(&relfolder) {
                    continue;
                }
            }
            if let Some(checker) = &self.entries[index].ignorance_checker {
                if checker(Some(&relfolder), Some(&name)) {
                    info!(file = %orig_path.display(), "Ignored");
                    return;
                }
            }

            self.serial_counter = (self.serial_counter + 1) % SERIAL_MODULUS;
            let serial = self.serial_counter;
            let entry = &self.entries[index];

            let mut target_path = orig_path.clone();
            let mut signature = None;
            let mut cancel_reason = None;

            if kind != FileEventKind::Deleted {
                if entry.process_as_uniqname {
                    // A per-event unique name gives downstream operators a
                    // path free of further notify churn.
                    let unique = folder.join(format!("{}-Wr{:04}", name, serial));
                    match std::fs::rename(&orig_path, &unique) {
                        Ok(()) => target_path = unique,
                        Err(error) => warn!(
                            file = %orig_path.display(),
                            %error,
                            "unique-name rename failed, continuing with original path"
                        ),
                    }
                }

                if entry.do_dupcheck {
                    if let Some(meta) = &self.meta {
                        let (label, lifetime_retain) = match &entry.content_check_label {
                            Some(label) => (label.as_str(), true),
                            None => (name.as_str(), false),
                        };
                        let sig = match compute_signature(&target_path) {
                            Ok(sig) => sig,
                            Err(error) => {
                                warn!(
                                    file = %target_path.display(),
                                    %error,
                                    "signature computation failed, event dropped"
                                );
                                return;
                            }
                        };
                        match meta
                            .lock()
                            .check_and_record_duplicate(label, &sig, lifetime_retain)
                        {
                            Ok(true) => {
                                cancel_reason = Some("duplicate file (signature check-in)")
                            }
                            Ok(false) => {}
                            Err(error) => {
                                warn!(
                                    file = %target_path.display(),
                                    %error,
                                    "metadata failure, event dropped"
                                );
                                return;
                            }
                        }
                        signature = Some(sig);
                    }
                }
            }

            if let Some(reason) = cancel_reason {
                if self.global.remove_unoperate_file {
                    if let Err(error) = std::fs::remove_file(&target_path) {
                        warn!(
                            file = %target_path.display(),
                            %error,
                            "could not remove cancelled file"
                        );
                    }
                }
                info!(file = %orig_path.display(), reason, "Cancel");
                return;
            }

            let pathname_match = entry.path_regex.is_some().then(|| relfolder.clone());
            let mut exec_ref = ExecRef::new(name.clone(), pathname_match, signature, kind);

            let blocks = match kind {
                FileEventKind::New | FileEventKind::Modified => &entry.operation_update,
                FileEventKind::Deleted => &entry.operation_remove,
            };
            run_pipeline(blocks, &target_path, &name, &mut exec_ref).await;
            return; // first match wins
        }

        info!(file = %orig_path.display(), "NoWatchEntryFound");
    }
}

/// Execute the planned blocks. Each block starts from the arbitrated target
/// path and threads the evolving path through its operations; an aborted
/// block never stops the blocks after it.
async fn run_pipeline(
    blocks: &[OperationBlock],
    target_path: &Path,
    original_name: &str,
    exec_ref: &mut ExecRef,
) {
    for (block_index, block) in blocks.iter().enumerate() {
        let mut log = BlockLog::new();
        let mut current = target_path.to_path_buf();
        let mut aborted = false;

        for op in &block.ops {
            if !exec_ref.is_dismiss_event && !current.is_file() {
                log.append(format!(
                    "{} skipped: {} no longer exists",
                    op.operation_name,
                    current.display()
                ));
                aborted = true;
                break;
            }
            match op
                .operator
                .perform(&current, original_name, &op.argv, exec_ref, &mut log)
                .await
            {
                Some(next) => current = next,
                None => {
                    aborted = true;
                    break;
                }
            }
        }

        if aborted {
            warn!(
                file = %target_path.display(),
                block = block_index,
                steps = ?log.lines(),
                "operation block aborted"
            );
        } else {
            info!(
                file = %target_path.display(),
                block = block_index,
                steps = ?log.lines(),
                "operation block finished"
            );
        }
    }
}

/// Compile a config regex with the match anchored at the start of the
/// subject, the way watch rules are written.
fn compile_match_regex(pattern: &str) -> Result<Regex, EngineError> {
    Regex::new(&format!("^(?:{})", pattern)).map_err(|source| EngineError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
