// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability contracts for watcher modules.
//!
//! A module is either a monitor (an event source feeding the engine) or an
//! operator (a pipeline stage acting on a matched file). Both are configured
//! from their named config section at startup and stopped on shutdown.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_yaml::Value;
use tokio::sync::mpsc;

use ward_config::{IgnoranceFn, IgnoranceRegistry};
use ward_core::{ChangeEvent, FileEventKind, MonitorProps, OperatorProps};
use ward_meta::SharedMeta;

use crate::driver::PeriodicalRegistry;
use crate::error::EngineError;
use crate::runner::RunSpec;

/// Relative path of `path` under `base`, empty for `base` itself.
pub(crate) fn relative_to(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .map(|rel| rel.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Seconds since the Unix epoch.
pub(crate) fn epoch_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Timestamp of the most recent file event, shared between the engine
/// (which touches it on every `on_change`) and the periodical-scan monitor
/// (whose quiescence mode reads it).
#[derive(Clone)]
pub struct EnginePulse(Arc<AtomicI64>);

impl EnginePulse {
    pub fn new() -> Self {
        Self(Arc::new(AtomicI64::new(epoch_now())))
    }

    pub fn touch(&self, now: i64) {
        self.0.store(now, Ordering::Relaxed);
    }

    pub fn last(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for EnginePulse {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-block log buffer. Operators append one line per action; the engine
/// emits the collected lines as a single structured log record when the
/// block finishes.
#[derive(Debug, Default)]
pub struct BlockLog {
    lines: Vec<String>,
}

impl BlockLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Per-event record handed to every operator of a pipeline.
#[derive(Debug, Clone)]
pub struct ExecRef {
    /// The matched file name.
    pub filename_match: String,
    /// The matched relative folder, present when the entry has a path regex.
    pub pathname_match: Option<String>,
    /// Content signature, present when a duplicate check ran.
    pub signature: Option<String>,
    pub event: FileEventKind,
    pub is_dismiss_event: bool,
    /// Side channel between pipeline stages; exposed to command argv via
    /// `%NAME%` macros.
    pub carry_variable: HashMap<String, String>,
}

impl ExecRef {
    pub fn new(
        filename_match: String,
        pathname_match: Option<String>,
        signature: Option<String>,
        event: FileEventKind,
    ) -> Self {
        Self {
            filename_match,
            pathname_match,
            signature,
            is_dismiss_event: event.is_dismiss(),
            event,
            carry_variable: HashMap::new(),
        }
    }
}

/// Parsed operation argv. Produced by an operator's `parse_argv` and handed
/// back, uninspected by the engine, to the same operator's `perform`.
#[derive(Debug, Clone)]
pub enum OpArgv {
    /// Destination directory for file-placement operators.
    DestDir(PathBuf),
    /// Queue-routed command invocation for program-running operators.
    Command(RunSpec),
}

/// An operator: one pipeline-stage implementation.
#[async_trait]
pub trait Operator: Send + Sync {
    fn props(&self) -> OperatorProps;

    /// Apply this module's config section. Called once at startup, before
    /// any `parse_argv`.
    fn configure(
        &self,
        _section: &Value,
        _meta: Option<&SharedMeta>,
        _ignorance: &IgnoranceRegistry,
    ) {
    }

    /// Convert a raw config argv into this operator's parsed form. `None`
    /// drops the operation from its block.
    fn parse_argv(&self, raw: &Value) -> Option<OpArgv>;

    /// Act on the file. Returns the path subsequent stages should use, or
    /// `None` to abort the current block.
    async fn perform(
        &self,
        current_path: &Path,
        original_name: &str,
        argv: &OpArgv,
        exec_ref: &mut ExecRef,
        log: &mut BlockLog,
    ) -> Option<PathBuf>;

    async fn stop(&self) {}
}

/// Everything a monitor needs to begin emitting events.
pub struct MonitorStartup {
    /// Sink for observed changes; drained by the process driver.
    pub events: mpsc::UnboundedSender<ChangeEvent>,
    pub target_directory: PathBuf,
    pub recursive: bool,
    /// Registration point for periodic work on the cooperative driver.
    pub periodicals: PeriodicalRegistry,
    pub pulse: EnginePulse,
}

/// A monitor: an event source watching the target directory.
#[async_trait]
pub trait Monitor: Send + Sync {
    fn props(&self) -> MonitorProps;

    fn configure(
        &self,
        _section: &Value,
        _meta: Option<&SharedMeta>,
        _ignorance: &IgnoranceRegistry,
    ) {
    }

    async fn start(&self, startup: MonitorStartup) -> Result<(), EngineError>;

    async fn stop(&self) {}
}

/// Resolve an optional `ignorance-checker` config key against the registry.
pub(crate) fn resolve_ignorance(
    section: &Value,
    ignorance: &IgnoranceRegistry,
) -> Option<IgnoranceFn> {
    let name = section.get("ignorance-checker").and_then(Value::as_str)?;
    let checker = ignorance.lookup(name);
    if checker.is_none() {
        tracing::warn!(checker = name, "ignorance checker not registered");
    }
    checker
}
