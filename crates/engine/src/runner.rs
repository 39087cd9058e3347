// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named subprocess queues.
//!
//! Each queue either runs commands synchronously on the caller (no workers
//! configured) or owns a fixed set of workers draining a FIFO channel.
//! Workers only launch external programs and log exit codes; they never
//! touch engine or metadata state.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::module::BlockLog;

/// The queue used when no other queue is named.
pub const DEFAULT_QUEUE: &str = "_DEFAULT";

/// Exit code reported when a program could not be launched at all.
const LAUNCH_FAILED_CODE: i32 = -65536;

/// A parsed `run_program` invocation: target queue plus the command tokens,
/// still carrying unexpanded macros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub queue: String,
    pub command: Vec<String>,
}

/// `None` is the worker shutdown sentinel.
type Task = Option<Vec<String>>;

pub struct RunnerQueue {
    label: String,
    worker_count: usize,
    tx: Option<mpsc::UnboundedSender<Task>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl RunnerQueue {
    /// Create the queue and spawn its workers. With `max_concurrent` `None`
    /// or zero the queue has no workers and [`run`](Self::run) executes on
    /// the caller.
    pub fn start(label: impl Into<String>, max_concurrent: Option<usize>) -> Arc<Self> {
        let label = label.into();
        let worker_count = max_concurrent.unwrap_or(0);

        if worker_count == 0 {
            return Arc::new(Self {
                label,
                worker_count,
                tx: None,
                workers: Mutex::new(Vec::new()),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel::<Task>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let rx = Arc::clone(&rx);
            let label = label.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    // Hold the channel lock only while receiving, so other
                    // workers pick up tasks during execution.
                    let task = { rx.lock().await.recv().await };
                    match task {
                        Some(Some(command)) => {
                            let code = invoke(&command).await;
                            info!(
                                queue = %label,
                                worker = worker_id,
                                code,
                                command = ?command,
                                "ran queued program"
                            );
                        }
                        Some(None) | None => break,
                    }
                }
                debug!(queue = %label, worker = worker_id, "worker exiting");
            }));
        }

        Arc::new(Self {
            label,
            worker_count,
            tx: Some(tx),
            workers: Mutex::new(handles),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Expand macros and submit the command. With workers this returns as
    /// soon as the task is enqueued; without, it waits for the child to
    /// exit.
    pub async fn run(
        &self,
        command: &[String],
        filepath: &Path,
        carry: &HashMap<String, String>,
        log: &mut BlockLog,
    ) {
        let expanded = expand_macros(command, filepath, carry);
        let Some(program) = expanded.first() else {
            log.append("empty command, nothing to run");
            return;
        };
        if !is_executable_file(Path::new(program)) {
            log.append(format!("not an executable program: {}", program));
            return;
        }

        match &self.tx {
            Some(tx) => {
                if tx.send(Some(expanded.clone())).is_ok() {
                    log.append(format!(
                        "queued program [{}] into queue={}",
                        expanded.join(" "),
                        self.label
                    ));
                } else {
                    warn!(queue = %self.label, command = ?expanded, "queue stopped, command not submitted");
                    log.append(format!("queue {} already stopped", self.label));
                }
            }
            None => {
                let code = invoke(&expanded).await;
                log.append(format!(
                    "ran program [{}] with retcode={}",
                    expanded.join(" "),
                    code
                ));
            }
        }
    }

    /// Send one shutdown sentinel per worker and wait for all of them to
    /// drain. Queued tasks submitted before the sentinels still run.
    pub async fn stop(&self) {
        if let Some(tx) = &self.tx {
            for _ in 0..self.worker_count {
                let _ = tx.send(None);
            }
        }
        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// The queue set owned by the program-running operator. `_DEFAULT` always
/// exists.
pub struct RunnerQueues {
    default: Arc<RunnerQueue>,
    named: HashMap<String, Arc<RunnerQueue>>,
}

impl RunnerQueues {
    pub fn build(default_max: Option<usize>, named_queues: &[(String, Option<usize>)]) -> Self {
        let mut named = HashMap::new();
        for (name, max) in named_queues {
            named.insert(name.clone(), RunnerQueue::start(name.clone(), *max));
        }
        Self {
            default: RunnerQueue::start(DEFAULT_QUEUE, default_max),
            named,
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        label == DEFAULT_QUEUE || self.named.contains_key(label)
    }

    /// The queue registered under `label`, falling back to `_DEFAULT`.
    pub fn resolve(&self, label: &str) -> &Arc<RunnerQueue> {
        self.named.get(label).unwrap_or(&self.default)
    }

    pub async fn stop_all(&self) {
        for queue in self.named.values() {
            queue.stop().await;
        }
        self.default.stop().await;
    }
}

async fn invoke(command: &[String]) -> i32 {
    let Some((program, args)) = command.split_first() else {
        return LAUNCH_FAILED_CODE;
    };
    match tokio::process::Command::new(program).args(args).status().await {
        Ok(status) => status.code().unwrap_or(-1),
        Err(error) => {
            warn!(program = %program, %error, "failed to launch program");
            LAUNCH_FAILED_CODE
        }
    }
}

/// Replace `%FILENAME%` with the file path and `%NAME%` with the carry
/// variable `NAME`; unknown or malformed macros stay verbatim.
fn expand_macros(
    command: &[String],
    filepath: &Path,
    carry: &HashMap<String, String>,
) -> Vec<String> {
    command
        .iter()
        .map(|token| {
            if token == "%FILENAME%" {
                return filepath.to_string_lossy().into_owned();
            }
            if let Some(name) = macro_name(token) {
                if let Some(value) = carry.get(name) {
                    return value.clone();
                }
            }
            token.clone()
        })
        .collect()
}

/// A token is a macro when it is exactly `%NAME%` with `NAME` drawn from
/// `[A-Za-z0-9_-]`.
fn macro_name(token: &str) -> Option<&str> {
    let inner = token.strip_prefix('%')?.strip_suffix('%')?;
    let valid = !inner.is_empty()
        && inner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then_some(inner)
}

fn is_executable_file(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
