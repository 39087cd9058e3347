// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External-program operator.
//!
//! Owns the process-wide runner queues. An operation argv selects a queue
//! either explicitly (`{queue: name, command: [...]}`) or through the
//! shortcut syntax in the first command token: `(name) /path/to/program`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde_yaml::Value;
use tracing::info;

use ward_config::IgnoranceRegistry;
use ward_core::OperatorProps;
use ward_meta::SharedMeta;

use crate::module::{BlockLog, ExecRef, OpArgv, Operator};
use crate::runner::{RunSpec, RunnerQueues, DEFAULT_QUEUE};

/// Queue-shortcut syntax in the first command token: `(queue) program ...`.
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static QUEUE_SHORTCUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(([A-Za-z0-9-]+)\)\s*(\S.*)$").expect("constant regex pattern is valid")
});

const FILENAME_MACRO: &str = "%FILENAME%";

pub struct CodeRunner {
    queues: Mutex<Option<Arc<RunnerQueues>>>,
}

impl CodeRunner {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(None),
        }
    }

    /// The configured queue set, or a workerless default when the config
    /// file has no coderunner section.
    fn queues(&self) -> Arc<RunnerQueues> {
        let mut guard = self.queues.lock();
        Arc::clone(guard.get_or_insert_with(|| Arc::new(RunnerQueues::build(None, &[]))))
    }
}

impl Default for CodeRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operator for CodeRunner {
    fn props(&self) -> OperatorProps {
        OperatorProps {
            name: "coderunner",
            operation_name: "run_program",
            schedule_priority: None,
            run_priority: Some(3),
            handle_dismiss: true,
        }
    }

    fn configure(
        &self,
        section: &Value,
        _meta: Option<&SharedMeta>,
        _ignorance: &IgnoranceRegistry,
    ) {
        let default_max = section
            .get("max_running_program")
            .and_then(Value::as_i64)
            .filter(|n| *n > 0)
            .map(|n| n as usize);

        let mut named = Vec::new();
        if let Some(queue_cfgs) = section.get("queue").and_then(Value::as_sequence) {
            for queue_cfg in queue_cfgs {
                let Some(name) = queue_cfg.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let max = queue_cfg
                    .get("max_running_program")
                    .and_then(Value::as_i64)
                    .filter(|n| *n > 0)
                    .map(|n| n as usize);
                named.push((name.to_string(), max));
            }
        }

        *self.queues.lock() = Some(Arc::new(RunnerQueues::build(default_max, &named)));
    }

    /// Accepted argv shapes: a string (becomes `[string, %FILENAME%]`), a
    /// sequence (used verbatim, `%FILENAME%` appended when absent), or a
    /// `{queue, command}` mapping around either.
    fn parse_argv(&self, raw: &Value) -> Option<OpArgv> {
        let (mut queue, command_value) = match raw {
            Value::Mapping(_) => {
                let queue = raw
                    .get("queue")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_QUEUE)
                    .to_string();
                (queue, raw.get("command")?)
            }
            _ => (DEFAULT_QUEUE.to_string(), raw),
        };

        let mut command = match command_value {
            Value::String(s) => vec![s.clone(), FILENAME_MACRO.to_string()],
            Value::Sequence(seq) => {
                let mut tokens = Vec::with_capacity(seq.len() + 1);
                for item in seq {
                    tokens.push(item.as_str()?.to_string());
                }
                if !tokens.iter().any(|t| t == FILENAME_MACRO) {
                    tokens.push(FILENAME_MACRO.to_string());
                }
                tokens
            }
            _ => return None,
        };

        let shortcut = command.first().and_then(|first| {
            QUEUE_SHORTCUT
                .captures(first)
                .map(|captures| (captures[1].to_string(), captures[2].to_string()))
        });
        if let Some((label, rest)) = shortcut {
            command[0] = rest;
            if self.queues().contains(&label) {
                queue = label;
            }
        }

        Some(OpArgv::Command(RunSpec { queue, command }))
    }

    /// Submits the command; the file itself is observed, not transformed,
    /// so the current path is passed through unchanged.
    async fn perform(
        &self,
        current_path: &Path,
        _original_name: &str,
        argv: &OpArgv,
        exec_ref: &mut ExecRef,
        log: &mut BlockLog,
    ) -> Option<PathBuf> {
        let OpArgv::Command(spec) = argv else {
            log.append("run_program: unexpected argv shape");
            return None;
        };

        let queues = self.queues();
        queues
            .resolve(&spec.queue)
            .run(&spec.command, current_path, &exec_ref.carry_variable, log)
            .await;
        Some(current_path.to_path_buf())
    }

    async fn stop(&self) {
        let queues = { self.queues.lock().take() };
        if let Some(queues) = queues {
            info!("coderunner: stopping all runner queues");
            queues.stop_all().await;
            info!("coderunner: all runner queues stopped");
        }
    }
}

#[cfg(test)]
#[path = "coderunner_tests.rs"]
mod tests;
