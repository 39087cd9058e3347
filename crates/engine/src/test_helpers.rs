// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fakes for engine tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_yaml::Value;

use ward_config::IgnoranceRegistry;
use ward_core::OperatorProps;
use ward_meta::SharedMeta;

use crate::module::{BlockLog, ExecRef, OpArgv, Operator};

/// Journal shared between fakes and assertions: one line per perform call.
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

pub(crate) fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// A scriptable operator for registry/planner/engine tests.
pub(crate) struct FakeOperator {
    props: OperatorProps,
    reject_argv: bool,
    fail_perform: bool,
    journal: Journal,
    configured: Mutex<Option<Value>>,
}

impl FakeOperator {
    pub fn new(operation_name: &'static str) -> Self {
        Self {
            props: OperatorProps {
                name: operation_name,
                operation_name,
                schedule_priority: None,
                run_priority: Some(100),
                handle_dismiss: false,
            },
            reject_argv: false,
            fail_perform: false,
            journal: journal(),
            configured: Mutex::new(None),
        }
    }

    pub fn schedule(mut self, priority: i32) -> Self {
        self.props.schedule_priority = Some(priority);
        self
    }

    pub fn run(mut self, priority: i32) -> Self {
        self.props.run_priority = Some(priority);
        self
    }

    pub fn no_run_priority(mut self) -> Self {
        self.props.run_priority = None;
        self
    }

    pub fn dismiss(mut self) -> Self {
        self.props.handle_dismiss = true;
        self
    }

    pub fn rejecting(mut self) -> Self {
        self.reject_argv = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_perform = true;
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn configured_section(&self) -> Option<Value> {
        self.configured.lock().clone()
    }
}

#[async_trait]
impl Operator for FakeOperator {
    fn props(&self) -> OperatorProps {
        self.props.clone()
    }

    fn configure(
        &self,
        section: &Value,
        _meta: Option<&SharedMeta>,
        _ignorance: &IgnoranceRegistry,
    ) {
        *self.configured.lock() = Some(section.clone());
    }

    fn parse_argv(&self, raw: &Value) -> Option<OpArgv> {
        if self.reject_argv {
            return None;
        }
        let dest = raw.as_str().unwrap_or("/");
        Some(OpArgv::DestDir(PathBuf::from(dest)))
    }

    async fn perform(
        &self,
        current_path: &Path,
        _original_name: &str,
        _argv: &OpArgv,
        _exec_ref: &mut ExecRef,
        log: &mut BlockLog,
    ) -> Option<PathBuf> {
        let name = current_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.journal
            .lock()
            .push(format!("{}({})", self.props.operation_name, name));
        if self.fail_perform {
            log.append(format!("{} failed", self.props.operation_name));
            None
        } else {
            log.append(format!("{} ok", self.props.operation_name));
            Some(current_path.to_path_buf())
        }
    }
}
