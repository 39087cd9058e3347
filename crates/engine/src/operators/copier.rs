// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-copy operator.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_yaml::Value;

use ward_core::OperatorProps;

use crate::module::{BlockLog, ExecRef, OpArgv, Operator};

/// Copies the current file to `dest_dir/original_filename`. Runs early:
/// a copy must happen before any block that moves the source away.
#[derive(Debug, Default)]
pub struct Copier;

impl Copier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Operator for Copier {
    fn props(&self) -> OperatorProps {
        OperatorProps {
            name: "copier",
            operation_name: "copy_to",
            schedule_priority: Some(1),
            run_priority: Some(1),
            handle_dismiss: false,
        }
    }

    /// The argv is the destination directory; it must already exist.
    fn parse_argv(&self, raw: &Value) -> Option<OpArgv> {
        let dir = PathBuf::from(raw.as_str()?);
        if !dir.is_dir() {
            return None;
        }
        dir.canonicalize().ok().map(OpArgv::DestDir)
    }

    async fn perform(
        &self,
        current_path: &Path,
        original_name: &str,
        argv: &OpArgv,
        _exec_ref: &mut ExecRef,
        log: &mut BlockLog,
    ) -> Option<PathBuf> {
        let OpArgv::DestDir(dest_dir) = argv else {
            log.append("copy_to: unexpected argv shape");
            return None;
        };

        let target_path = dest_dir.join(original_name);
        match std::fs::copy(current_path, &target_path) {
            Ok(_) => {
                log.append(format!(
                    "copy {} to {} success",
                    current_path.display(),
                    target_path.display()
                ));
                Some(target_path)
            }
            Err(error) => {
                log.append(format!(
                    "copy {} to {} failed: {}",
                    current_path.display(),
                    target_path.display(),
                    error
                ));
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "copier_tests.rs"]
mod tests;
