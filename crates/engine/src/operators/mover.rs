// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-move operator.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_yaml::Value;

use ward_core::OperatorProps;

use crate::module::{BlockLog, ExecRef, OpArgv, Operator};

/// Moves the current file to `dest_dir/original_filename`. Scheduled after
/// copy blocks: once the source is moved there is nothing left to copy.
#[derive(Debug, Default)]
pub struct Mover;

impl Mover {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Operator for Mover {
    fn props(&self) -> OperatorProps {
        OperatorProps {
            name: "mover",
            operation_name: "move_to",
            schedule_priority: Some(2),
            run_priority: Some(2),
            handle_dismiss: false,
        }
    }

    /// The argv is the destination directory; it must exist and be writable.
    fn parse_argv(&self, raw: &Value) -> Option<OpArgv> {
        let dir = PathBuf::from(raw.as_str()?);
        if !dir.is_dir() || is_readonly(&dir) {
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
            log.append("move_to: unexpected argv shape");
            return None;
        };

        let target_path = dest_dir.join(original_name);

        // A non-writable file already at the destination would make the
        // move fail; unlink it first.
        if target_path.exists() && is_readonly(&target_path) {
            if let Err(error) = std::fs::remove_file(&target_path) {
                log.append(format!(
                    "move {} to {} failed: {}",
                    current_path.display(),
                    target_path.display(),
                    error
                ));
                return None;
            }
        }

        match move_file(current_path, &target_path) {
            Ok(()) => {
                log.append(format!(
                    "move {} to {} success",
                    current_path.display(),
                    target_path.display()
                ));
                Some(target_path)
            }
            Err(error) => {
                log.append(format!(
                    "move {} to {} failed: {}",
                    current_path.display(),
                    target_path.display(),
                    error
                ));
                None
            }
        }
    }
}

/// Rename, falling back to copy-and-unlink across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

fn is_readonly(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.permissions().readonly())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "mover_tests.rs"]
mod tests;
