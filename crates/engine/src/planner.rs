// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline planning: block scheduling and in-block run order.
//!
//! The user writes an ordered list of operation blocks. Planning happens in
//! two passes:
//!
//! 1. Blocks are reordered by the schedule sequence: for each scheduled
//!    operation name, every block mentioning that name is pulled out in its
//!    original relative order and appended; blocks mentioning no scheduled
//!    operation keep their input order at the tail. A block mentioning
//!    `copy_to` therefore lands before one mentioning `move_to`: once
//!    moved, the source no longer exists to copy.
//! 2. Inside each block, operations are ordered by the run sequence of the
//!    pipeline flavor, and each raw argv is handed to its operator's
//!    `parse_argv`. A `None` parse drops the operation; a block left empty
//!    is discarded.

use std::sync::Arc;

use tracing::debug;

use ward_config::RawOperationBlock;

use crate::module::{OpArgv, Operator};
use crate::registry::ModuleRegistry;

/// One planned operation inside a block.
pub struct OperationEntry {
    pub operation_name: String,
    pub argv: OpArgv,
    pub operator: Arc<dyn Operator>,
}

/// One planned group of operations; all of a block runs before the next.
pub struct OperationBlock {
    pub ops: Vec<OperationEntry>,
}

/// Which run sequence governs in-block ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineFlavor {
    /// New/modified files.
    Update,
    /// Deleted files; restricted to operators that handle dismiss events.
    Dismiss,
}

/// Plan the pipeline for one watch entry.
pub fn build_pipeline(
    registry: &ModuleRegistry,
    raw_blocks: &[RawOperationBlock],
    flavor: PipelineFlavor,
) -> Vec<OperationBlock> {
    let run_seq = match flavor {
        PipelineFlavor::Update => registry.run_update_seq(),
        PipelineFlavor::Dismiss => registry.run_dismiss_seq(),
    };

    let mut blocks = Vec::new();
    for raw in schedule_blocks(registry, raw_blocks) {
        let mut ops = Vec::new();
        for name in run_seq {
            let Some((_, raw_argv)) = raw.ops.iter().find(|(op, _)| op == name) else {
                continue;
            };
            let Some(operator) = registry.operator_for(name) else {
                continue;
            };
            match operator.parse_argv(raw_argv) {
                Some(argv) => ops.push(OperationEntry {
                    operation_name: name.clone(),
                    argv,
                    operator: Arc::clone(operator),
                }),
                None => {
                    debug!(operation = %name, "argv rejected, operation dropped from block")
                }
            }
        }
        if !ops.is_empty() {
            blocks.push(OperationBlock { ops });
        }
    }
    blocks
}

/// Reorder blocks by the schedule sequence, stably.
fn schedule_blocks<'a>(
    registry: &ModuleRegistry,
    raw_blocks: &'a [RawOperationBlock],
) -> Vec<&'a RawOperationBlock> {
    let mut taken = vec![false; raw_blocks.len()];
    let mut ordered = Vec::with_capacity(raw_blocks.len());

    for name in registry.schedule_seq() {
        for (index, block) in raw_blocks.iter().enumerate() {
            if !taken[index] && block.ops.iter().any(|(op, _)| op == name) {
                taken[index] = true;
                ordered.push(block);
            }
        }
    }
    for (index, block) in raw_blocks.iter().enumerate() {
        if !taken[index] {
            ordered.push(block);
        }
    }
    ordered
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
