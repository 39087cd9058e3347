// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::FakeOperator;
use serde_yaml::Value;

fn block(ops: &[&str]) -> RawOperationBlock {
    RawOperationBlock {
        ops: ops
            .iter()
            .map(|name| (name.to_string(), Value::String("/tmp".into())))
            .collect(),
    }
}

fn builtin_like_registry() -> ModuleRegistry {
    ModuleRegistry::new(
        Vec::new(),
        vec![
            Arc::new(FakeOperator::new("copy_to").schedule(1).run(1)),
            Arc::new(FakeOperator::new("move_to").schedule(2).run(2)),
            Arc::new(FakeOperator::new("run_program").run(3).dismiss()),
        ],
    )
}

fn block_ops(blocks: &[OperationBlock]) -> Vec<Vec<&str>> {
    blocks
        .iter()
        .map(|b| b.ops.iter().map(|op| op.operation_name.as_str()).collect())
        .collect()
}

#[test]
fn scheduled_blocks_precede_unscheduled_blocks() {
    let registry = builtin_like_registry();
    // As written: a run-only block, then a copy block. The copy block is
    // scheduled (priority 1) and must execute first.
    let raw = vec![block(&["run_program"]), block(&["copy_to"])];

    let planned = build_pipeline(&registry, &raw, PipelineFlavor::Update);
    assert_eq!(block_ops(&planned), vec![vec!["copy_to"], vec!["run_program"]]);
}

#[test]
fn copy_blocks_precede_move_blocks() {
    let registry = builtin_like_registry();
    let raw = vec![block(&["move_to"]), block(&["copy_to"])];

    let planned = build_pipeline(&registry, &raw, PipelineFlavor::Update);
    assert_eq!(block_ops(&planned), vec![vec!["copy_to"], vec!["move_to"]]);
}

#[test]
fn blocks_sharing_a_schedule_position_keep_input_order() {
    let registry = builtin_like_registry();
    let raw = vec![
        block(&["copy_to"]),
        block(&["move_to"]),
        block(&["copy_to"]),
    ];

    let planned = build_pipeline(&registry, &raw, PipelineFlavor::Update);
    // Both copy blocks first, in input order, then the move block.
    assert_eq!(
        block_ops(&planned),
        vec![vec!["copy_to"], vec!["copy_to"], vec!["move_to"]]
    );
}

#[test]
fn block_with_multiple_scheduled_ops_is_pulled_once_at_earliest_position() {
    let registry = builtin_like_registry();
    let raw = vec![block(&["move_to"]), block(&["move_to", "copy_to"])];

    let planned = build_pipeline(&registry, &raw, PipelineFlavor::Update);
    // The mixed block contains copy_to, so it is claimed at the copy_to
    // position ahead of the move-only block, and is not duplicated.
    assert_eq!(
        block_ops(&planned),
        vec![vec!["copy_to", "move_to"], vec!["move_to"]]
    );
}

#[test]
fn unscheduled_blocks_keep_input_order_at_tail() {
    let registry = builtin_like_registry();
    let raw = vec![
        block(&["run_program"]),
        block(&["copy_to"]),
        block(&["run_program"]),
    ];

    let planned = build_pipeline(&registry, &raw, PipelineFlavor::Update);
    assert_eq!(
        block_ops(&planned),
        vec![vec!["copy_to"], vec!["run_program"], vec!["run_program"]]
    );
}

#[test]
fn ops_inside_a_block_follow_run_order() {
    let registry = builtin_like_registry();
    // Written in reverse run order inside one block.
    let raw = vec![block(&["run_program", "move_to", "copy_to"])];

    let planned = build_pipeline(&registry, &raw, PipelineFlavor::Update);
    assert_eq!(
        block_ops(&planned),
        vec![vec!["copy_to", "move_to", "run_program"]]
    );
}

#[test]
fn dismiss_flavor_keeps_only_dismiss_capable_ops() {
    let registry = builtin_like_registry();
    let raw = vec![block(&["copy_to", "run_program"])];

    let planned = build_pipeline(&registry, &raw, PipelineFlavor::Dismiss);
    assert_eq!(block_ops(&planned), vec![vec!["run_program"]]);
}

#[test]
fn rejected_argv_drops_op_and_empty_blocks_are_discarded() {
    let registry = ModuleRegistry::new(
        Vec::new(),
        vec![
            Arc::new(FakeOperator::new("copy_to").schedule(1).run(1)),
            Arc::new(FakeOperator::new("broken").run(2).rejecting()),
        ],
    );
    let raw = vec![block(&["broken"]), block(&["copy_to", "broken"])];

    let planned = build_pipeline(&registry, &raw, PipelineFlavor::Update);
    // The broken-only block vanishes entirely; the mixed block keeps copy_to.
    assert_eq!(block_ops(&planned), vec![vec!["copy_to"]]);
}

#[test]
fn unknown_operation_names_are_skipped() {
    let registry = builtin_like_registry();
    let raw = vec![block(&["copy_to", "no_such_op"])];

    let planned = build_pipeline(&registry, &raw, PipelineFlavor::Update);
    assert_eq!(block_ops(&planned), vec![vec!["copy_to"]]);
}
