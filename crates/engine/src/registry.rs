// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Module registry and derived operation sequences.
//!
//! The registry is built once at startup from an explicit module roster.
//! From the operator property records it derives three name sequences:
//! the block-scheduling order, the in-block run order for update pipelines,
//! and the in-block run order for remove (dismiss) pipelines. Sorts are
//! stable, so operators sharing a priority keep their roster order.

use std::collections::HashMap;
use std::sync::Arc;

use serde_yaml::Value;
use tracing::debug;

use ward_config::IgnoranceRegistry;
use ward_meta::SharedMeta;

use crate::module::{Monitor, Operator};

pub struct ModuleRegistry {
    monitors: Vec<Arc<dyn Monitor>>,
    operators: Vec<Arc<dyn Operator>>,
    by_operation: HashMap<String, Arc<dyn Operator>>,
    schedule_seq: Vec<String>,
    run_update_seq: Vec<String>,
    run_dismiss_seq: Vec<String>,
}

impl ModuleRegistry {
    pub fn new(monitors: Vec<Arc<dyn Monitor>>, operators: Vec<Arc<dyn Operator>>) -> Self {
        let mut by_operation = HashMap::new();
        let mut scheduled: Vec<(i32, String)> = Vec::new();
        let mut run_update: Vec<(i32, String)> = Vec::new();
        let mut run_dismiss: Vec<(i32, String)> = Vec::new();

        for operator in &operators {
            let props = operator.props();
            let operation = props.operation_name.to_string();
            by_operation.insert(operation.clone(), Arc::clone(operator));

            if let Some(priority) = props.schedule_priority {
                scheduled.push((priority, operation.clone()));
            }
            if let Some(priority) = props.run_priority {
                run_update.push((priority, operation.clone()));
                if props.handle_dismiss {
                    run_dismiss.push((priority, operation.clone()));
                }
            }
        }

        scheduled.sort_by_key(|(priority, _)| *priority);
        run_update.sort_by_key(|(priority, _)| *priority);
        run_dismiss.sort_by_key(|(priority, _)| *priority);

        let registry = Self {
            monitors,
            operators,
            by_operation,
            schedule_seq: scheduled.into_iter().map(|(_, name)| name).collect(),
            run_update_seq: run_update.into_iter().map(|(_, name)| name).collect(),
            run_dismiss_seq: run_dismiss.into_iter().map(|(_, name)| name).collect(),
        };
        debug!(
            schedule = ?registry.schedule_seq,
            run_update = ?registry.run_update_seq,
            run_dismiss = ?registry.run_dismiss_seq,
            "derived operation sequences"
        );
        registry
    }

    /// Dispatch each module's config section (keyed by module name) and the
    /// shared metadata store to the module.
    pub fn configure_all(
        &self,
        sections: &HashMap<String, Value>,
        meta: Option<&SharedMeta>,
        ignorance: &IgnoranceRegistry,
    ) {
        let empty = Value::Null;
        for monitor in &self.monitors {
            let section = sections.get(monitor.props().name).unwrap_or(&empty);
            monitor.configure(section, meta, ignorance);
        }
        for operator in &self.operators {
            let section = sections.get(operator.props().name).unwrap_or(&empty);
            operator.configure(section, meta, ignorance);
        }
    }

    pub fn monitors(&self) -> &[Arc<dyn Monitor>] {
        &self.monitors
    }

    pub fn operators(&self) -> &[Arc<dyn Operator>] {
        &self.operators
    }

    pub fn operator_for(&self, operation_name: &str) -> Option<&Arc<dyn Operator>> {
        self.by_operation.get(operation_name)
    }

    pub fn schedule_seq(&self) -> &[String] {
        &self.schedule_seq
    }

    pub fn run_update_seq(&self) -> &[String] {
        &self.run_update_seq
    }

    pub fn run_dismiss_seq(&self) -> &[String] {
        &self.run_dismiss_seq
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
