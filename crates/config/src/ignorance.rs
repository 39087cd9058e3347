// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named skip predicates referenced from config.
//!
//! An ignorance checker decides whether a `(relative folder, file name)`
//! pair should be skipped. Monitors additionally call checkers with both
//! arguments `None` to announce a new scan round, and with only a folder to
//! ask about pruning a whole directory; checkers that keep per-round state
//! use the round signal to reset it.

use std::collections::HashMap;
use std::sync::Arc;

/// Predicate over `(relfolder, filename)`; `true` means "skip this item".
pub type IgnoranceFn = Arc<dyn Fn(Option<&str>, Option<&str>) -> bool + Send + Sync>;

/// Registry of ignorance checkers, filled at startup by the embedding
/// program and consulted by name from config.
#[derive(Clone, Default)]
pub struct IgnoranceRegistry {
    checkers: HashMap<String, IgnoranceFn>,
}

impl IgnoranceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `checker` under `name`, replacing any previous registration.
    pub fn register<F>(&mut self, name: impl Into<String>, checker: F)
    where
        F: Fn(Option<&str>, Option<&str>) -> bool + Send + Sync + 'static,
    {
        self.checkers.insert(name.into(), Arc::new(checker));
    }

    pub fn lookup(&self, name: &str) -> Option<IgnoranceFn> {
        self.checkers.get(name).cloned()
    }

    /// Built-in roster: `hidden` skips dot-files and dot-directories.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("hidden", |relfolder: Option<&str>, name: Option<&str>| {
            let dotted = |s: &str| {
                std::path::Path::new(s)
                    .components()
                    .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
            };
            relfolder.is_some_and(dotted) || name.is_some_and(|n| n.starts_with('.'))
        });
        registry
    }
}

impl std::fmt::Debug for IgnoranceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.checkers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("IgnoranceRegistry")
            .field("checkers", &names)
            .finish()
    }
}

#[cfg(test)]
#[path = "ignorance_tests.rs"]
mod tests;
