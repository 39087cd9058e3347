// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ward-config: configuration loading for the ward daemon
//!
//! Reads the YAML config file into typed records. Module-specific sections
//! are kept as raw YAML values and dispatched by module name; watch entries
//! keep their operation blocks raw as well, since only the owning operator
//! knows how to parse an operation's argv.

pub mod ignorance;
pub mod loader;
pub mod truthy;

pub use ignorance::{IgnoranceFn, IgnoranceRegistry};
pub use loader::{
    load_config, parse_config, ConfigError, GlobalConfig, LoadedConfig, RawOperationBlock,
    RawWatchEntry,
};
pub use truthy::truthy;
