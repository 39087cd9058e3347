// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! YAML config file loading.
//!
//! The file is one mapping. A handful of keys are global (`target_directory`,
//! `recursive_watch`, `remove_unoperate_file`, `meta`, `watching_entries`);
//! every other top-level key is a module config section, handed verbatim to
//! the module registered under that name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use thiserror::Error;
use tracing::warn;

use crate::truthy::truthy;

const GLOBAL_KEYS: &[&str] = &[
    "target_directory",
    "recursive_watch",
    "remove_unoperate_file",
    "meta",
    "watching_entries",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config root must be a mapping")]
    NotAMapping,

    #[error("target_directory is missing")]
    MissingTargetDirectory,

    #[error("target_directory {0} is not an existing directory")]
    TargetNotADirectory(PathBuf),

    #[error("meta section is missing db_path")]
    MissingMetaDbPath,

    #[error("watch entry {index}: missing required field {field:?}")]
    EntryMissingField { index: usize, field: &'static str },

    #[error("watch entry {index}: field {field:?} has the wrong shape")]
    EntryBadField { index: usize, field: &'static str },
}

/// Process-wide settings, built once at startup and immutable thereafter.
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    /// Watch root, stored absolute. Guaranteed to be an existing directory.
    pub target_directory: PathBuf,
    pub recursive_watch: bool,
    /// Delete files whose operation was cancelled (e.g. duplicates).
    pub remove_unoperate_file: bool,
    /// Metadata database path; `None` disables the metadata store.
    pub meta_db_path: Option<PathBuf>,
    /// DuplicateCheck retention in days (min 1).
    pub dupcheck_reserve_days: u32,
    /// PresenceCheck retention in days (min 1).
    pub missing_reserve_days: u32,
}

/// One operation block: an ordered `operation_name -> raw argv` group. All
/// operations of a block run before the next block.
#[derive(Debug, Clone)]
pub struct RawOperationBlock {
    pub ops: Vec<(String, Value)>,
}

/// A watch rule as written in config, before regexes are compiled and
/// operation argvs are parsed by their operators.
#[derive(Debug, Clone)]
pub struct RawWatchEntry {
    pub file_regex: String,
    pub path_regex: Option<String>,
    pub duplicate_check: bool,
    /// Overrides the filename as the duplicate key, making differently
    /// named files with identical content collide. Only set when
    /// `duplicate_check` is on.
    pub content_check_label: Option<String>,
    pub process_as_uniqname: bool,
    /// Name of a registered ignorance checker.
    pub ignorance_checker: Option<String>,
    pub update_operation: Vec<RawOperationBlock>,
    pub remove_operation: Vec<RawOperationBlock>,
}

/// Everything the config file provides.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub global: GlobalConfig,
    pub entries: Vec<RawWatchEntry>,
    /// Module config sections keyed by module name.
    pub module_sections: HashMap<String, Value>,
}

/// Read and parse the config file at `path`.
pub fn load_config(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

/// Parse config text. Split from [`load_config`] so tests can feed strings.
pub fn parse_config(text: &str) -> Result<LoadedConfig, ConfigError> {
    let root: Value = serde_yaml::from_str(text)?;
    let mapping = root.as_mapping().ok_or(ConfigError::NotAMapping)?;

    let global = parse_global(&root)?;
    let entries = match root.get("watching_entries") {
        Some(value) => parse_watch_entries(value)?,
        None => Vec::new(),
    };
    if entries.is_empty() {
        warn!("no watching_entries configured; every event will be unmatched");
    }

    let mut module_sections = HashMap::new();
    for (key, value) in mapping {
        let Some(name) = key.as_str() else { continue };
        if GLOBAL_KEYS.contains(&name) {
            continue;
        }
        module_sections.insert(name.to_string(), value.clone());
    }

    Ok(LoadedConfig {
        global,
        entries,
        module_sections,
    })
}

fn parse_global(root: &Value) -> Result<GlobalConfig, ConfigError> {
    let target = root
        .get("target_directory")
        .and_then(Value::as_str)
        .ok_or(ConfigError::MissingTargetDirectory)?;
    let target = PathBuf::from(target);
    if !target.is_dir() {
        return Err(ConfigError::TargetNotADirectory(target));
    }
    let target_directory = target
        .canonicalize()
        .map_err(|_| ConfigError::TargetNotADirectory(target))?;

    let recursive_watch = root.get("recursive_watch").map(truthy).unwrap_or(false);
    let remove_unoperate_file = root
        .get("remove_unoperate_file")
        .map(truthy)
        .unwrap_or(false);

    let mut meta_db_path = None;
    let mut dupcheck_reserve_days = 3;
    let mut missing_reserve_days = 2;
    if let Some(meta) = root.get("meta") {
        let db_path = meta
            .get("db_path")
            .and_then(Value::as_str)
            .ok_or(ConfigError::MissingMetaDbPath)?;
        meta_db_path = Some(PathBuf::from(db_path));

        if let Some(days) = meta.get("duplicate_check_reserve_day").and_then(as_int) {
            dupcheck_reserve_days = days.max(1) as u32;
        }
        if let Some(days) = meta.get("missing_detect_reserve_day").and_then(as_int) {
            missing_reserve_days = days.max(1) as u32;
        }
    }

    Ok(GlobalConfig {
        target_directory,
        recursive_watch,
        remove_unoperate_file,
        meta_db_path,
        dupcheck_reserve_days,
        missing_reserve_days,
    })
}

fn parse_watch_entries(value: &Value) -> Result<Vec<RawWatchEntry>, ConfigError> {
    let seq = value.as_sequence().ok_or(ConfigError::EntryBadField {
        index: 0,
        field: "watching_entries",
    })?;

    let mut entries = Vec::with_capacity(seq.len());
    for (index, entry) in seq.iter().enumerate() {
        entries.push(parse_watch_entry(index, entry)?);
    }
    Ok(entries)
}

fn parse_watch_entry(index: usize, entry: &Value) -> Result<RawWatchEntry, ConfigError> {
    let file_regex = entry
        .get("file_regex")
        .and_then(Value::as_str)
        .ok_or(ConfigError::EntryMissingField {
            index,
            field: "file_regex",
        })?
        .to_string();

    let path_regex = entry
        .get("path_regex")
        .and_then(Value::as_str)
        .map(str::to_string);

    let duplicate_check = entry.get("duplicate_check").map(truthy).unwrap_or(false);

    let content_check_label = if duplicate_check {
        entry
            .get("duplicate_content_check_label")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_string)
    } else {
        None
    };

    let process_as_uniqname = entry.get("process_as_uniqname").map(truthy).unwrap_or(true);

    let ignorance_checker = entry
        .get("ignorance-checker")
        .and_then(Value::as_str)
        .map(str::to_string);

    // `operation` is the legacy spelling of `update-operation`.
    let update_value = entry.get("update-operation").or_else(|| entry.get("operation"));
    let update_operation = match update_value {
        Some(v) => parse_operation_blocks(index, "update-operation", v)?,
        None => Vec::new(),
    };
    let remove_operation = match entry.get("remove-operation") {
        Some(v) => parse_operation_blocks(index, "remove-operation", v)?,
        None => Vec::new(),
    };

    Ok(RawWatchEntry {
        file_regex,
        path_regex,
        duplicate_check,
        content_check_label,
        process_as_uniqname,
        ignorance_checker,
        update_operation,
        remove_operation,
    })
}

fn parse_operation_blocks(
    index: usize,
    field: &'static str,
    value: &Value,
) -> Result<Vec<RawOperationBlock>, ConfigError> {
    let seq = value
        .as_sequence()
        .ok_or(ConfigError::EntryBadField { index, field })?;

    let mut blocks = Vec::with_capacity(seq.len());
    for block in seq {
        let mapping = block
            .as_mapping()
            .ok_or(ConfigError::EntryBadField { index, field })?;
        let ops = mapping
            .iter()
            .filter_map(|(k, v)| k.as_str().map(|name| (name.to_string(), v.clone())))
            .collect();
        blocks.push(RawOperationBlock { ops });
    }
    Ok(blocks)
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
