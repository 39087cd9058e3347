// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("metadata failure: {0}")]
    Meta(#[from] ward_meta::MetaError),

    #[error("filesystem watch failure: {0}")]
    Watch(#[from] notify::Error),

    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid regex {pattern:?}: {source}")]
    Regex {
        pattern: String,
        source: regex::Error,
    },

    #[error("unknown ignorance checker {0:?}")]
    UnknownIgnoranceChecker(String),
}
