// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streamed content signatures for duplicate detection.
//!
//! The signature is an MD5 digest, base64-encoded with the trailing padding
//! stripped. Collision resistance against casual churn is all that is asked
//! of it; this is not a cryptographic guarantee.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use md5::{Digest, Md5};

use crate::store::MetaError;

const CHUNK_SIZE: usize = 8192;

/// Digest the file at `path` into a short stable signature string.
pub fn compute_signature(path: &Path) -> Result<String, MetaError> {
    let mut file = File::open(path).map_err(|source| MetaError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut digester = Md5::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut chunk).map_err(|source| MetaError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        digester.update(&chunk[..n]);
    }

    let encoded = STANDARD.encode(digester.finalize());
    Ok(encoded.trim_end_matches('=').to_string())
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
