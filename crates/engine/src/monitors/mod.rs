// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in monitors

mod fs_notify;
mod periodical_scan;

pub use fs_notify::FsNotify;
pub use periodical_scan::PeriodicalScan;
