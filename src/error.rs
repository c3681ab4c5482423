// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driver-level errors: the only exit paths that abort the Driver
//! itself rather than turning into an `Outcome`, per `spec.md` §7.

use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    /// `buildAndRun` was called a second time on the same `Driver`.
    #[error("this driver has already been used for a build-and-run cycle")]
    AlreadyUsed,

    #[error("failed to create working directory {path}")]
    Mkdir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configured `Mode` could not prepare its execution environment.
    #[error("mode failed to prepare")]
    Prepare(#[source] anyhow::Error),
}
