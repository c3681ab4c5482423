// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outcomes: the verdicts a running (or build-failed) action produces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The result taxonomy from the spec's error-handling design, §7.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeResult {
    Success,
    ExecFailed,
    ExecTimeout,
    CompileFailed,
    Error,
    Unsupported,
}

impl OutcomeResult {
    pub fn is_success(self) -> bool {
        matches!(self, OutcomeResult::Success)
    }
}

impl fmt::Display for OutcomeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeResult::Success => write!(f, "SUCCESS"),
            OutcomeResult::ExecFailed => write!(f, "EXEC_FAILED"),
            OutcomeResult::ExecTimeout => write!(f, "EXEC_TIMEOUT"),
            OutcomeResult::CompileFailed => write!(f, "COMPILE_FAILED"),
            OutcomeResult::Error => write!(f, "ERROR"),
            OutcomeResult::Unsupported => write!(f, "UNSUPPORTED"),
        }
    }
}

/// A single named verdict, with any captured output.
///
/// One action may produce many of these when it is itself a suite: names
/// are hierarchical (`action.name` or `action.name#method`).
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Outcome {
    pub name: String,
    pub result: OutcomeResult,
    pub output_lines: Vec<String>,
    /// `false` means this outcome is informational and does not count
    /// toward pass/fail/skip totals.
    pub matters: bool,
}

impl Outcome {
    pub fn new(name: impl Into<String>, result: OutcomeResult) -> Self {
        Self {
            name: name.into(),
            result,
            output_lines: Vec::new(),
            matters: true,
        }
    }

    pub fn with_message(name: impl Into<String>, result: OutcomeResult, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            result,
            output_lines: vec![message.into()],
            matters: true,
        }
    }

    pub fn unsupported(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::with_message(name, OutcomeResult::Unsupported, reason)
    }

    pub fn timeout(name: impl Into<String>, timeout_secs: u64) -> Self {
        Self::with_message(
            name,
            OutcomeResult::ExecTimeout,
            format!("killed because it timed out after {timeout_secs} seconds"),
        )
    }
}
