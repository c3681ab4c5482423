// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `Action` data model: a discovered unit of test work.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single discovered unit of test work: one class, or one main-class
/// action, compiled from source or already present on the classpath.
///
/// Immutable once discovered; uniquely identified by [`Action::name`].
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Action {
    pub name: String,
    pub qualified_class_name: String,
    pub action_kind: ActionKind,
    /// Empty when the class was discovered without a source file (e.g. pulled
    /// straight off an existing classpath).
    pub source_path: Option<Utf8PathBuf>,
    pub resource_path: Option<Utf8PathBuf>,
    pub runner_spec: RunnerSpec,
}

impl Action {
    pub fn new(name: impl Into<String>, qualified_class_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualified_class_name: qualified_class_name.into(),
            action_kind: ActionKind::MainClass,
            source_path: None,
            resource_path: None,
            runner_spec: RunnerSpec::default(),
        }
    }
}

/// Replaces the `NamingPatternRunnerSpec`/`Runner` inheritance hierarchy
/// with a tagged variant, per the design note in the spec's glossary.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// A suite action that reports one outcome per test method.
    JUnitStyleSuite,
    /// A single `main`-style action that reports exactly one outcome.
    MainClass,
    /// The runner spec itself rejects this class; never built or run.
    Unsupported,
}

/// A small capability record carried alongside an [`Action`], standing in
/// for the per-runner-kind behavior that would otherwise live on a `Runner`
/// trait implementation.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunnerSpec {
    pub supports_large_timeout: bool,
    pub init_args: Vec<String>,
    pub tags: BTreeSet<String>,
}
