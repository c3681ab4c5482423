// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expectations and the pure evaluator that classifies an [`Outcome`]
//! against one.

use crate::outcome::{Outcome, OutcomeResult};
use aho_corasick::AhoCorasick;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The expected result for a named action, plus tags that affect how the
/// runner treats it (e.g. `"large"` selects the large timeout).
#[derive(Clone, Debug)]
pub struct Expectation {
    pub result: OutcomeResult,
    pub tags: BTreeSet<String>,
    pattern_matchers: Option<AhoCorasick>,
}

impl Expectation {
    pub fn new(result: OutcomeResult, tags: impl IntoIterator<Item = String>) -> Self {
        Self {
            result,
            tags: tags.into_iter().collect(),
            pattern_matchers: None,
        }
    }

    /// Attaches substring patterns that must all be present in the
    /// outcome's captured output for a match to succeed, reusing the same
    /// Aho-Corasick engine `testrunner`'s name filter used for test-name
    /// matching.
    pub fn with_output_patterns(mut self, patterns: &[impl AsRef<[u8]>]) -> Self {
        self.pattern_matchers = if patterns.is_empty() {
            None
        } else {
            Some(AhoCorasick::new(patterns).expect("valid pattern set"))
        };
        self
    }

    pub fn is_large(&self) -> bool {
        self.tags.contains("large")
    }

    /// Compares this expectation against an actual outcome.
    pub fn matches(&self, outcome: &Outcome) -> bool {
        if self.result != outcome.result {
            return false;
        }
        match &self.pattern_matchers {
            None => true,
            Some(ac) => outcome
                .output_lines
                .iter()
                .all(|line| ac.is_match(line.as_bytes())),
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.result)
    }
}

/// External collaborator contract: a queryable map from action/outcome
/// name to expected result.
pub trait ExpectationStore: Send + Sync {
    fn get(&self, name: &str) -> Expectation;
}

/// The simplest possible store: actions with no entry default to
/// expecting [`OutcomeResult::Success`], matching the common case where
/// most tests are expected to pass.
#[derive(Clone, Debug, Default)]
pub struct InMemoryExpectationStore {
    entries: BTreeMap<String, Expectation>,
}

impl InMemoryExpectationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, expectation: Expectation) -> &mut Self {
        self.entries.insert(name.into(), expectation);
        self
    }
}

impl ExpectationStore for InMemoryExpectationStore {
    fn get(&self, name: &str) -> Expectation {
        self.entries
            .get(name)
            .cloned()
            .unwrap_or_else(|| Expectation::new(OutcomeResult::Success, []))
    }
}

/// The evaluator's output: a classification of one outcome.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResultValue {
    Ok,
    Fail,
    Ignore,
}

/// Pure function over one outcome: `spec.md` §4.7.
pub fn evaluate(outcome: &Outcome, expectation: &Expectation) -> ResultValue {
    if !outcome.matters {
        ResultValue::Ignore
    } else if expectation.matches(outcome) {
        ResultValue::Ok
    } else {
        ResultValue::Fail
    }
}
