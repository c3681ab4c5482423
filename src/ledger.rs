// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The shared, thread-safe ledger of recorded outcomes and aggregate
//! counters.

use crate::expectation::{evaluate, Expectation, ResultValue};
use crate::outcome::Outcome;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct LedgerInner {
    outcomes: IndexMap<String, Outcome>,
    successes: usize,
    failures: usize,
    skipped: usize,
    failure_names: Vec<String>,
    skipped_names: Vec<String>,
}

/// Insertion-ordered `name -> Outcome` mapping plus the counters and
/// sorted name lists the final report needs.
///
/// Every public method takes the lock only across the small critical
/// section that mutates shared state, per `spec.md` §5.
#[derive(Debug, Default)]
pub struct Ledger {
    inner: Mutex<LedgerInner>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one outcome and classifies it against `expectation`,
    /// updating counters. Returns the classification.
    pub fn record(&self, outcome: Outcome, expectation: &Expectation) -> ResultValue {
        let verdict = evaluate(&outcome, expectation);
        let name = outcome.name.clone();
        let mut inner = self.inner.lock().expect("ledger mutex poisoned");
        match verdict {
            ResultValue::Ok => inner.successes += 1,
            ResultValue::Fail => {
                inner.failures += 1;
                inner.failure_names.push(name.clone());
            }
            ResultValue::Ignore => {
                inner.skipped += 1;
                inner.skipped_names.push(name.clone());
            }
        }
        inner.outcomes.insert(name, outcome);
        verdict
    }

    /// True if an outcome with this exact name has already been recorded
    /// (the early-result short-circuit path, `spec.md` §4.1 step 5 /
    /// §4.4 step 3).
    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .lock()
            .expect("ledger mutex poisoned")
            .outcomes
            .contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Outcome> {
        self.inner
            .lock()
            .expect("ledger mutex poisoned")
            .outcomes
            .get(name)
            .cloned()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let inner = self.inner.lock().expect("ledger mutex poisoned");
        let mut failure_names = inner.failure_names.clone();
        let mut skipped_names = inner.skipped_names.clone();
        failure_names.sort();
        skipped_names.sort();
        LedgerSnapshot {
            outcomes: inner.outcomes.values().cloned().collect(),
            successes: inner.successes,
            failures: inner.failures,
            skipped: inner.skipped,
            failure_names,
            skipped_names,
            total: OnceCell::new(),
        }
    }
}

/// A point-in-time, already-sorted view of the ledger, suitable for
/// reporting.
#[derive(Clone, Debug, Default)]
pub struct LedgerSnapshot {
    pub outcomes: Vec<Outcome>,
    pub successes: usize,
    pub failures: usize,
    pub skipped: usize,
    pub failure_names: Vec<String>,
    pub skipped_names: Vec<String>,
    // Computed on first access, in the manner of `testrunner::test_list::TestList`'s
    // `skip_count: OnceCell<usize>`.
    total: OnceCell<usize>,
}

impl LedgerSnapshot {
    pub fn total(&self) -> usize {
        *self.total.get_or_init(|| self.successes + self.failures + self.skipped)
    }
}
