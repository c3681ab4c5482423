// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The builder worker pool: `spec.md` §4.2.

use crate::action::Action;
use crate::expectation::ExpectationStore;
use crate::ledger::Ledger;
use crate::mode::Mode;
use crossbeam_channel::Sender;
use std::sync::Arc;
use tracing::error;

/// Builds and installs one action, then always enqueues it.
///
/// The "always enqueue, even on a non-null (failure) outcome" behavior
/// is the open question `spec.md` §9 flags as implicit in the source
/// and asks implementers to preserve explicitly: it keeps the
/// `total_to_run` invariant so the runner stage always sees exactly the
/// number of items the Orchestrator submitted. A build task that
/// returns `Err` (an unexpected failure, not a graceful `Outcome`) is
/// the one case that does *not* enqueue — that action will never reach
/// the runner, which is exactly what drives starvation detection.
pub fn run_build_task(
    mode: &dyn Mode,
    action: Action,
    ledger: &Ledger,
    expectations: &dyn ExpectationStore,
    ready_queue: &Sender<Action>,
) {
    match mode.build_and_install(&action) {
        Ok(Some(outcome)) => {
            let expectation = expectations.get(&outcome.name);
            ledger.record(outcome, &expectation);
            // Still enqueued: see the doc comment above.
            let _ = ready_queue.send(action);
        }
        Ok(None) => {
            let _ = ready_queue.send(action);
        }
        Err(err) => {
            error!(action = %action.name, error = %err, "unexpected failure!");
        }
    }
}

/// Thin wrapper around a `rayon` thread pool sized to the physical CPU
/// count, in the manner of `testrunner::runner::TestRunnerOpts::build`'s
/// `jobs` default.
pub struct BuilderPool {
    pool: Arc<rayon::ThreadPool>,
}

impl BuilderPool {
    pub fn new() -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get_physical())
            .thread_name(|idx| format!("action-driver-build-{idx}"))
            .build()
            .expect("builder thread pool should build");
        Self { pool: Arc::new(pool) }
    }

    /// Submits one build task per action and blocks until all of them
    /// have finished, mirroring [`crate::runner::RunnerPool::run_all`].
    pub fn build_all(
        &self,
        mode: Arc<dyn Mode>,
        ledger: Arc<Ledger>,
        expectations: Arc<dyn ExpectationStore>,
        actions: Vec<Action>,
        ready_queue: Sender<Action>,
    ) {
        self.pool.scope(move |scope| {
            for action in actions {
                let mode = Arc::clone(&mode);
                let ledger = Arc::clone(&ledger);
                let expectations = Arc::clone(&expectations);
                let ready_queue = ready_queue.clone();
                scope.spawn(move |_| {
                    run_build_task(mode.as_ref(), action, &ledger, expectations.as_ref(), &ready_queue);
                });
            }
        });
    }
}

impl Default for BuilderPool {
    fn default() -> Self {
        Self::new()
    }
}
