// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The driver orchestrator: `spec.md` §4.1's 12-step `buildAndRun`
//! algorithm. No close teacher analog exists for this top-level wiring;
//! it composes the builder pool, ready queue, runner pool, kill-timer
//! and monitor listener built up across the other modules.

use crate::action::ActionKind;
use crate::builder::BuilderPool;
use crate::classpath::ClassFileIndex;
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::expectation::ExpectationStore;
use crate::finder::ActionFinder;
use crate::kill_timer::KillTimer;
use crate::ledger::{Ledger, LedgerSnapshot};
use crate::mode::Mode;
use crate::monitor::{MonitorListener, TcpMonitorListener};
use crate::outcome::Outcome;
use crate::reporter::{Color, ReportEmitter};
use crate::runner::{RunnerContext, RunnerPool};
use anyhow::Result;
use camino::Utf8PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Owns one build-then-run cycle. `spec.md` §4.1 step 1: a `Driver` may
/// only be used once; a second call to [`Driver::build_and_run`] returns
/// [`DriverError::AlreadyUsed`].
pub struct Driver {
    config: DriverConfig,
    mode: Arc<dyn Mode>,
    finder: Box<dyn ActionFinder>,
    expectations: Arc<dyn ExpectationStore>,
    color: Color,
    junit_path: Option<Utf8PathBuf>,
    class_file_index: Option<Arc<dyn ClassFileIndex>>,
    used: AtomicBool,
}

impl Driver {
    pub fn new(
        config: DriverConfig,
        mode: Box<dyn Mode>,
        finder: Box<dyn ActionFinder>,
        expectations: Box<dyn ExpectationStore>,
        color: Color,
        junit_path: Option<Utf8PathBuf>,
    ) -> Self {
        Self {
            config,
            mode: Arc::from(mode),
            finder,
            expectations: Arc::from(expectations),
            color,
            junit_path,
            class_file_index: None,
            used: AtomicBool::new(false),
        }
    }

    /// Attaches a classpath-suggestion index, consulted for
    /// `COMPILE_FAILED`/`EXEC_FAILED` outcomes in the final summary.
    pub fn with_class_file_index(mut self, index: Arc<dyn ClassFileIndex>) -> Self {
        self.class_file_index = Some(index);
        self
    }

    /// Discovers actions under `roots`/`classes`, builds and runs them,
    /// and returns the final ledger snapshot after the report has been
    /// emitted.
    pub fn build_and_run(&self, roots: &[Utf8PathBuf], classes: &[String]) -> Result<LedgerSnapshot> {
        if self.used.swap(true, Ordering::SeqCst) {
            return Err(DriverError::AlreadyUsed.into());
        }

        std::fs::create_dir_all(self.config.local_temp.as_std_path()).map_err(|source| DriverError::Mkdir {
            path: self.config.local_temp.clone(),
            source,
        })?;

        self.mode.prepare().map_err(DriverError::Prepare)?;

        let ledger = Arc::new(Ledger::new());

        let discovered = self.finder.find(roots, classes);
        let mut buildable = Vec::new();
        for item in discovered {
            let expectation = self.expectations.get(&item.action.name);
            if item.action.action_kind == ActionKind::Unsupported {
                let outcome = item
                    .early_outcome
                    .unwrap_or_else(|| Outcome::unsupported(item.action.name.clone(), "action rejected by its runner spec"));
                ledger.record(outcome, &expectation);
                continue;
            }
            if let Some(outcome) = item.early_outcome {
                ledger.record(outcome, &expectation);
                continue;
            }
            buildable.push(item.action);
        }

        let total_to_run = buildable.len();
        info!(total_to_run, "discovered actions ready to build");

        if total_to_run > 0 {
            let starved = self.drive_pipeline(Arc::clone(&ledger), Arc::clone(&self.expectations), buildable, total_to_run)?;
            if starved {
                // `spec.md` §4.1 step 9: a driver-level ERROR outcome, not
                // tied to any one action, recording that the runner pool
                // gave up waiting for more work than actually arrived.
                let message = format!("Expected {total_to_run} actions but found fewer.");
                let expectation = self.expectations.get("driver");
                ledger.record(Outcome::with_message("driver", crate::outcome::OutcomeResult::Error, message), &expectation);
            }
        } else {
            info!("nothing to do: no actions were discovered");
        }

        let snapshot = ledger.snapshot();
        self.emit_report(&snapshot)?;
        self.mode.shutdown()?;
        Ok(snapshot)
    }

    /// Returns whether the starvation flag was set during this run.
    fn drive_pipeline(
        &self,
        ledger: Arc<Ledger>,
        expectations: Arc<dyn ExpectationStore>,
        buildable: Vec<crate::action::Action>,
        total_to_run: usize,
    ) -> Result<bool> {
        let num_runner_threads = self.config.num_runner_threads.max(1);
        // `spec.md` §5: the ready queue is bounded, providing backpressure
        // from the runner stage back to the builder stage.
        let queue_capacity = (num_runner_threads * 2).max(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(queue_capacity);

        let builder_pool = BuilderPool::new();
        let runner_pool = RunnerPool::new(num_runner_threads);
        let kill_timer = Arc::new(KillTimer::new());
        let monitor_listener: Arc<dyn MonitorListener> = Arc::new(TcpMonitorListener::new(self.config.monitor_timeout));
        let starvation_flag = Arc::new(AtomicBool::new(false));

        let context = RunnerContext {
            mode: Arc::clone(&self.mode),
            ledger: Arc::clone(&ledger),
            expectations: Arc::clone(&expectations),
            kill_timer: Arc::clone(&kill_timer),
            monitor_listener,
            config: Arc::new(self.config.clone()),
            starvation_flag: Arc::clone(&starvation_flag),
            ready_queue: ready_rx,
        };

        // Held until every runner thread has returned. `BuilderPool::build_all`
        // drops its own `Sender` clones as soon as each build task (including
        // an instantly-failing one) finishes, which can close the channel
        // well before `starvation_timeout` elapses. Without this sentinel a
        // starved runner would see `RecvTimeoutError::Disconnected` instead
        // of waiting out the timeout, and `starvation_flag` would never get
        // set — mirroring Java's `BlockingQueue.poll`, where the queue
        // itself never "disconnects", only ever reports empty.
        let sentinel_tx = ready_tx.clone();

        let mode = Arc::clone(&self.mode);
        std::thread::scope(|scope| {
            scope.spawn(move || {
                builder_pool.build_all(mode, ledger, expectations, buildable, ready_tx);
            });
            // Bounded at `spec.md` §4.1 step 8's 28-day constant: kept
            // named rather than configurable, per the spec's own open
            // question.
            scope.spawn(move || {
                runner_pool.run_all(context, total_to_run);
            });
        });
        drop(sentinel_tx);

        let starved = starvation_flag.load(Ordering::SeqCst);
        if starved {
            warn!("runner pool starved: some actions may not have been run");
        }

        Ok(starved)
    }

    fn emit_report(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let mut emitter = ReportEmitter::new(self.color, self.junit_path.clone(), "action-driver");
        if let Some(index) = &self.class_file_index {
            emitter = emitter.with_class_file_index(Arc::clone(index), self.mode.classpath());
        }
        emitter.emit(snapshot)
    }
}

/// The bound on the runner pool's overall wait, named rather than
/// configurable per `spec.md` §9's open question: 28 days is long enough
/// to be effectively infinite for any real CI run, while still being a
/// concrete, documented value rather than an unbounded wait.
pub const RUNNER_POOL_AWAIT_BOUND_DAYS: u64 = 28;
