// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end build-and-run scenarios driving a real [`Driver`] against a
//! scripted [`Mode`] and a real TCP connection to its monitor listener,
//! in the manner of `testrunner`'s `tests/basic.rs` exercising the whole
//! CLI surface against real fixtures (here, fixtures are scripted rather
//! than compiled, since no real child binaries exist to run).

use action_driver::action::{Action, ActionKind};
use action_driver::config::DriverConfig;
use action_driver::expectation::{Expectation, InMemoryExpectationStore};
use action_driver::finder::{ActionFinder, DiscoveredAction};
use action_driver::mode::{Command, CommandFailure, Mode, RunningCommand};
use action_driver::orchestrator::Driver;
use action_driver::outcome::{Outcome, OutcomeResult};
use action_driver::reporter::Color;
use anyhow::Result;
use camino::Utf8PathBuf;
use maplit::hashmap;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// One scripted action's behavior: what the "child process" sends over
/// its monitor connection, and how its fake exit status resolves.
#[derive(Clone)]
enum Script {
    /// Connects, reports one outcome, says DONE, exits zero.
    ReportsAndCompletes { result: OutcomeResult },
    /// Never connects and never exits on its own; only [`RunningCommand::destroy`]
    /// makes its `wait()` return.
    HangsUntilKilled,
    /// Connects, renews via an early informational outcome, sleeps past
    /// the action's nominal timeout, then reports the real outcome and
    /// completes before the kill-timer's grace period elapses.
    RenewsThenCompletes { result: OutcomeResult },
    /// The build step itself fails unexpectedly (not a graceful
    /// COMPILE_FAILED outcome) and the action is never enqueued.
    FailsToBuild,
}

struct ScriptedMode {
    scripts: HashMap<String, Script>,
    build_failures: Arc<Mutex<Vec<String>>>,
}

impl ScriptedMode {
    fn new(scripts: HashMap<String, Script>) -> Self {
        Self {
            scripts,
            build_failures: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Mode for ScriptedMode {
    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    fn build_and_install(&self, action: &Action) -> Result<Option<Outcome>> {
        match self.scripts.get(&action.name) {
            Some(Script::FailsToBuild) => {
                self.build_failures.lock().unwrap().push(action.name.clone());
                anyhow::bail!("simulated unexpected build failure for {}", action.name);
            }
            _ => Ok(None),
        }
    }

    fn create_action_command(&self, action: &Action, monitor_port: u16) -> Result<Box<dyn Command>> {
        let script = self
            .scripts
            .get(&action.name)
            .cloned()
            .unwrap_or(Script::ReportsAndCompletes {
                result: OutcomeResult::Success,
            });
        Ok(Box::new(ScriptedCommand {
            name: action.name.clone(),
            monitor_port,
            script,
        }))
    }

    fn cleanup(&self, _action: &Action) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn classpath(&self) -> Vec<Utf8PathBuf> {
        Vec::new()
    }
}

struct ScriptedCommand {
    name: String,
    monitor_port: u16,
    script: Script,
}

impl Command for ScriptedCommand {
    fn start(self: Box<Self>) -> Result<Box<dyn RunningCommand>> {
        let killed = Arc::new(AtomicBool::new(false));
        let name = self.name.clone();
        let monitor_port = self.monitor_port;
        let script = self.script.clone();
        let killed_for_child = Arc::clone(&killed);

        thread::spawn(move || run_scripted_child(&name, monitor_port, script, killed_for_child));

        Ok(Box::new(ScriptedRunningCommand { killed }))
    }
}

struct ScriptedRunningCommand {
    killed: Arc<AtomicBool>,
}

impl RunningCommand for ScriptedRunningCommand {
    fn wait(&self) -> Result<(), CommandFailure> {
        loop {
            if self.killed.load(Ordering::SeqCst) {
                return Err(CommandFailure {
                    output_lines: vec!["killed by supervisor".to_string()],
                    message: "child killed".to_string(),
                });
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    fn destroy(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }
}

fn run_scripted_child(name: &str, monitor_port: u16, script: Script, killed: Arc<AtomicBool>) {
    match script {
        Script::ReportsAndCompletes { result } => {
            thread::sleep(Duration::from_millis(30));
            if let Ok(mut stream) = TcpStream::connect(("127.0.0.1", monitor_port)) {
                let _ = writeln!(stream, "OUTCOME {name} {result} 1");
                let _ = writeln!(stream, "DONE");
            }
            killed.store(true, Ordering::SeqCst);
        }
        Script::RenewsThenCompletes { result } => {
            thread::sleep(Duration::from_millis(30));
            if let Ok(mut stream) = TcpStream::connect(("127.0.0.1", monitor_port)) {
                let _ = writeln!(stream, "OUTCOME {name}#progress SUCCESS 0");
                thread::sleep(Duration::from_millis(250));
                let _ = writeln!(stream, "OUTCOME {name} {result} 1");
                let _ = writeln!(stream, "DONE");
            }
            killed.store(true, Ordering::SeqCst);
        }
        Script::HangsUntilKilled => {
            // Never connects; the monitor listener's own accept timeout
            // and the kill-timer race to notice.
        }
        Script::FailsToBuild => unreachable!("build-failing actions never reach create_action_command"),
    }
}

struct FixedActionFinder {
    actions: Vec<DiscoveredAction>,
}

impl ActionFinder for FixedActionFinder {
    fn find(&self, _files: &[Utf8PathBuf], _class_names: &[String]) -> Vec<DiscoveredAction> {
        self.actions
            .iter()
            .map(|d| DiscoveredAction {
                action: d.action.clone(),
                early_outcome: d.early_outcome.clone(),
            })
            .collect()
    }
}

/// `base_port` keeps each test's monitor listeners on a disjoint range:
/// tests run concurrently by default, and `num_runner_threads = 2` means
/// each one binds two ports.
fn test_config(local_temp: &std::path::Path, base_port: u16) -> DriverConfig {
    let mut config = DriverConfig::default();
    config.local_temp = Utf8PathBuf::from_path_buf(local_temp.to_path_buf()).unwrap();
    config.num_runner_threads = 2;
    config.first_monitor_port = base_port;
    config.default_monitor_port = base_port;
    config.small_timeout = Duration::from_millis(150);
    config.large_timeout = Duration::from_millis(150);
    config.monitor_timeout = Duration::from_millis(500);
    config.starvation_timeout = Duration::from_millis(400);
    config
}

fn run_scenario_with_config(
    config: DriverConfig,
    scripts: HashMap<String, Script>,
    actions: Vec<DiscoveredAction>,
    expectations: InMemoryExpectationStore,
) -> action_driver::ledger::LedgerSnapshot {
    let driver = Driver::new(
        config,
        Box::new(ScriptedMode::new(scripts)),
        Box::new(FixedActionFinder { actions }),
        Box::new(expectations),
        Color::Never,
        None,
    );
    driver.build_and_run(&[], &[]).expect("build_and_run should succeed")
}

fn run_scenario(
    base_port: u16,
    scripts: HashMap<String, Script>,
    actions: Vec<DiscoveredAction>,
    expectations: InMemoryExpectationStore,
) -> action_driver::ledger::LedgerSnapshot {
    let dir = tempfile::tempdir().unwrap();
    run_scenario_with_config(test_config(dir.path(), base_port), scripts, actions, expectations)
}

#[test]
fn happy_path_reports_success() {
    let scripts = hashmap! {
        "happy".to_string() => Script::ReportsAndCompletes { result: OutcomeResult::Success },
    };
    let actions = vec![DiscoveredAction {
        action: Action::new("happy", "happy"),
        early_outcome: None,
    }];

    let snapshot = run_scenario(39000, scripts, actions, InMemoryExpectationStore::new());
    assert_eq!(snapshot.successes, 1);
    assert_eq!(snapshot.failures, 0);
    assert_eq!(snapshot.outcomes[0].result, OutcomeResult::Success);
}

#[test]
fn expectation_mismatch_counts_as_failure() {
    let mut scripts = HashMap::new();
    scripts.insert(
        "mismatch".to_string(),
        Script::ReportsAndCompletes {
            result: OutcomeResult::ExecFailed,
        },
    );
    let actions = vec![DiscoveredAction {
        action: Action::new("mismatch", "mismatch"),
        early_outcome: None,
    }];

    // Default expectation store expects SUCCESS; the action reports
    // EXEC_FAILED, so this must be classified as a failure.
    let snapshot = run_scenario(39010, scripts, actions, InMemoryExpectationStore::new());
    assert_eq!(snapshot.failures, 1);
    assert_eq!(snapshot.failure_names, vec!["mismatch".to_string()]);
}

#[test]
fn unsupported_action_short_circuits() {
    let mut action = Action::new("weird", "weird");
    action.action_kind = ActionKind::Unsupported;
    let actions = vec![DiscoveredAction {
        action,
        early_outcome: Some(Outcome::unsupported("weird", "runner spec rejects this class")),
    }];

    // No script registered for "weird": if the builder or runner stage
    // ever touched it, `create_action_command` would fall back to a
    // default success script and the test below would fail instead of
    // asserting on the short-circuit path directly.
    let snapshot = run_scenario(39020, HashMap::new(), actions, InMemoryExpectationStore::new());
    assert_eq!(snapshot.total(), 1);
    assert_eq!(snapshot.outcomes[0].result, OutcomeResult::Unsupported);
    assert_eq!(snapshot.successes, 0);
    assert_eq!(snapshot.failures, 0);
}

#[test]
fn kill_timer_renewal_keeps_a_slow_action_alive() {
    let mut scripts = HashMap::new();
    scripts.insert(
        "slow".to_string(),
        Script::RenewsThenCompletes {
            result: OutcomeResult::Success,
        },
    );
    let actions = vec![DiscoveredAction {
        action: Action::new("slow", "slow"),
        early_outcome: None,
    }];

    // The action's nominal timeout (150ms) is shorter than the 250ms it
    // actually takes; without renewal the kill-timer would fire first.
    let snapshot = run_scenario(39030, scripts, actions, InMemoryExpectationStore::new());
    assert_eq!(snapshot.successes, 1);
    assert_eq!(snapshot.outcomes[0].result, OutcomeResult::Success);
}

#[test]
fn a_hung_action_is_killed_and_recorded_as_timeout() {
    let mut scripts = HashMap::new();
    scripts.insert("stuck".to_string(), Script::HangsUntilKilled);
    let actions = vec![DiscoveredAction {
        action: Action::new("stuck", "stuck"),
        early_outcome: None,
    }];

    let mut expectations = InMemoryExpectationStore::new();
    expectations.insert("stuck", Expectation::new(OutcomeResult::ExecTimeout, []));

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), 39040);
    // Longer than `small_timeout` (150ms) plus the kill-timer's 2s grace,
    // so the kill-timer fires and classifies this as EXEC_TIMEOUT before
    // the monitor listener itself would give up accepting a connection.
    config.monitor_timeout = Duration::from_secs(3);
    let snapshot = run_scenario_with_config(config, scripts, actions, expectations);
    assert_eq!(snapshot.outcomes[0].result, OutcomeResult::ExecTimeout);
    assert_eq!(snapshot.successes, 1, "matches the EXEC_TIMEOUT expectation above");
}

#[test]
fn a_build_failure_starves_its_runner_slot_without_blocking_other_actions() {
    let mut scripts = HashMap::new();
    scripts.insert("broken".to_string(), Script::FailsToBuild);
    scripts.insert(
        "fine".to_string(),
        Script::ReportsAndCompletes {
            result: OutcomeResult::Success,
        },
    );
    let actions = vec![
        DiscoveredAction {
            action: Action::new("broken", "broken"),
            early_outcome: None,
        },
        DiscoveredAction {
            action: Action::new("fine", "fine"),
            early_outcome: None,
        },
    ];

    let snapshot = run_scenario(39050, scripts, actions, InMemoryExpectationStore::new());
    // "broken" never reaches the ledger at all: its build task returned
    // Err and was never enqueued for a runner to pick up.
    assert!(snapshot.outcomes.iter().all(|o| o.name != "broken"));
    assert!(snapshot.outcomes.iter().any(|o| o.name == "fine" && o.result == OutcomeResult::Success));
}

#[test]
fn premature_builder_exhaustion_records_a_driver_level_error() {
    // Only one of the two discovered actions ever builds successfully; the
    // other's build task fails unexpectedly and is never enqueued, so the
    // runner pool waits past its starvation window for a second item that
    // never arrives.
    let scripts = hashmap! {
        "first".to_string() => Script::ReportsAndCompletes { result: OutcomeResult::Success },
        "second".to_string() => Script::FailsToBuild,
    };
    let actions = vec![
        DiscoveredAction {
            action: Action::new("first", "first"),
            early_outcome: None,
        },
        DiscoveredAction {
            action: Action::new("second", "second"),
            early_outcome: None,
        },
    ];

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), 39060);
    config.num_runner_threads = 1;
    config.starvation_timeout = Duration::from_millis(100);
    let snapshot = run_scenario_with_config(config, scripts, actions, InMemoryExpectationStore::new());

    let driver_error = snapshot
        .outcomes
        .iter()
        .find(|o| o.name == "driver")
        .expect("a driver-level ERROR outcome should be recorded");
    assert_eq!(driver_error.result, OutcomeResult::Error);
    assert!(driver_error.output_lines[0].contains("Expected 2 actions but found fewer"));
}
