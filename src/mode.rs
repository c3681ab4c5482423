// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `Mode` and `Command` collaborator contracts, plus `LocalMode`, the
//! one concrete backend this crate ships (a device/VM `Mode` is a
//! possible future implementation; the trait boundary is where it would
//! plug in, per `spec.md` §6).

use crate::action::Action;
use crate::outcome::Outcome;
use anyhow::Result;
use camino::Utf8PathBuf;
use duct::cmd;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A failed command execution: the captured combined output, for
/// inclusion in a diagnostic `Outcome`.
#[derive(Clone, Debug)]
pub struct CommandFailure {
    pub output_lines: Vec<String>,
    pub message: String,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CommandFailure {}

/// A started child process. `destroy` must be safe to call more than
/// once and after the child has already exited.
pub trait RunningCommand: Send + Sync {
    /// Blocks the calling thread until the child exits. `Ok(())` for a
    /// zero exit status; all outcome reporting for a successful run
    /// happens out-of-band via the monitor listener, not here.
    fn wait(&self) -> Result<(), CommandFailure>;

    /// Idempotent: terminates the child if still running, otherwise a
    /// no-op.
    fn destroy(&self);
}

/// A not-yet-started command, built by [`Mode::create_action_command`].
pub trait Command: Send {
    fn start(self: Box<Self>) -> Result<Box<dyn RunningCommand>>;
}

/// The pluggable execution-environment backend: local host, remote
/// device, emulator, etc. `spec.md` §6 places everything but the trait
/// boundary itself out of core scope; `LocalMode` below is the one
/// concrete implementation this crate carries.
pub trait Mode: Send + Sync {
    fn prepare(&self) -> Result<()>;

    /// `Ok(Some(outcome))` short-circuits the action (typically
    /// `CompileFailed` or `Unsupported`); `Ok(None)` means the action
    /// built and installed cleanly and should proceed to the runner
    /// stage.
    fn build_and_install(&self, action: &Action) -> Result<Option<Outcome>>;

    fn create_action_command(&self, action: &Action, monitor_port: u16) -> Result<Box<dyn Command>>;

    fn cleanup(&self, action: &Action) -> Result<()>;

    fn shutdown(&self) -> Result<()>;

    fn classpath(&self) -> Vec<Utf8PathBuf>;
}

/// Runs each action's command as a plain child process on the local
/// host, in the manner of `testrunner::runner::TestRunner::run_test`'s
/// direct use of `duct`.
pub struct LocalMode {
    build_command: Option<Vec<String>>,
}

impl LocalMode {
    /// `build_command`, when set, is invoked (via a shell) for any
    /// action carrying a `source_path`; a non-zero exit becomes
    /// `OutcomeResult::CompileFailed`. When `None`, every action is
    /// treated as already built.
    pub fn new(build_command: Option<Vec<String>>) -> Self {
        Self { build_command }
    }
}

impl Mode for LocalMode {
    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    fn build_and_install(&self, action: &Action) -> Result<Option<Outcome>> {
        use crate::outcome::OutcomeResult;

        let Some(source_path) = &action.source_path else {
            return Ok(None);
        };
        let Some(build_command) = &self.build_command else {
            return Ok(None);
        };
        let Some((program, args)) = build_command.split_first() else {
            return Ok(None);
        };

        let expr = cmd(AsRef::<Path>::as_ref(program), args)
            .dir(source_path.parent().unwrap_or(source_path))
            .stdout_capture()
            .stderr_capture()
            .unchecked();
        let output = expr.run()?;
        if output.status.success() {
            Ok(None)
        } else {
            let mut lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::to_string)
                .collect();
            lines.extend(String::from_utf8_lossy(&output.stderr).lines().map(str::to_string));
            Ok(Some(Outcome {
                name: action.name.clone(),
                result: OutcomeResult::CompileFailed,
                output_lines: lines,
                matters: true,
            }))
        }
    }

    fn create_action_command(&self, action: &Action, monitor_port: u16) -> Result<Box<dyn Command>> {
        Ok(Box::new(LocalCommand {
            binary: action.qualified_class_name.clone(),
            args: action
                .runner_spec
                .init_args
                .iter()
                .cloned()
                .chain(["--monitor-port".to_string(), monitor_port.to_string()])
                .collect(),
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

struct LocalCommand {
    binary: String,
    args: Vec<String>,
}

impl Command for LocalCommand {
    fn start(self: Box<Self>) -> Result<Box<dyn RunningCommand>> {
        let expr = cmd(AsRef::<Path>::as_ref(&self.binary), &self.args)
            .stdout_capture()
            .stderr_capture()
            .unchecked();
        let handle = expr.start()?;
        Ok(Box::new(LocalRunningCommand {
            handle: Arc::new(handle),
        }))
    }
}

struct LocalRunningCommand {
    handle: Arc<duct::Handle>,
}

impl RunningCommand for LocalRunningCommand {
    fn wait(&self) -> Result<(), CommandFailure> {
        let output = self.handle.wait().map_err(|err| CommandFailure {
            output_lines: Vec::new(),
            message: err.to_string(),
        })?;
        if output.status.success() {
            Ok(())
        } else {
            let mut lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::to_string)
                .collect();
            lines.extend(String::from_utf8_lossy(&output.stderr).lines().map(str::to_string));
            Err(CommandFailure {
                message: format!("child exited with {}", output.status),
                output_lines: lines,
            })
        }
    }

    fn destroy(&self) {
        // duct's kill() errors if the process has already exited; that's
        // exactly the idempotent behavior this contract requires.
        let _ = self.handle.kill();
    }
}
