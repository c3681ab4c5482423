// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-runner monitor listener: accepts one connection from an
//! action's child process and streams outcome/output events out of it.
//!
//! `spec.md` §4.6 deliberately leaves the wire format unspecified beyond
//! its framing semantics ("a simple length-prefixed or line-delimited
//! text protocol"). This crate picks a newline-delimited, tag-prefixed
//! text protocol, documented in `SPEC_FULL.md` §4.9:
//!
//! ```text
//! OUTCOME <name> <result> <matters 0|1>
//! OUTPUT <name> <line...>
//! DONE
//! ```

use crate::outcome::{Outcome, OutcomeResult};
use anyhow::{anyhow, bail, Result};
use std::io::{self, BufRead, BufReader};
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

/// Callbacks invoked on the consuming thread as frames arrive, in the
/// order they were delivered.
pub trait MonitorHandler {
    /// A raw stdout/stderr line from the child, attributed to the given
    /// outcome name. Must not have side effects on the ledger or the
    /// kill-timer.
    fn output(&mut self, outcome_name: &str, line: &str);

    /// A completed outcome. Implementations renew the kill-timer here.
    fn outcome(&mut self, outcome: Outcome);
}

/// External contract: accept exactly one connection within a bounded
/// window and drive a [`MonitorHandler`] from it.
pub trait MonitorListener: Send + Sync {
    /// Returns `true` if the stream ended cleanly (a `DONE` frame was
    /// read), `false` on accept timeout, connection loss, or protocol
    /// error recoverable enough to just mean "the run didn't finish".
    fn monitor(&self, port: u16, handler: &mut dyn MonitorHandler) -> Result<bool>;
}

/// A TCP implementation of [`MonitorListener`] speaking the line protocol
/// above.
pub struct TcpMonitorListener {
    accept_timeout: Duration,
    poll_interval: Duration,
}

impl TcpMonitorListener {
    pub fn new(accept_timeout: Duration) -> Self {
        Self {
            accept_timeout,
            poll_interval: Duration::from_millis(20),
        }
    }
}

impl MonitorListener for TcpMonitorListener {
    fn monitor(&self, port: u16, handler: &mut dyn MonitorHandler) -> Result<bool> {
        let listener = TcpListener::bind(("127.0.0.1", port))?;
        listener.set_nonblocking(true)?;

        let deadline = Instant::now() + self.accept_timeout;
        let stream = loop {
            match listener.accept() {
                Ok((stream, _addr)) => break stream,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Ok(false);
                    }
                    thread::sleep(self.poll_interval);
                }
                Err(err) => return Err(err.into()),
            }
        };
        stream.set_nonblocking(false)?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                // Connection dropped before a DONE frame.
                return Ok(false);
            }
            let frame = line.trim_end_matches(['\r', '\n']);
            if frame == "DONE" {
                return Ok(true);
            } else if let Some(rest) = frame.strip_prefix("OUTPUT ") {
                let mut parts = rest.splitn(2, ' ');
                let name = parts.next().unwrap_or_default();
                let text = parts.next().unwrap_or_default();
                handler.output(name, text);
            } else if let Some(rest) = frame.strip_prefix("OUTCOME ") {
                handler.outcome(parse_outcome_frame(rest)?);
            } else if frame.is_empty() {
                continue;
            } else {
                bail!("unrecognized monitor frame: {frame:?}");
            }
        }
    }
}

fn parse_outcome_frame(rest: &str) -> Result<Outcome> {
    let mut parts = rest.splitn(3, ' ');
    let name = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("OUTCOME frame missing name"))?;
    let result = parts
        .next()
        .ok_or_else(|| anyhow!("OUTCOME frame missing result"))
        .and_then(parse_result)?;
    let matters = parts.next().map(|s| s != "0").unwrap_or(true);
    Ok(Outcome {
        name: name.to_string(),
        result,
        output_lines: Vec::new(),
        matters,
    })
}

fn parse_result(s: &str) -> Result<OutcomeResult> {
    Ok(match s {
        "SUCCESS" => OutcomeResult::Success,
        "EXEC_FAILED" => OutcomeResult::ExecFailed,
        "EXEC_TIMEOUT" => OutcomeResult::ExecTimeout,
        "COMPILE_FAILED" => OutcomeResult::CompileFailed,
        "ERROR" => OutcomeResult::Error,
        "UNSUPPORTED" => OutcomeResult::Unsupported,
        other => bail!("unrecognized outcome result: {other:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpStream;

    struct RecordingHandler {
        outputs: Vec<(String, String)>,
        outcomes: Vec<Outcome>,
    }

    impl MonitorHandler for RecordingHandler {
        fn output(&mut self, name: &str, line: &str) {
            self.outputs.push((name.to_string(), line.to_string()));
        }
        fn outcome(&mut self, outcome: Outcome) {
            self.outcomes.push(outcome);
        }
    }

    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn reads_outcome_and_output_then_done() {
        let port = free_port();
        let listener = TcpMonitorListener::new(Duration::from_secs(2));
        let client = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            let frames = indoc::indoc! {"
                OUTPUT a running
                OUTCOME a SUCCESS 1
                DONE
            "};
            stream.write_all(frames.as_bytes()).unwrap();
        });

        let mut handler = RecordingHandler {
            outputs: vec![],
            outcomes: vec![],
        };
        let completed = listener.monitor(port, &mut handler).unwrap();
        client.join().unwrap();

        assert!(completed);
        assert_eq!(handler.outputs, vec![("a".to_string(), "running".to_string())]);
        assert_eq!(handler.outcomes.len(), 1);
        assert_eq!(handler.outcomes[0].result, OutcomeResult::Success);
    }

    #[test]
    fn accept_timeout_returns_false() {
        let port = free_port();
        let listener = TcpMonitorListener::new(Duration::from_millis(50));
        let mut handler = RecordingHandler {
            outputs: vec![],
            outcomes: vec![],
        };
        let completed = listener.monitor(port, &mut handler).unwrap();
        assert!(!completed);
    }

    #[test]
    fn dropped_connection_without_done_returns_false() {
        let port = free_port();
        let listener = TcpMonitorListener::new(Duration::from_secs(2));
        let client = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            drop(stream);
        });
        let mut handler = RecordingHandler {
            outputs: vec![],
            outcomes: vec![],
        };
        let completed = listener.monitor(port, &mut handler).unwrap();
        client.join().unwrap();
        assert!(!completed);
    }
}
