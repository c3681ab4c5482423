// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-runner monitor port assignment, `spec.md` §4.8.

/// `port(runner_index, num_runners, first_port, default) -> u16`.
///
/// With a single runner thread, the caller-supplied `default` is used
/// instead of the formula (`spec.md` §3, `MonitorPort`, and the boundary
/// behavior in §8: "`numRunnerThreads = 1` ⇒ monitor port equals
/// `defaultValue`").
pub fn monitor_port_for(runner_index: usize, num_runners: usize, first_port: u16, default: u16) -> u16 {
    if num_runners <= 1 {
        return default;
    }
    first_port + (runner_index % num_runners) as u16
}
