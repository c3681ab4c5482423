// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The single shared kill-timer service: a renewable, per-action deadline
//! that forcibly terminates a child on expiry.
//!
//! `spec.md` §4.5 models this as a timer that, on firing, rechecks the
//! current deadline and reschedules if it moved rather than cancelling and
//! re-arming a fresh timer task on every progress event. A single
//! background thread parked on a min-heap of deadlines implements that
//! directly.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Instant;

type FireCallback = Box<dyn FnOnce() + Send>;

struct Entry {
    deadline: Instant,
    callback: Option<FireCallback>,
}

struct State {
    entries: HashMap<u64, Entry>,
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    shutdown: bool,
}

/// A handle to one armed deadline. Dropping it does not cancel the timer;
/// call [`KillTimer::cancel`] explicitly.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TimerId(u64);

/// The daemon timer service. One instance is owned by the Driver for the
/// lifetime of a `build_and_run` call.
pub struct KillTimer {
    state: Arc<(Mutex<State>, Condvar)>,
    next_id: AtomicU64,
    thread: Option<thread::JoinHandle<()>>,
}

impl KillTimer {
    pub fn new() -> Self {
        let state = Arc::new((
            Mutex::new(State {
                entries: HashMap::new(),
                heap: BinaryHeap::new(),
                shutdown: false,
            }),
            Condvar::new(),
        ));

        let worker_state = Arc::clone(&state);
        let thread = thread::Builder::new()
            .name("kill-timer".to_string())
            .spawn(move || Self::run(worker_state))
            .expect("kill-timer thread should spawn");

        Self {
            state,
            next_id: AtomicU64::new(1),
            thread: Some(thread),
        }
    }

    /// Arms a new deadline. `on_fire` runs on the timer thread when the
    /// deadline is reached without a renewal pushing it later, or a
    /// cancellation removing it first.
    pub fn arm(&self, deadline: Instant, on_fire: impl FnOnce() + Send + 'static) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (mutex, condvar) = &*self.state;
        let mut state = mutex.lock().expect("kill-timer mutex poisoned");
        state.entries.insert(
            id,
            Entry {
                deadline,
                callback: Some(Box::new(on_fire)),
            },
        );
        state.heap.push(Reverse((deadline, id)));
        condvar.notify_one();
        TimerId(id)
    }

    /// Pushes a deadline forward. No-op if the timer already fired or was
    /// cancelled.
    pub fn renew(&self, id: TimerId, new_deadline: Instant) {
        let (mutex, condvar) = &*self.state;
        let mut state = mutex.lock().expect("kill-timer mutex poisoned");
        if let Some(entry) = state.entries.get_mut(&id.0) {
            entry.deadline = new_deadline;
            state.heap.push(Reverse((new_deadline, id.0)));
            condvar.notify_one();
        }
    }

    /// Cancels a deadline before it fires. Safe to call after it has
    /// already fired (no-op).
    pub fn cancel(&self, id: TimerId) {
        let (mutex, _condvar) = &*self.state;
        let mut state = mutex.lock().expect("kill-timer mutex poisoned");
        state.entries.remove(&id.0);
    }

    fn run(state: Arc<(Mutex<State>, Condvar)>) {
        let (mutex, condvar) = &*state;
        let mut guard = mutex.lock().expect("kill-timer mutex poisoned");
        loop {
            if guard.shutdown {
                return;
            }

            let Some(&Reverse((deadline, id))) = guard.heap.peek() else {
                guard = condvar.wait(guard).expect("kill-timer mutex poisoned");
                continue;
            };

            let now = Instant::now();
            if deadline > now {
                let wait_for = deadline - now;
                let (g, _timeout) = condvar
                    .wait_timeout(guard, wait_for)
                    .expect("kill-timer mutex poisoned");
                guard = g;
                continue;
            }

            guard.heap.pop();
            let Some(entry) = guard.entries.get(&id) else {
                // Cancelled between scheduling and firing.
                continue;
            };
            if entry.deadline != deadline {
                // A progress event pushed the deadline later; the stale
                // heap entry is discarded and a fresh one already exists.
                continue;
            }

            let callback = guard
                .entries
                .remove(&id)
                .and_then(|entry| entry.callback)
                .expect("entry must carry a callback at fire time");

            // Run the callback without holding the lock so it can freely
            // call back into `arm`/`renew`/`cancel`.
            drop(guard);
            callback();
            guard = mutex.lock().expect("kill-timer mutex poisoned");
        }
    }
}

impl Default for KillTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KillTimer {
    fn drop(&mut self) {
        let (mutex, condvar) = &*self.state;
        {
            let mut state = mutex.lock().expect("kill-timer mutex poisoned");
            state.shutdown = true;
        }
        condvar.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
