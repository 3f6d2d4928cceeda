// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Clock and one-shot timer abstractions for the geofence scheduler.
//!
//! The scheduler never reads the wall clock directly; it is handed a
//! [`Clock`] and a [`TimerFactory`]. Production wiring uses the system pair
//! (one background thread per armed timer); simulations and tests use the
//! manual pair, where time only moves when the test advances it and due
//! timers fire deterministically, in deadline order.
//!
//! Cancellation only signals -- it never joins the timer thread. A timer
//! that already started firing may be blocked on the broadcaster lock, and
//! the canceller may well be holding that lock; the scheduler discards such
//! stale fires with its generation counter instead.

use crate::schedule::Timestamp;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Handle to one armed timer. Cancelling an already-fired timer is a no-op.
pub trait TimerHandle: Send {
    fn cancel(&self);
}

/// Arms one-shot timers.
pub trait TimerFactory: Send + Sync {
    /// Invoke `callback` once, at or after `deadline`. The callback runs on
    /// the factory's execution context, never on the caller's.
    fn arm_at(&self, deadline: Timestamp, callback: Box<dyn FnOnce() + Send>)
        -> Box<dyn TimerHandle>;
}

/// Wall-clock time as duration since the UNIX epoch.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::from_duration(since_epoch)
    }
}

struct SystemTimerState {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

struct SystemTimerHandle {
    state: Arc<SystemTimerState>,
}

impl TimerHandle for SystemTimerHandle {
    fn cancel(&self) {
        *self.state.cancelled.lock() = true;
        self.state.signal.notify_all();
    }
}

/// One thread per armed timer, sleeping on a condvar until the deadline or
/// cancellation.
#[derive(Debug, Default)]
pub struct SystemTimerFactory;

impl TimerFactory for SystemTimerFactory {
    fn arm_at(
        &self,
        deadline: Timestamp,
        callback: Box<dyn FnOnce() + Send>,
    ) -> Box<dyn TimerHandle> {
        let state = Arc::new(SystemTimerState {
            cancelled: Mutex::new(false),
            signal: Condvar::new(),
        });
        let thread_state = state.clone();
        let clock = SystemClock;

        std::thread::Builder::new()
            .name("rulecast-timer".to_string())
            .spawn(move || {
                let mut cancelled = thread_state.cancelled.lock();
                loop {
                    if *cancelled {
                        return;
                    }
                    let now = clock.now();
                    if now >= deadline {
                        break;
                    }
                    thread_state.signal.wait_for(&mut cancelled, deadline - now);
                }
                drop(cancelled);
                callback();
            })
            .expect("failed to spawn timer thread");

        Box::new(SystemTimerHandle { state })
    }
}

/// Production clock/timer pair.
pub fn system_timing() -> (Arc<SystemClock>, Arc<SystemTimerFactory>) {
    (Arc::new(SystemClock), Arc::new(SystemTimerFactory::default()))
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        ManualClock { now: Mutex::new(start) }
    }

    fn set(&self, t: Timestamp) {
        let mut now = self.now.lock();
        *now = (*now).max(t);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

struct ManualTimer {
    deadline: Timestamp,
    cancelled: Arc<AtomicBool>,
    callback: Box<dyn FnOnce() + Send>,
}

struct ManualTimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle for ManualTimerHandle {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Deterministic timer source driven by [`advance_to`](Self::advance_to).
pub struct ManualTimerFactory {
    clock: Arc<ManualClock>,
    armed: Mutex<Vec<ManualTimer>>,
}

impl ManualTimerFactory {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        ManualTimerFactory { clock, armed: Mutex::new(Vec::new()) }
    }

    /// Move the clock to `t`, firing every due timer in deadline order.
    ///
    /// Callbacks run with no factory lock held, so they may arm new timers;
    /// a newly armed timer that is already due fires within the same call.
    pub fn advance_to(&self, t: Timestamp) {
        loop {
            let due = {
                let mut armed = self.armed.lock();
                armed.retain(|timer| !timer.cancelled.load(Ordering::Acquire));
                let next = armed
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.deadline <= t)
                    .min_by_key(|(_, timer)| timer.deadline)
                    .map(|(i, _)| i);
                next.map(|i| armed.swap_remove(i))
            };
            let Some(timer) = due else { break };
            self.clock.set(timer.deadline);
            (timer.callback)();
        }
        self.clock.set(t);
    }

    /// Number of armed, not-yet-cancelled timers.
    pub fn pending(&self) -> usize {
        let mut armed = self.armed.lock();
        armed.retain(|timer| !timer.cancelled.load(Ordering::Acquire));
        armed.len()
    }
}

impl TimerFactory for ManualTimerFactory {
    fn arm_at(
        &self,
        deadline: Timestamp,
        callback: Box<dyn FnOnce() + Send>,
    ) -> Box<dyn TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.armed.lock().push(ManualTimer {
            deadline,
            cancelled: cancelled.clone(),
            callback,
        });
        Box::new(ManualTimerHandle { cancelled })
    }
}

/// Deterministic clock/timer pair starting at `start`.
pub fn manual_timing(start: Timestamp) -> (Arc<ManualClock>, Arc<ManualTimerFactory>) {
    let clock = Arc::new(ManualClock::new(start));
    let factory = Arc::new(ManualTimerFactory::new(clock.clone()));
    (clock, factory)
}
