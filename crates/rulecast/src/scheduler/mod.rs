// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Geofence activation/deactivation scheduling.
//!
//! Each scheduled geofence walks `PENDING -> ACTIVE -> PENDING -> ... ->
//! EXPIRED`, driven by exactly one armed timer at a time: the timer is set
//! to the schedule's next transition, and every fire re-evaluates the
//! schedule against the injected clock and re-arms. A fire that arrives
//! early (timer jitter) transitions nothing and simply re-arms, so a missed
//! or misfired timer self-corrects at the next recomputation.
//!
//! Scheduling an id that is already tracked supersedes the previous
//! instance: its timer is cancelled and a bumped generation counter makes
//! any in-flight fire of the old instance a no-op.
//!
//! # Locking
//!
//! The scheduler's internal bookkeeping lock is *never* held while the
//! activation/deactivation callbacks run. Callers (the broadcaster) invoke
//! `schedule` while holding their own lock and the callbacks re-enter that
//! same lock, so the only permitted order is caller lock -> scheduler lock.

pub mod timer;

use crate::geofence::GeofenceRecord;
use crate::schedule::{Schedule, Timestamp};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use timer::{Clock, TimerFactory, TimerHandle};
use uuid::Uuid;

/// A geofence record shared between the scheduler and the callbacks that
/// patch the map. Locked only under the broadcaster's lock (callbacks) or
/// transiently by the scheduler itself.
pub type SharedRecord = Arc<Mutex<GeofenceRecord>>;

/// Activation/deactivation callback.
pub type GeofenceCallback = Box<dyn Fn(&SharedRecord) + Send + Sync>;

/// Lifecycle state of a tracked geofence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeofenceState {
    Pending,
    Active,
    Expired,
}

struct TrackedGeofence {
    record: SharedRecord,
    schedule: Schedule,
    state: GeofenceState,
    generation: u64,
    timer: Option<Box<dyn TimerHandle>>,
}

#[derive(Default)]
struct SchedulerInner {
    tracked: HashMap<Uuid, TrackedGeofence>,
    next_generation: u64,
}

/// Owns the tracked geofences and their timers.
pub struct GeofenceScheduler {
    clock: Arc<dyn Clock>,
    timers: Arc<dyn TimerFactory>,
    /// Self-reference for the timer closures; set once by `new`.
    weak_self: Weak<GeofenceScheduler>,
    inner: Mutex<SchedulerInner>,
    on_active: ArcSwapOption<GeofenceCallback>,
    on_inactive: ArcSwapOption<GeofenceCallback>,
}

impl GeofenceScheduler {
    pub fn new(clock: Arc<dyn Clock>, timers: Arc<dyn TimerFactory>) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| GeofenceScheduler {
            clock,
            timers,
            weak_self: weak_self.clone(),
            inner: Mutex::new(SchedulerInner::default()),
            on_active: ArcSwapOption::empty(),
            on_inactive: ArcSwapOption::empty(),
        })
    }

    /// Register the callback fired when a geofence becomes active.
    pub fn on_geofence_active<F>(&self, callback: F)
    where
        F: Fn(&SharedRecord) + Send + Sync + 'static,
    {
        let callback: GeofenceCallback = Box::new(callback);
        self.on_active.store(Some(Arc::new(callback)));
    }

    /// Register the callback fired when a geofence becomes inactive.
    pub fn on_geofence_inactive<F>(&self, callback: F)
    where
        F: Fn(&SharedRecord) + Send + Sync + 'static,
    {
        let callback: GeofenceCallback = Box::new(callback);
        self.on_inactive.store(Some(Arc::new(callback)));
    }

    /// Start (or restart) tracking `record`.
    ///
    /// A record whose schedule is already exhausted is dropped with a
    /// warning; scheduling an id that is already tracked cancels the
    /// previous instance's timer before arming the new one.
    pub fn schedule(&self, record: GeofenceRecord) {
        let id = record.id;
        let now = self.clock.now();

        // wake immediately when scheduled inside an active window, so the
        // activation still fires (on the timer context, not the caller's)
        let deadline = if record.schedule.is_active_at(now) {
            now
        } else {
            match record.schedule.next_transition(now) {
                Some((when, _)) => when,
                None => {
                    log::warn!("[scheduler] geofence {} is already expired, dropping", id);
                    let mut inner = self.inner.lock();
                    if let Some(old) = inner.tracked.remove(&id) {
                        if let Some(old_timer) = old.timer {
                            old_timer.cancel();
                        }
                    }
                    return;
                }
            }
        };

        let mut inner = self.inner.lock();
        inner.next_generation += 1;
        let generation = inner.next_generation;

        let schedule = record.schedule.clone();
        let previous = inner.tracked.insert(
            id,
            TrackedGeofence {
                record: Arc::new(Mutex::new(record)),
                schedule,
                state: GeofenceState::Pending,
                generation,
                timer: None,
            },
        );
        if let Some(old) = previous {
            if let Some(old_timer) = old.timer {
                old_timer.cancel();
            }
            log::info!("[scheduler] geofence {} re-scheduled, superseding previous instance", id);
        } else {
            log::info!("[scheduler] tracking geofence {} (first wake at {})", id, deadline);
        }

        let handle = self.arm(id, generation, deadline);
        if let Some(entry) = inner.tracked.get_mut(&id) {
            entry.timer = Some(handle);
        }
    }

    /// Current state of a tracked geofence.
    pub fn state_of(&self, id: Uuid) -> Option<GeofenceState> {
        self.inner.lock().tracked.get(&id).map(|e| e.state)
    }

    /// Number of tracked geofences, expired ones included.
    pub fn tracked_count(&self) -> usize {
        self.inner.lock().tracked.len()
    }

    fn arm(&self, id: Uuid, generation: u64, deadline: Timestamp) -> Box<dyn TimerHandle> {
        let weak = self.weak_self.clone();
        self.timers.arm_at(
            deadline,
            Box::new(move || {
                if let Some(scheduler) = weak.upgrade() {
                    scheduler.handle_timer(id, generation);
                }
            }),
        )
    }

    /// Timer fire: re-evaluate the schedule, transition, re-arm.
    fn handle_timer(&self, id: Uuid, generation: u64) {
        // `becoming_active` of the fired transition, decided and committed
        // under the lock; the callback runs strictly after release
        let fired: Option<(bool, SharedRecord)> = {
            let mut inner = self.inner.lock();
            let Some(entry) = inner.tracked.get_mut(&id) else {
                return;
            };
            if entry.generation != generation {
                return; // superseded while this fire was in flight
            }

            let now = self.clock.now();
            let was = entry.state;
            let active_now = entry.schedule.is_active_at(now);
            let transition = match (was, active_now) {
                (GeofenceState::Pending, true) => {
                    entry.state = GeofenceState::Active;
                    Some(true)
                }
                (GeofenceState::Active, false) => Some(false),
                // early or duplicate fire: nothing to do but re-arm below
                _ => None,
            };

            match entry.schedule.next_transition(now) {
                Some((when, _)) => {
                    if transition == Some(false) {
                        entry.state = GeofenceState::Pending;
                    }
                    let handle = self.arm(id, generation, when);
                    entry.timer = Some(handle);
                }
                None => {
                    entry.timer = None;
                    if entry.state != GeofenceState::Active {
                        entry.state = GeofenceState::Expired;
                    } else if transition == Some(false) {
                        entry.state = GeofenceState::Expired;
                    }
                    if entry.state == GeofenceState::Expired {
                        log::info!("[scheduler] geofence {} exhausted its schedule", id);
                    }
                }
            }

            transition.map(|becoming_active| (becoming_active, entry.record.clone()))
        };

        if let Some((becoming_active, record)) = fired {
            let cell = if becoming_active { &self.on_active } else { &self.on_inactive };
            if let Some(callback) = cell.load_full() {
                callback(&record);
            }
        }
    }
}
