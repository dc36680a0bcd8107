// In: src/state.rs

//! The shared lifecycle state observed by every spawned component.
//!
//! There is no process-wide singleton here. The orchestrator owns a
//! `StateContainer`, takes one `StateHandle` out of it at construction time and
//! clones that handle into every worker when it is spawned. All workers
//! therefore observe the same phase, and only the orchestrator ever writes it.
//!
//! ```text
//!            start             stop
//!   Idle ─────────────▶ Started ──────▶ Stopped
//!    │  └──────── stop (synthetic) ───────▲ │
//!    │                   │                  │
//!    └─────── terminate ─┴─── terminate ────┴──▶ Terminated (final)
//! ```
//!
//! The phase is stored as three independent flags. Readers evaluate them in a
//! fixed priority order (terminated, stopped, started) which yields a
//! deterministic, safe-side answer even if a reader races a transition.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::error::MeterlineError;

//==================================================================================
// 1. Phases & Transitions
//==================================================================================

/// The four logical phases of a pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Started,
    Stopped,
    /// Final. No transition leaves this phase.
    Terminated,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Started => "started",
            Phase::Stopped => "stopped",
            Phase::Terminated => "terminated",
        }
    }

    /// `true` once the pipeline has left `Idle` and `Started` for good.
    pub fn is_finished(&self) -> bool {
        matches!(self, Phase::Stopped | Phase::Terminated)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle request issued by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Start,
    Stop,
    Terminate,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transition::Start => "start",
            Transition::Stop => "stop",
            Transition::Terminate => "terminate",
        })
    }
}

//==================================================================================
// 2. The Shared State
//==================================================================================

/// The handle cloned into every worker.
pub type StateHandle = Arc<State>;

/// Phase flags plus the machinery workers use to block on phase changes.
///
/// Flags are written with `Release` stores while `transition_lock` is held and
/// read with `Acquire` loads, so a worker polling `is_running()` sees a
/// `start()` from the orchestrator thread without a data race. Waiters park on
/// `changed`; every transition broadcasts on it.
#[derive(Debug, Default)]
pub struct State {
    started: AtomicBool,
    stopped: AtomicBool,
    terminated: AtomicBool,
    transition_lock: Mutex<()>,
    changed: Condvar,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh, shareable state in the `Idle` phase.
    pub fn new_handle() -> StateHandle {
        Arc::new(Self::new())
    }

    /// The current phase, evaluated in priority order.
    pub fn phase(&self) -> Phase {
        if self.terminated.load(Ordering::Acquire) {
            Phase::Terminated
        } else if self.stopped.load(Ordering::Acquire) {
            Phase::Stopped
        } else if self.started.load(Ordering::Acquire) {
            Phase::Started
        } else {
            Phase::Idle
        }
    }

    pub fn is_started(&self) -> bool {
        self.phase() == Phase::Started
    }

    pub fn is_stopped(&self) -> bool {
        self.phase() == Phase::Stopped
    }

    pub fn is_terminated(&self) -> bool {
        self.phase() == Phase::Terminated
    }

    /// Alias used by worker loops: "keep going".
    pub fn is_running(&self) -> bool {
        self.is_started()
    }

    // --- Transitions (orchestrator side) ---

    /// `Idle → Started`. Already started is an accepted no-op.
    pub fn start(&self) -> Result<Phase, MeterlineError> {
        let _guard = self.transition_lock.lock();
        let from = self.phase();
        match from {
            Phase::Idle => {
                self.started.store(true, Ordering::Release);
                self.publish(Transition::Start, from);
                Ok(Phase::Started)
            }
            Phase::Started => Ok(Phase::Started),
            Phase::Stopped | Phase::Terminated => Err(MeterlineError::TransitionRejected {
                transition: Transition::Start,
                phase: from,
            }),
        }
    }

    /// `Started → Stopped`, or the synthetic `Idle → Stopped` path.
    ///
    /// On the synthetic path `stopped` is published before `started`, so the
    /// priority-ordered `phase()` can never report `Started` to any observer.
    pub fn stop(&self) -> Result<Phase, MeterlineError> {
        let _guard = self.transition_lock.lock();
        let from = self.phase();
        match from {
            Phase::Started => {
                self.stopped.store(true, Ordering::Release);
                self.publish(Transition::Stop, from);
                Ok(Phase::Stopped)
            }
            Phase::Idle => {
                self.stopped.store(true, Ordering::Release);
                self.started.store(true, Ordering::Release);
                self.publish(Transition::Stop, from);
                Ok(Phase::Stopped)
            }
            Phase::Stopped => Ok(Phase::Stopped),
            Phase::Terminated => Err(MeterlineError::TransitionRejected {
                transition: Transition::Stop,
                phase: from,
            }),
        }
    }

    /// Forces `Terminated` from any phase. Idempotent.
    pub fn terminate(&self) -> Phase {
        let _guard = self.transition_lock.lock();
        let from = self.phase();
        if from != Phase::Terminated {
            self.terminated.store(true, Ordering::Release);
            self.publish(Transition::Terminate, from);
        }
        Phase::Terminated
    }

    fn publish(&self, transition: Transition, from: Phase) {
        log_metric!(
            "event" = "state_transition",
            "transition" = transition,
            "from" = from,
            "to" = self.phase()
        );
        self.changed.notify_all();
    }

    // --- Observation (worker side) ---

    /// Blocks until the phase leaves `Idle`. Returns `true` if the pipeline is
    /// now started, `false` if it went straight to stopped/terminated.
    pub fn wait_for_start(&self) -> bool {
        let mut guard = self.transition_lock.lock();
        while self.phase() == Phase::Idle {
            self.changed.wait(&mut guard);
        }
        self.phase() == Phase::Started
    }

    /// Sleeps for up to `period`, waking early on any transition that ends the
    /// `Started` phase. Returns whether the pipeline is still started.
    pub fn pause_while_started(&self, period: Duration) -> bool {
        let deadline = Instant::now() + period;
        let mut guard = self.transition_lock.lock();
        while self.phase() == Phase::Started {
            if self.changed.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.phase() == Phase::Started
    }
}

//==================================================================================
// 3. The State Container
//==================================================================================

/// Holds the "current" state that newly built pipelines pick up.
///
/// `reset()` swaps in a fresh `Idle` state. Handles already handed out keep
/// pointing at the old instance, which is how a terminated manager keeps
/// reporting `terminated` after its container has been recycled.
#[derive(Debug)]
pub struct StateContainer {
    current: Mutex<StateHandle>,
}

impl StateContainer {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(State::new_handle()),
        }
    }

    /// Returns a clone of the current state handle.
    pub fn current(&self) -> StateHandle {
        Arc::clone(&self.current.lock())
    }

    /// Replaces the current state with a fresh `Idle` one.
    pub fn reset(&self) {
        *self.current.lock() = State::new_handle();
    }

    /// Resets the container only if it still holds `state`. Returns whether it
    /// did; a container already handed to a newer pipeline is left alone.
    pub fn release(&self, state: &StateHandle) -> bool {
        let mut current = self.current.lock();
        if Arc::ptr_eq(&current, state) {
            *current = State::new_handle();
            true
        } else {
            false
        }
    }
}

impl Default for StateContainer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_start_then_stop() {
        let state = State::new();
        assert_eq!(state.phase(), Phase::Idle);

        assert_eq!(state.start().unwrap(), Phase::Started);
        assert!(state.is_started());

        assert_eq!(state.stop().unwrap(), Phase::Stopped);
        assert!(state.is_stopped());
        assert!(!state.is_running());
    }

    #[test]
    fn test_start_is_a_no_op_when_already_started() {
        let state = State::new();
        state.start().unwrap();
        assert_eq!(state.start().unwrap(), Phase::Started);
    }

    #[test]
    fn test_stop_while_idle_goes_straight_to_stopped() {
        let state = State::new();
        assert_eq!(state.stop().unwrap(), Phase::Stopped);
        assert_eq!(state.phase(), Phase::Stopped);
        // A pipeline that was never started cannot be started after the fact.
        assert!(matches!(
            state.start(),
            Err(MeterlineError::TransitionRejected {
                transition: Transition::Start,
                phase: Phase::Stopped
            })
        ));
    }

    #[test]
    fn test_synthetic_stop_is_never_observed_as_started() {
        let state = State::new_handle();
        let observer_state = Arc::clone(&state);

        let observer = thread::spawn(move || {
            let mut saw_started = false;
            for _ in 0..100_000 {
                let phase = observer_state.phase();
                if phase == Phase::Started {
                    saw_started = true;
                }
                if phase == Phase::Stopped {
                    break;
                }
            }
            saw_started
        });

        state.stop().unwrap();
        assert!(!observer.join().unwrap());
    }

    #[test]
    fn test_terminate_is_legal_from_every_phase_and_idempotent() {
        for setup in [None, Some(Transition::Start), Some(Transition::Stop)] {
            let state = State::new();
            match setup {
                Some(Transition::Start) => {
                    state.start().unwrap();
                }
                Some(Transition::Stop) => {
                    state.stop().unwrap();
                }
                _ => {}
            }
            assert_eq!(state.terminate(), Phase::Terminated);
            assert_eq!(state.terminate(), Phase::Terminated);
            assert!(state.is_terminated());
        }
    }

    #[test]
    fn test_transitions_from_terminated_are_rejected() {
        let state = State::new();
        state.terminate();

        assert!(state.start().is_err());
        assert!(state.stop().is_err());
        assert_eq!(state.phase(), Phase::Terminated);
    }

    #[test]
    fn test_terminated_wins_over_started_in_priority_order() {
        let state = State::new();
        state.start().unwrap();
        state.terminate();
        // Both flags are set; the query must report the terminal phase.
        assert!(state.started.load(Ordering::Acquire));
        assert_eq!(state.phase(), Phase::Terminated);
        assert_eq!(state.phase().as_str(), "terminated");
    }

    #[test]
    fn test_wait_for_start_wakes_on_start() {
        let state = State::new_handle();
        let worker_state = Arc::clone(&state);
        let worker = thread::spawn(move || worker_state.wait_for_start());

        thread::sleep(Duration::from_millis(20));
        state.start().unwrap();
        assert!(worker.join().unwrap());
    }

    #[test]
    fn test_wait_for_start_returns_false_on_terminate() {
        let state = State::new_handle();
        let worker_state = Arc::clone(&state);
        let worker = thread::spawn(move || worker_state.wait_for_start());

        thread::sleep(Duration::from_millis(20));
        state.terminate();
        assert!(!worker.join().unwrap());
    }

    #[test]
    fn test_pause_while_started_wakes_early_on_stop() {
        let state = State::new_handle();
        state.start().unwrap();

        let worker_state = Arc::clone(&state);
        let worker = thread::spawn(move || {
            let begin = Instant::now();
            let still_running = worker_state.pause_while_started(Duration::from_secs(30));
            (still_running, begin.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        state.stop().unwrap();

        let (still_running, waited) = worker.join().unwrap();
        assert!(!still_running);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn test_pause_while_started_times_out_while_running() {
        let state = State::new();
        state.start().unwrap();
        assert!(state.pause_while_started(Duration::from_millis(5)));
    }

    #[test]
    fn test_container_reset_leaves_old_handles_untouched() {
        let container = StateContainer::new();
        let handle = container.current();
        handle.start().unwrap();
        handle.terminate();

        container.reset();

        assert_eq!(handle.phase(), Phase::Terminated);
        assert_eq!(container.current().phase(), Phase::Idle);
        assert!(!Arc::ptr_eq(&handle, &container.current()));
    }

    #[test]
    fn test_container_release_only_resets_its_own_state() {
        // 1. Arrange
        let container = StateContainer::new();
        let old = container.current();
        old.terminate();
        assert!(container.release(&old));
        let newer = container.current();

        // 2. Act: a stale holder releases again
        let released = container.release(&old);

        // 3. Assert
        assert!(!released);
        assert!(Arc::ptr_eq(&newer, &container.current()));
        assert_eq!(container.current().phase(), Phase::Idle);
    }
}
