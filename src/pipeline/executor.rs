// In: src/pipeline/executor.rs

//! The thread executor: one named OS thread per spawned stage, and a blocking
//! join over all of them.
//!
//! `join` has no timeout. Stages are required to notice a phase change within
//! their poll interval; if one is slower than `join_warn_after`, the executor
//! logs which worker it is still waiting for and keeps waiting. There is no
//! forced cancellation.

use std::any::Any;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{ComponentError, MeterlineError};
use crate::pipeline::{BuiltStage, StageContext};

/// How often `join` re-checks a slow worker before warning about it.
const JOIN_POLL: Duration = Duration::from_millis(5);

struct Worker {
    index: usize,
    name: String,
    handle: JoinHandle<Result<(), ComponentError>>,
}

/// What a call to `join` observed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JoinReport {
    pub joined: usize,
    /// Workers whose stage returned an error, with the error text.
    pub failed: Vec<(String, String)>,
    /// Workers whose stage panicked, with the panic message.
    pub panicked: Vec<(String, String)>,
}

impl JoinReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.panicked.is_empty()
    }
}

pub struct ThreadExecutor {
    workers: Vec<Worker>,
    join_warn_after: Duration,
}

impl ThreadExecutor {
    pub fn new(join_warn_after: Duration) -> Self {
        Self {
            workers: Vec::new(),
            join_warn_after,
        }
    }

    /// Number of spawned workers not yet joined.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Number of spawned workers whose thread is still running.
    pub fn alive(&self) -> usize {
        self.workers
            .iter()
            .filter(|worker| !worker.handle.is_finished())
            .count()
    }

    /// Spawns `stage` on a dedicated thread named after it.
    pub fn spawn(&mut self, built: BuiltStage, ctx: StageContext) -> Result<(), MeterlineError> {
        let BuiltStage { index, name, stage } = built;
        let handle = thread::Builder::new()
            .name(format!("meterline-{}", name))
            .spawn(move || {
                log::debug!("Component {} ('{}') worker running", index, name);
                let result = stage.run(ctx);
                log::debug!("Component {} ('{}') worker exiting", index, name);
                result
            })
            .map_err(|source| MeterlineError::Spawn {
                name: name.to_string(),
                source,
            })?;

        self.workers.push(Worker {
            index,
            name: name.to_string(),
            handle,
        });
        Ok(())
    }

    /// Blocks until every spawned worker has exited. Joined workers are
    /// forgotten, so a second call returns immediately with an empty report.
    pub fn join(&mut self) -> JoinReport {
        let mut report = JoinReport::default();
        let begin = Instant::now();

        for worker in self.workers.drain(..) {
            let mut warned = false;
            while !worker.handle.is_finished() {
                if !warned && begin.elapsed() >= self.join_warn_after {
                    log::warn!(
                        "Still waiting for component {} ('{}') to exit after {:?}",
                        worker.index,
                        worker.name,
                        begin.elapsed()
                    );
                    warned = true;
                }
                thread::sleep(JOIN_POLL);
            }

            match worker.handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    log::error!("Component '{}' stopped with an error: {}", worker.name, err);
                    report.failed.push((worker.name, err.to_string()));
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    log::error!("Component '{}' panicked: {}", worker.name, message);
                    report.panicked.push((worker.name, message));
                }
            }
            report.joined += 1;
        }

        report
    }
}

impl std::fmt::Debug for ThreadExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadExecutor")
            .field(
                "workers",
                &self.workers.iter().map(|w| w.name.as_str()).collect::<Vec<_>>(),
            )
            .field("join_warn_after", &self.join_warn_after)
            .finish()
    }
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;
    use crate::state::State;

    enum Behaviour {
        WaitForStop,
        Fail,
        Panic,
    }

    struct Scripted(Behaviour);

    impl Stage for Scripted {
        fn run(self: Box<Self>, ctx: StageContext) -> Result<(), ComponentError> {
            match self.0 {
                Behaviour::WaitForStop => {
                    if ctx.state.wait_for_start() {
                        while ctx.state.pause_while_started(ctx.poll_interval) {}
                    }
                    Ok(())
                }
                Behaviour::Fail => Err("sensor unplugged".into()),
                Behaviour::Panic => panic!("stage blew up"),
            }
        }
    }

    fn ctx(state: &crate::state::StateHandle) -> StageContext {
        StageContext {
            index: 1,
            state: state.clone(),
            poll_interval: Duration::from_millis(10),
        }
    }

    fn built(name: &'static str, behaviour: Behaviour) -> BuiltStage {
        BuiltStage {
            index: 1,
            name,
            stage: Box::new(Scripted(behaviour)),
        }
    }

    #[test]
    fn test_join_waits_for_workers_and_is_idempotent() {
        let state = State::new_handle();
        let mut executor = ThreadExecutor::new(Duration::from_secs(2));
        executor.spawn(built("a", Behaviour::WaitForStop), ctx(&state)).unwrap();
        executor.spawn(built("b", Behaviour::WaitForStop), ctx(&state)).unwrap();
        assert_eq!(executor.len(), 2);

        state.start().unwrap();
        state.terminate();

        let report = executor.join();
        assert_eq!(report.joined, 2);
        assert!(report.is_clean());
        assert!(executor.is_empty());

        let again = executor.join();
        assert_eq!(again, JoinReport::default());
    }

    #[test]
    fn test_join_reports_failures_and_panics() {
        let state = State::new_handle();
        let mut executor = ThreadExecutor::new(Duration::from_secs(2));
        executor.spawn(built("flaky", Behaviour::Fail), ctx(&state)).unwrap();
        executor.spawn(built("broken", Behaviour::Panic), ctx(&state)).unwrap();

        let report = executor.join();
        assert_eq!(report.joined, 2);
        assert_eq!(report.failed, vec![("flaky".to_string(), "sensor unplugged".to_string())]);
        assert_eq!(report.panicked.len(), 1);
        assert_eq!(report.panicked[0].1, "stage blew up");
    }
}
