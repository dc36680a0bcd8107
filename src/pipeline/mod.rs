// In: src/pipeline/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Pipeline Layer
// ====================================================================================
//
// A pipeline is a build-time-fixed, ordered list of stages (the `Blueprint`). The
// orchestrator turns a configuration document into a running pipeline in five
// strictly ordered steps:
//
//   1. [Settings Bundle (settings)]   -> one typed settings record per stage
//         |
//   2. [Instance Set (StageSpec)]     -> one `Box<dyn Stage>` per record, in order
//         |
//   3. [Connector (connector)]        -> stage i output -> stage i+1 input
//         |
//   4. [Executor (executor)]          -> one named worker thread per stage
//         |
//   5. [Global State (crate::state)]  -> phase flips drive every worker; the
//                                        executor joins them on termination
//
// The diagnostics stage (`crate::observability::Diagnostics`) always occupies
// index 0. It is configured and built first but never connected or spawned, so
// real stages are numbered from 1.
//
// ====================================================================================

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ComponentError, MeterlineError};
use crate::state::StateHandle;

pub mod connector;
pub mod executor;
pub mod orchestrator;
pub mod record;
pub mod settings;

pub use connector::Connector;
pub use executor::{JoinReport, ThreadExecutor};
pub use orchestrator::Manager;
pub use record::{Reading, Record};
pub use settings::{SettingsBundle, SettingsRecord};


//==================================================================================
// 1. Links & Endpoints
//==================================================================================

/// The producing end of a pipeline link.
pub type Outlet = Sender<Record>;
/// The consuming end of a pipeline link.
pub type Inlet = Receiver<Record>;

/// Why a stage refused a link endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointError {
    /// The stage has no endpoint on this side (e.g. a sink has no output).
    Unsupported,
    /// Links are established exactly once.
    AlreadyConnected,
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointError::Unsupported => f.write_str("endpoint not supported"),
            EndpointError::AlreadyConnected => f.write_str("endpoint already connected"),
        }
    }
}

/// Stores `endpoint` in `slot` unless the slot is already taken.
pub fn attach<T>(slot: &mut Option<T>, endpoint: T) -> Result<(), EndpointError> {
    if slot.is_some() {
        return Err(EndpointError::AlreadyConnected);
    }
    *slot = Some(endpoint);
    Ok(())
}

//==================================================================================
// 2. The Stage Contract
//==================================================================================

/// What a worker hands to the stage it runs.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Position in the pipeline (the diagnostics stage is 0).
    pub index: usize,
    /// The shared phase every stage observes.
    pub state: StateHandle,
    /// Upper bound on how long a stage may block before re-checking the phase.
    pub poll_interval: Duration,
}

/// Outcome of a bounded receive on an inlet.
#[derive(Debug)]
pub enum Received {
    Record(Record),
    /// Nothing arrived within the poll interval.
    Empty,
    /// The upstream stage has exited.
    Closed,
}

impl StageContext {
    /// Delivers `record`, retrying while the pipeline is running. Returns
    /// `false` if the record was dropped because the downstream stage is gone
    /// or the pipeline left `Started` while the link was full.
    pub fn send(&self, outlet: &Outlet, mut record: Record) -> bool {
        loop {
            match outlet.send_timeout(record, self.poll_interval) {
                Ok(()) => return true,
                Err(SendTimeoutError::Disconnected(_)) => return false,
                Err(SendTimeoutError::Timeout(returned)) => {
                    if !self.state.is_running() {
                        return false;
                    }
                    record = returned;
                }
            }
        }
    }

    /// Waits at most one poll interval for the next record.
    pub fn recv(&self, inlet: &Inlet) -> Received {
        match inlet.recv_timeout(self.poll_interval) {
            Ok(record) => Received::Record(record),
            Err(RecvTimeoutError::Timeout) => Received::Empty,
            Err(RecvTimeoutError::Disconnected) => Received::Closed,
        }
    }
}

/// The uniform capability every pipeline stage implements.
///
/// A stage must leave `run` promptly once the shared phase is no longer
/// `Started`. The built-in stages never block for longer than the context's
/// poll interval without re-checking it. Stages with an input keep draining
/// it after that until the upstream stage exits and closes the link.
pub trait Stage: Send + 'static {
    fn connect_input(&mut self, _inlet: Inlet) -> Result<(), EndpointError> {
        Err(EndpointError::Unsupported)
    }

    fn connect_output(&mut self, _outlet: Outlet) -> Result<(), EndpointError> {
        Err(EndpointError::Unsupported)
    }

    /// The processing loop, run to completion on a dedicated worker.
    fn run(self: Box<Self>, ctx: StageContext) -> Result<(), ComponentError>;
}

/// A stage type that can be listed in a `Blueprint`.
pub trait Module: Stage + Sized {
    /// The settings section this module reads.
    const NAME: &'static str;
    /// Whether a settings section carrying the host handles must always exist.
    const REQUIRES_HOST: bool = false;

    type Settings: DeserializeOwned + Send + 'static;

    fn build(settings: Self::Settings) -> Result<Self, ComponentError>;
}

//==================================================================================
// 3. Blueprints
//==================================================================================

/// A configured, not-yet-built stage. Consumed exactly once.
pub type PendingStage = Box<dyn FnOnce() -> Result<Box<dyn Stage>, ComponentError> + Send>;

type Configure = fn(&Value) -> Result<PendingStage, MeterlineError>;

/// One entry of a blueprint: a module's name plus its typed configure step.
#[derive(Clone, Copy)]
pub struct StageSpec {
    pub name: &'static str,
    pub requires_host: bool,
    configure: Configure,
}

impl StageSpec {
    pub fn of<M: Module>() -> Self {
        Self {
            name: M::NAME,
            requires_host: M::REQUIRES_HOST,
            configure: configure_module::<M>,
        }
    }

    /// Deserializes `section` into the module's settings and captures them in
    /// a pending constructor.
    pub fn configure(&self, section: &Value) -> Result<PendingStage, MeterlineError> {
        (self.configure)(section)
    }
}

impl fmt::Debug for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageSpec")
            .field("name", &self.name)
            .field("requires_host", &self.requires_host)
            .finish()
    }
}

fn configure_module<M: Module>(section: &Value) -> Result<PendingStage, MeterlineError> {
    let settings: M::Settings = settings::parse_section(M::NAME, section)?;
    Ok(Box::new(move || {
        let module = M::build(settings)?;
        Ok(Box::new(module) as Box<dyn Stage>)
    }))
}

/// The ordered, build-time-fixed list of stages a manager instantiates.
#[derive(Debug, Clone, Default)]
pub struct Blueprint {
    stages: Vec<StageSpec>,
}

impl Blueprint {
    pub fn new(stages: Vec<StageSpec>) -> Self {
        Self { stages }
    }

    pub fn then<M: Module>(mut self) -> Self {
        self.stages.push(StageSpec::of::<M>());
        self
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|spec| spec.name).collect()
    }

    /// The fixed set of modules that always receive the host handles.
    pub fn requires_host(&self) -> Vec<&'static str> {
        self.stages
            .iter()
            .filter(|spec| spec.requires_host)
            .map(|spec| spec.name)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.iter().any(|spec| spec.name == name)
    }
}

/// A constructed stage waiting to be connected and spawned.
pub struct BuiltStage {
    pub index: usize,
    pub name: &'static str,
    pub stage: Box<dyn Stage>,
}

impl fmt::Debug for BuiltStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltStage")
            .field("index", &self.index)
            .field("name", &self.name)
            .finish()
    }
}
