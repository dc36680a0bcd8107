// In: src/pipeline/orchestrator/core.rs

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::config::{HostEnvironment, ManagerSettings, LOGGING_SECTION};
use crate::error::MeterlineError;
use crate::observability::Diagnostics;
use crate::pipeline::settings::{parse_document, SettingsBundle};
use crate::pipeline::{Blueprint, BuiltStage, Connector, StageContext, ThreadExecutor};
use crate::state::{Phase, StateContainer, StateHandle};

//==================================================================================
// 1. The Manager
//==================================================================================

/// Owns a running pipeline and exposes its lifecycle.
///
/// Lifecycle methods take `&mut self`: a manager is driven from one caller at a
/// time, and the only state shared with workers is the `StateHandle`.
pub struct Manager {
    container: Arc<StateContainer>,
    state: StateHandle,
    diagnostics: Diagnostics,
    executor: ThreadExecutor,
    settings: ManagerSettings,
    started_at: Option<Instant>,
    component_names: Vec<&'static str>,
}

impl Manager {
    /// Builds the standard pipeline (`meter → process_host → recorder`).
    pub fn new(config: &str, host: HostEnvironment) -> Result<Self, MeterlineError> {
        Self::with_blueprint(config, host, &Blueprint::standard())
    }

    /// Builds the pipeline described by `blueprint` from configuration text.
    pub fn with_blueprint(
        config: &str,
        host: HostEnvironment,
        blueprint: &Blueprint,
    ) -> Result<Self, MeterlineError> {
        let document = parse_document(config)?;
        Self::from_document(&document, host, blueprint)
    }

    /// Like `with_blueprint`, but takes its state from a caller-owned container.
    /// `terminate` resets the container while it still holds this manager's
    /// state, so the next manager built from it starts from a fresh `Idle` one.
    pub fn with_container(
        config: &str,
        host: HostEnvironment,
        blueprint: &Blueprint,
        container: Arc<StateContainer>,
    ) -> Result<Self, MeterlineError> {
        let document = parse_document(config)?;
        Self::build(&document, host, blueprint, container)
    }

    /// Builds, connects and spawns every stage of `blueprint`.
    ///
    /// Creation entails, in order:
    /// 1. configuration of every settings record,
    /// 2. the diagnostics stage (index 0),
    /// 3. the shared state,
    /// 4. every other stage, in declaration order,
    /// 5. connection of stage i to stage i + 1,
    /// 6. spawning every stage on its own worker.
    ///
    /// Any failure unwinds fully: nothing is left running.
    pub fn from_document(
        document: &Value,
        host: HostEnvironment,
        blueprint: &Blueprint,
    ) -> Result<Self, MeterlineError> {
        Self::build(document, host, blueprint, Arc::new(StateContainer::new()))
    }

    fn build(
        document: &Value,
        host: HostEnvironment,
        blueprint: &Blueprint,
        container: Arc<StateContainer>,
    ) -> Result<Self, MeterlineError> {
        // 1. Settings bundle
        let bundle = SettingsBundle::build(document, &host, blueprint)?;
        let SettingsBundle {
            manager: settings,
            logging,
            records,
        } = bundle;

        // 2. Diagnostics stage
        let diagnostics =
            Diagnostics::new(logging).map_err(|err| MeterlineError::ComponentInit {
                index: 0,
                name: LOGGING_SECTION.to_string(),
                source: Box::new(err),
            })?;
        log::debug!(
            "Creating manager: vm: {:#x}, instance: {:#x}, class: {:#x}, method: {:#x}, version: {:#x}",
            host.vm,
            host.instance,
            host.class,
            host.method,
            host.version
        );

        // 3. Shared state
        let state = container.current();

        // 4. Instance set. A failure drops the stages built so far.
        let mut stages: Vec<BuiltStage> = Vec::with_capacity(records.len());
        for record in records {
            let built = record.build()?;
            log::debug!("Created component {} ('{}')", built.index, built.name);
            stages.push(built);
        }
        let component_names = stages.iter().map(|built| built.name).collect();

        // 5. Wiring
        let links = Connector::new(settings.link_capacity).connect_chain(&mut stages)?;

        // 6. Spawning
        let mut executor = ThreadExecutor::new(settings.join_warn_after());
        for built in stages {
            let ctx = StageContext {
                index: built.index,
                state: state.clone(),
                poll_interval: settings.poll_interval(),
            };
            if let Err(err) = executor.spawn(built, ctx) {
                // Release the workers already running before reporting.
                state.terminate();
                executor.join();
                container.release(&state);
                return Err(err);
            }
        }
        log::info!(
            "Pipeline created: {} components spawned, {} links",
            executor.len(),
            links
        );
        log_metric!(
            "event" = "pipeline_created",
            "components" = executor.len(),
            "links" = links
        );

        Ok(Self {
            container,
            state,
            diagnostics,
            executor,
            settings,
            started_at: None,
            component_names,
        })
    }

    //==============================================================================
    // 2. Lifecycle
    //==============================================================================

    /// `Idle → Started`, recording the running-time origin. Calling it while
    /// already started is a no-op that keeps the original origin.
    pub fn start(&mut self) -> Result<Phase, MeterlineError> {
        self.diagnostics.flush();

        let was_idle = self.state.phase() == Phase::Idle;
        let phase = self.state.start()?;
        if was_idle {
            self.started_at = Some(Instant::now());
            log::info!("Pipeline started");
        }
        Ok(phase)
    }

    /// `Started → Stopped`. From `Idle` this takes the synthetic start+stop
    /// path, so a never-started pipeline can be stopped without special cases.
    pub fn stop(&mut self) -> Result<Phase, MeterlineError> {
        self.diagnostics.flush();

        let from = self.state.phase();
        let phase = self.state.stop()?;
        if from != Phase::Stopped {
            log::info!("Pipeline stopped (was {})", from);
        }
        Ok(phase)
    }

    /// Forces `Terminated`, joins every worker, then recycles the state
    /// container. Does not return until every worker thread has exited.
    /// Safe to call any number of times.
    pub fn terminate(&mut self) -> Phase {
        self.diagnostics.flush();

        let from = self.state.phase();
        if from == Phase::Terminated {
            log::debug!("Terminate ignored: pipeline already terminated");
        }
        self.state.terminate();

        let report = self.executor.join();
        self.container.release(&self.state);

        if from != Phase::Terminated || report.joined > 0 {
            log::info!(
                "Pipeline terminated (was {}): joined {} workers",
                from,
                report.joined
            );
        }
        self.diagnostics.flush();
        Phase::Terminated
    }

    //==============================================================================
    // 3. Queries
    //==============================================================================

    /// One of `"terminated"`, `"stopped"`, `"started"`, `"idle"`, evaluated in
    /// that priority order.
    pub fn query_state(&self) -> &'static str {
        self.state.phase().as_str()
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn is_started(&self) -> bool {
        self.state.is_started()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }

    /// Time since the last successful `start`, or zero when not started.
    pub fn get_running_time(&self) -> Duration {
        match self.started_at {
            Some(started_at) if self.state.is_started() => started_at.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Names of the spawned components, in pipeline order.
    pub fn component_names(&self) -> &[&'static str] {
        &self.component_names
    }

    /// Number of workers not yet joined.
    pub fn worker_count(&self) -> usize {
        self.executor.len()
    }

    /// Number of worker threads still running.
    pub fn alive_workers(&self) -> usize {
        self.executor.alive()
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// A clone of the handle every worker observes.
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    pub fn state_container(&self) -> &Arc<StateContainer> {
        &self.container
    }

    /// Flushes the diagnostics stage. Returns once every earlier log record has
    /// been written.
    pub fn flush_diagnostics(&self) {
        self.diagnostics.flush();
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("phase", &self.state.phase())
            .field("components", &self.component_names)
            .field("executor", &self.executor)
            .finish()
    }
}
