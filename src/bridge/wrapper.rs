// In: src/bridge/wrapper.rs

//! The `Wrapper`: a slot holding at most one `Manager`, with the guard checks
//! and error-to-boolean conversions a host expects.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::bridge::format::{format_running_time, MISSING, NOT_AVAILABLE};
use crate::bridge::InstanceStatus;
use crate::config::HostEnvironment;
use crate::error::MeterlineError;
use crate::pipeline::executor::panic_message;
use crate::pipeline::{Blueprint, Manager};
use crate::state::StateContainer;

/// Every manager the wrapper builds takes its state from the same container,
/// so a manager created after `destroy` or `reset` starts from a fresh `Idle`
/// state while the old handles keep reporting `terminated`.
pub struct Wrapper {
    manager: Option<Manager>,
    blueprint: Blueprint,
    container: Arc<StateContainer>,
}

impl Default for Wrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Wrapper {
    /// A wrapper that builds the standard pipeline.
    pub fn new() -> Self {
        Self::with_blueprint(Blueprint::standard())
    }

    pub fn with_blueprint(blueprint: Blueprint) -> Self {
        Self {
            manager: None,
            blueprint,
            container: Arc::new(StateContainer::new()),
        }
    }

    //==============================================================================
    // 1. Instance Lifecycle
    //==============================================================================

    /// Builds a manager. Fails if one already exists or if construction fails
    /// for any reason; a failed call leaves no instance behind.
    pub fn create(&mut self, config: &str, host: HostEnvironment) -> bool {
        if self.manager.is_some() {
            log::warn!("Cannot create manager: {}", MeterlineError::AlreadyExists);
            return false;
        }

        let blueprint = &self.blueprint;
        let container = Arc::clone(&self.container);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            Manager::with_container(config, host, blueprint, container)
        }));

        match outcome {
            Ok(Ok(manager)) => {
                log::info!("Created manager with components {:?}", manager.component_names());
                self.manager = Some(manager);
                true
            }
            Ok(Err(err)) => {
                report_create_error(&err);
                false
            }
            Err(payload) => {
                log::error!(
                    "Error creating manager: panicked: {}",
                    panic_message(payload.as_ref())
                );
                false
            }
        }
    }

    /// Starts the pipeline. Fails if there is no instance or it has already
    /// been started.
    pub fn start(&mut self) -> bool {
        let Some(manager) = self.manager.as_mut() else {
            log::warn!("Cannot start: {}", MeterlineError::Missing);
            return false;
        };
        if manager.is_started() {
            log::warn!("Cannot start: manager is already started");
            return false;
        }
        log_outcome("start", manager.start())
    }

    /// Stops the pipeline. Fails if there is no instance or it was never started.
    pub fn stop(&mut self) -> bool {
        let Some(manager) = self.manager.as_mut() else {
            log::warn!("Cannot stop: {}", MeterlineError::Missing);
            return false;
        };
        if !manager.is_started() {
            log::warn!("Cannot stop: manager is not started");
            return false;
        }
        log_outcome("stop", manager.stop())
    }

    /// Terminates and joins the pipeline, keeping the instance.
    pub fn terminate(&mut self) -> bool {
        match self.manager.as_mut() {
            Some(manager) => {
                manager.terminate();
                true
            }
            None => {
                log::warn!("Cannot terminate: {}", MeterlineError::Missing);
                false
            }
        }
    }

    /// Terminates the pipeline, waits for the diagnostics flush and releases
    /// the instance.
    pub fn destroy(&mut self) -> bool {
        let Some(mut manager) = self.manager.take() else {
            log::warn!("Cannot destroy: {}", MeterlineError::Missing);
            return false;
        };
        manager.terminate();
        log::info!("Destroying manager");
        manager.flush_diagnostics();
        drop(manager);
        true
    }

    /// Destroys the current instance, if any, then creates a new one.
    pub fn reset(&mut self, config: &str, host: HostEnvironment) -> bool {
        if self.manager.is_some() {
            self.destroy();
        }
        self.create(config, host)
    }

    //==============================================================================
    // 2. Queries
    //==============================================================================

    pub fn exists(&self) -> bool {
        self.manager.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.manager
            .as_ref()
            .is_some_and(|manager| manager.is_started())
    }

    /// `"idle"`, `"started"`, `"stopped"`, `"terminated"` or `"missing"`.
    pub fn query_state(&self) -> String {
        match &self.manager {
            Some(manager) => manager.query_state().to_string(),
            None => MISSING.to_string(),
        }
    }

    /// `HH:MM:SS.` while started, `"N/A"` when not started or missing.
    pub fn get_running_time(&self) -> String {
        match &self.manager {
            Some(manager) if manager.is_started() => {
                format_running_time(manager.get_running_time())
            }
            _ => NOT_AVAILABLE.to_string(),
        }
    }

    pub fn status(&self) -> InstanceStatus {
        match &self.manager {
            Some(manager) => manager.phase().into(),
            None => InstanceStatus::Missing,
        }
    }

    pub fn manager(&self) -> Option<&Manager> {
        self.manager.as_ref()
    }

    pub fn state_container(&self) -> &Arc<StateContainer> {
        &self.container
    }
}

fn report_create_error(err: &MeterlineError) {
    match err {
        MeterlineError::ComponentInit { index: 0, .. } => log::error!(
            "Error creating manager: {}. Could not set up logging (permissions?)",
            err
        ),
        _ => log::error!("Error creating manager: {}", err),
    }
}

fn log_outcome<T>(action: &str, outcome: Result<T, MeterlineError>) -> bool {
    match outcome {
        Ok(_) => true,
        Err(err) => {
            log::warn!("Cannot {}: {}", action, err);
            false
        }
    }
}

impl std::fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wrapper")
            .field("manager", &self.manager)
            .field("blueprint", &self.blueprint.names())
            .finish()
    }
}
