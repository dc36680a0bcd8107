// In: src/components/process_host.rs

//! The `process_host` annotator. It is the one built-in module that requires
//! the host handles: its settings section is always present, even when the
//! configuration document omits it.

use serde::{Deserialize, Serialize};

use crate::config::HostEnvironment;
use crate::error::ComponentError;
use crate::pipeline::{
    attach, EndpointError, Inlet, Module, Outlet, Received, Record, Stage, StageContext,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProcessHostSettings {
    #[serde(flatten)]
    pub host: HostEnvironment,

    /// Prefix of every tag this stage adds.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "host".to_string()
}

/// Tags each record with where it was produced, then forwards it.
pub struct ProcessHost {
    tags: Vec<(String, String)>,
    inlet: Option<Inlet>,
    outlet: Option<Outlet>,
}

impl ProcessHost {
    fn annotate(&self, mut record: Record) -> Record {
        for (key, value) in &self.tags {
            record.tag(key.as_str(), value.as_str());
        }
        record
    }

    /// Returns `false` once the downstream stage is gone.
    fn forward(&self, ctx: &StageContext, record: Record) -> bool {
        let record = self.annotate(record);
        match &self.outlet {
            Some(outlet) => ctx.send(outlet, record),
            None => true,
        }
    }
}

impl Stage for ProcessHost {
    fn connect_input(&mut self, inlet: Inlet) -> Result<(), EndpointError> {
        attach(&mut self.inlet, inlet)
    }

    fn connect_output(&mut self, outlet: Outlet) -> Result<(), EndpointError> {
        attach(&mut self.outlet, outlet)
    }

    fn run(self: Box<Self>, ctx: StageContext) -> Result<(), ComponentError> {
        let Some(inlet) = &self.inlet else {
            return Err("process_host has no input".into());
        };

        if ctx.state.wait_for_start() {
            while ctx.state.is_running() {
                match ctx.recv(inlet) {
                    Received::Record(record) => {
                        if !self.forward(&ctx, record) && ctx.state.is_running() {
                            return Err("downstream closed".into());
                        }
                    }
                    Received::Empty => {}
                    Received::Closed => break,
                }
            }
        }

        // Records still in flight upstream are forwarded until it exits.
        let mut drained = 0usize;
        loop {
            match ctx.recv(inlet) {
                Received::Record(record) => {
                    if !self.forward(&ctx, record) {
                        break;
                    }
                    drained += 1;
                }
                Received::Empty => {}
                Received::Closed => break,
            }
        }
        if drained > 0 {
            log::debug!("process_host forwarded {} queued records on exit", drained);
        }
        Ok(())
    }
}

impl Module for ProcessHost {
    const NAME: &'static str = "process_host";
    const REQUIRES_HOST: bool = true;
    type Settings = ProcessHostSettings;

    fn build(settings: ProcessHostSettings) -> Result<Self, ComponentError> {
        let ProcessHostSettings { host, prefix } = settings;
        if host.vm == 0 {
            return Err("host VM handle is null".into());
        }
        let tags = vec![
            (format!("{}.version", prefix), format!("{:#x}", host.version)),
            (format!("{}.instance", prefix), format!("{:#x}", host.instance)),
            (format!("{}.pid", prefix), std::process::id().to_string()),
        ];
        Ok(Self {
            tags,
            inlet: None,
            outlet: None,
        })
    }
}
