// In: src/components/meter.rs

//! The `meter` source: samples a fixed set of probes once per period while the
//! pipeline is started.

use std::fs;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::ComponentError;
use crate::pipeline::{attach, EndpointError, Module, Outlet, Record, Stage, StageContext};

const LOADAVG_PATH: &str = "/proc/loadavg";

/// A value the meter can sample.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Probe {
    /// The record's own sequence number.
    Counter,
    /// Seconds since the meter observed `Started`.
    Uptime,
    /// The one-minute load average, where the platform exposes it.
    Loadavg,
}

impl Probe {
    pub fn reading_name(&self) -> &'static str {
        match self {
            Probe::Counter => "counter",
            Probe::Uptime => "uptime_s",
            Probe::Loadavg => "loadavg_1m",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MeterSettings {
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    #[serde(default = "default_probes")]
    pub probes: Vec<Probe>,

    /// Stop sampling after this many records.
    #[serde(default)]
    pub limit: Option<u64>,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            probes: default_probes(),
            limit: None,
        }
    }
}

fn default_period_ms() -> u64 {
    100
}

fn default_probes() -> Vec<Probe> {
    vec![Probe::Counter]
}

pub struct Meter {
    period: Duration,
    probes: Vec<Probe>,
    limit: Option<u64>,
    outlet: Option<Outlet>,
}

impl Meter {
    fn sample(&self, sequence: u64, elapsed: Duration) -> Record {
        let mut record = Record::new(sequence, elapsed);
        for probe in &self.probes {
            let value = match probe {
                Probe::Counter => Some(sequence as f64),
                Probe::Uptime => Some(elapsed.as_secs_f64()),
                Probe::Loadavg => read_loadavg(),
            };
            match value {
                Some(value) => record = record.with_reading(probe.reading_name(), value),
                None => log::debug!("Probe '{}' unavailable, reading omitted", probe.reading_name()),
            }
        }
        record
    }
}

fn read_loadavg() -> Option<f64> {
    fs::read_to_string(LOADAVG_PATH)
        .ok()
        .and_then(|text| parse_loadavg(&text))
}

/// Parses the first field of `/proc/loadavg`.
fn parse_loadavg(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

impl Stage for Meter {
    fn connect_output(&mut self, outlet: Outlet) -> Result<(), EndpointError> {
        attach(&mut self.outlet, outlet)
    }

    fn run(self: Box<Self>, ctx: StageContext) -> Result<(), ComponentError> {
        if !ctx.state.wait_for_start() {
            return Ok(());
        }
        let origin = Instant::now();
        let mut sequence: u64 = 0;

        while ctx.state.is_running() {
            if self.limit.is_some_and(|limit| sequence >= limit) {
                log::debug!("Meter reached its limit of {} records", sequence);
                break;
            }

            let record = self.sample(sequence, origin.elapsed());
            match &self.outlet {
                Some(outlet) => {
                    if !ctx.send(outlet, record) && ctx.state.is_running() {
                        log::warn!("Meter output closed after {} records", sequence);
                        break;
                    }
                }
                None => log::trace!("Meter sample {:?}", record),
            }
            sequence += 1;

            ctx.state.pause_while_started(self.period);
        }
        Ok(())
    }
}

impl Module for Meter {
    const NAME: &'static str = "meter";
    type Settings = MeterSettings;

    fn build(settings: MeterSettings) -> Result<Self, ComponentError> {
        if settings.probes.is_empty() {
            return Err("at least one probe is required".into());
        }
        Ok(Self {
            period: Duration::from_millis(settings.period_ms.max(1)),
            probes: settings.probes,
            limit: settings.limit,
            outlet: None,
        })
    }
}
