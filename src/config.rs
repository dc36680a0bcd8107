// In: src/config.rs

//! The single source of truth for the settings the orchestrator itself owns.
//!
//! A pipeline is configured from one JSON document mapping component names to
//! settings sections. Each module defines its own settings struct next to its
//! implementation (see `components`); this module holds the pieces that are
//! shared by every pipeline:
//!
//! - `HostEnvironment`: the five opaque handles supplied by the embedding runtime,
//! - `ManagerSettings`: the reserved `"manager"` section (links, join policy),
//! - `LoggingSettings`: the `"logging"` section for the diagnostics stage.

use std::path::PathBuf;
use std::time::Duration;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

//==================================================================================
// I. Host Environment
//==================================================================================

/// Names of the fields spliced into every object-valued settings section.
pub const HOST_HANDLE_FIELDS: [&str; 5] = ["jvm", "jinstance", "jclazz", "jmid", "jniversion"];

/// Opaque references supplied by the embedding runtime.
///
/// The values are never dereferenced by this crate. Components that need to call
/// back into the host declare the dependency by flattening this struct into
/// their settings, which picks up the injected fields by name.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HostEnvironment {
    /// Handle A: the virtual-machine pointer.
    #[serde(rename = "jvm", default)]
    pub vm: u64,
    /// Handle B: the instance reference.
    #[serde(rename = "jinstance", default)]
    pub instance: u64,
    /// Handle C: the class reference.
    #[serde(rename = "jclazz", default)]
    pub class: u64,
    /// Handle D: the method identifier.
    #[serde(rename = "jmid", default)]
    pub method: u64,
    /// The host interface version tag.
    #[serde(rename = "jniversion", default)]
    pub version: i32,
}

impl HostEnvironment {
    pub fn new(vm: u64, instance: u64, class: u64, method: u64, version: i32) -> Self {
        Self {
            vm,
            instance,
            class,
            method,
            version,
        }
    }

    /// An environment with every handle unset, for pipelines that run
    /// without an embedding host.
    pub fn detached() -> Self {
        Self::default()
    }

    /// `true` when every reference handle is non-null.
    pub fn is_complete(&self) -> bool {
        self.vm != 0 && self.instance != 0 && self.class != 0 && self.method != 0
    }

    /// The handles as the JSON fields injected into settings sections.
    pub fn to_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut fields = serde_json::Map::with_capacity(HOST_HANDLE_FIELDS.len());
        fields.insert("jvm".into(), self.vm.into());
        fields.insert("jinstance".into(), self.instance.into());
        fields.insert("jclazz".into(), self.class.into());
        fields.insert("jmid".into(), self.method.into());
        fields.insert("jniversion".into(), self.version.into());
        fields
    }
}

//==================================================================================
// II. Manager Settings (the reserved "manager" section)
//==================================================================================

/// Name of the reserved section read by the orchestrator itself.
pub const MANAGER_SECTION: &str = "manager";

/// Settings for wiring and joining, read from the `"manager"` section.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Capacity of each pipeline link. `None` creates unbounded links.
    #[serde(default)]
    pub link_capacity: Option<usize>,

    /// Upper bound on how long a built-in component takes to notice a phase
    /// change while blocked on a link.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Join keeps waiting past this, but logs which workers are still alive.
    #[serde(default = "default_join_warn_after_ms")]
    pub join_warn_after_ms: u64,
}

impl ManagerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn join_warn_after(&self) -> Duration {
        Duration::from_millis(self.join_warn_after_ms)
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            link_capacity: None,
            poll_interval_ms: default_poll_interval_ms(),
            join_warn_after_ms: default_join_warn_after_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_join_warn_after_ms() -> u64 {
    2_000
}

//==================================================================================
// III. Logging Settings (the diagnostics stage, always index 0)
//==================================================================================

/// Name of the section configuring the diagnostics stage.
pub const LOGGING_SECTION: &str = "logging";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Maximum level, e.g. `"debug"` or `"warn"` (case-insensitive).
    #[serde(default = "default_level")]
    pub level: LevelFilter,

    /// If set, application log lines go to this file instead of stderr.
    #[serde(default)]
    pub app_log_filename: Option<PathBuf>,

    /// Append to an existing log file rather than truncating it.
    #[serde(default = "default_true")]
    pub append: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            app_log_filename: None,
            append: true,
        }
    }
}

fn default_level() -> LevelFilter {
    LevelFilter::Info
}

/// Helper for `serde` to default a boolean field to true.
fn default_true() -> bool {
    true
}
