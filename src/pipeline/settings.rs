// In: src/pipeline/settings.rs

//! Builds the Settings Bundle: one typed settings record per stage, derived
//! from a single configuration document and the host environment.
//!
//! The caller's document is never modified. Preparation works on an owned copy:
//! every object-valued section receives the five host handle fields, and every
//! module that requires host handles but has no section gets a synthetic one.
//! Each section is then deserialized on its own, so an error always names the
//! component and the offending field path.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::{
    HostEnvironment, LoggingSettings, ManagerSettings, LOGGING_SECTION, MANAGER_SECTION,
};
use crate::error::{ComponentError, MeterlineError};
use crate::pipeline::{Blueprint, BuiltStage, PendingStage};

/// The component name reported for errors that concern the whole document.
pub const DOCUMENT: &str = "<document>";

//==================================================================================
// 1. Document Preparation
//==================================================================================

/// Parses configuration text. Blank text is treated as an empty document.
pub fn parse_document(text: &str) -> Result<Value, MeterlineError> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(text).map_err(|err| MeterlineError::Configuration {
        component: DOCUMENT.to_string(),
        path: format!("line {} column {}", err.line(), err.column()),
        message: err.to_string(),
    })
}

/// Returns a copy of `document` with the host handles spliced in.
///
/// - Object sections gain `jvm`, `jinstance`, `jclazz`, `jmid`, `jniversion`.
/// - Scalar and array sections are left untouched.
/// - Names in `requires_host` that have no section get one holding only the handles.
pub fn prepare_document(
    document: &Value,
    host: &HostEnvironment,
    requires_host: &[&str],
) -> Result<Map<String, Value>, MeterlineError> {
    let Value::Object(sections) = document else {
        return Err(MeterlineError::Configuration {
            component: DOCUMENT.to_string(),
            path: ".".to_string(),
            message: format!(
                "expected an object of component sections, found {}",
                kind_of(document)
            ),
        });
    };

    let handles = host.to_fields();
    let mut prepared = sections.clone();

    for section in prepared.values_mut() {
        if let Value::Object(fields) = section {
            for (key, value) in &handles {
                fields.insert(key.clone(), value.clone());
            }
        }
    }

    for name in requires_host {
        if !prepared.contains_key(*name) {
            prepared.insert((*name).to_string(), Value::Object(handles.clone()));
        }
    }

    Ok(prepared)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Deserializes one section, reporting the failing field path.
pub fn parse_section<T: DeserializeOwned>(
    component: &str,
    section: &Value,
) -> Result<T, MeterlineError> {
    serde_path_to_error::deserialize(section).map_err(|err| MeterlineError::Configuration {
        component: component.to_string(),
        path: err.path().to_string(),
        message: err.inner().to_string(),
    })
}

//==================================================================================
// 2. The Bundle
//==================================================================================

/// The configured, not-yet-built record for one stage.
pub struct SettingsRecord {
    pub index: usize,
    pub name: &'static str,
    pending: PendingStage,
}

impl SettingsRecord {
    /// Runs the stage constructor. Consumes the record, so each record
    /// configures its stage exactly once.
    pub fn build(self) -> Result<BuiltStage, MeterlineError> {
        let SettingsRecord {
            index,
            name,
            pending,
        } = self;
        let stage = pending().map_err(|source: ComponentError| MeterlineError::ComponentInit {
            index,
            name: name.to_string(),
            source,
        })?;
        Ok(BuiltStage { index, name, stage })
    }
}

impl std::fmt::Debug for SettingsRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsRecord")
            .field("index", &self.index)
            .field("name", &self.name)
            .finish()
    }
}

/// Every settings record of a pipeline, index-aligned with its blueprint.
#[derive(Debug)]
pub struct SettingsBundle {
    pub manager: ManagerSettings,
    pub logging: LoggingSettings,
    pub records: Vec<SettingsRecord>,
}

impl SettingsBundle {
    pub fn build(
        document: &Value,
        host: &HostEnvironment,
        blueprint: &Blueprint,
    ) -> Result<Self, MeterlineError> {
        let requires_host = blueprint.requires_host();
        let sections = prepare_document(document, host, &requires_host)?;

        for name in sections.keys() {
            let known = name == MANAGER_SECTION
                || name == LOGGING_SECTION
                || blueprint.contains(name);
            if !known {
                log::debug!("Ignoring configuration section '{}': no such component", name);
            }
        }

        let manager = match sections.get(MANAGER_SECTION) {
            Some(section) => parse_section(MANAGER_SECTION, section)?,
            None => ManagerSettings::default(),
        };
        let logging = match sections.get(LOGGING_SECTION) {
            Some(section) => parse_section(LOGGING_SECTION, section)?,
            None => LoggingSettings::default(),
        };

        let empty = Value::Object(Map::new());
        let mut records = Vec::with_capacity(blueprint.len());
        for (position, spec) in blueprint.stages().iter().enumerate() {
            let section = sections.get(spec.name).unwrap_or(&empty);
            records.push(SettingsRecord {
                index: position + 1,
                name: spec.name,
                pending: spec.configure(section)?,
            });
        }

        Ok(Self {
            manager,
            logging,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HOST_HANDLE_FIELDS;
    use crate::error::ComponentError;
    use crate::pipeline::{Module, Stage, StageContext};
    use serde::Deserialize;
    use serde_json::json;

    fn host() -> HostEnvironment {
        HostEnvironment::new(0x7f00_0001, 0x7f00_0002, 0x7f00_0003, 0x7f00_0004, 0x10006)
    }

    #[derive(Deserialize, Debug)]
    struct SounderSettings {
        #[serde(default)]
        depth: u32,
    }

    struct Sounder;

    impl Stage for Sounder {
        fn run(self: Box<Self>, _ctx: StageContext) -> Result<(), ComponentError> {
            Ok(())
        }
    }

    impl Module for Sounder {
        const NAME: &'static str = "sounder";
        type Settings = SounderSettings;

        fn build(settings: SounderSettings) -> Result<Self, ComponentError> {
            if settings.depth > 10 {
                return Err("too deep".into());
            }
            Ok(Sounder)
        }
    }

    #[test]
    fn test_injection_into_objects_leaves_scalars_alone() {
        // 1. Arrange
        let document = json!({ "mod_a": { "x": 1 }, "mod_b": "ignored_scalar" });

        // 2. Act
        let prepared = prepare_document(&document, &host(), &["mod_a"]).unwrap();

        // 3. Assert
        let mod_a = prepared["mod_a"].as_object().unwrap();
        assert_eq!(mod_a["x"], json!(1));
        for name in HOST_HANDLE_FIELDS {
            assert!(mod_a.contains_key(name), "mod_a is missing '{}'", name);
        }
        assert_eq!(mod_a["jvm"], json!(0x7f00_0001u64));
        assert_eq!(mod_a["jniversion"], json!(0x10006));
        assert_eq!(mod_a.len(), 6);
        assert_eq!(prepared["mod_b"], json!("ignored_scalar"));
    }

    #[test]
    fn test_caller_document_is_not_mutated() {
        let document = json!({ "mod_a": { "x": 1 } });
        let before = document.clone();
        let _ = prepare_document(&document, &host(), &[]).unwrap();
        assert_eq!(document, before);
    }

    #[test]
    fn test_missing_host_sections_are_synthesised() {
        let prepared = prepare_document(&json!({}), &host(), &["process_host"]).unwrap();
        let section: HostEnvironment =
            serde_json::from_value(prepared["process_host"].clone()).unwrap();
        assert_eq!(section, host());
    }

    #[test]
    fn test_non_object_document_is_a_configuration_error() {
        let err = prepare_document(&json!([1, 2]), &host(), &[]).unwrap_err();
        assert!(matches!(
            err,
            MeterlineError::Configuration { ref component, .. } if component == DOCUMENT
        ));
    }

    #[test]
    fn test_blank_text_is_an_empty_document() {
        assert_eq!(parse_document("  ").unwrap(), json!({}));
        assert!(parse_document("{ not json").is_err());
    }

    #[test]
    fn test_mistyped_field_reports_component_and_path() {
        let err = parse_section::<SounderSettings>("sounder", &json!({ "depth": "deep" })).unwrap_err();
        match err {
            MeterlineError::Configuration {
                component, path, ..
            } => {
                assert_eq!(component, "sounder");
                assert_eq!(path, "depth");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bundle_is_index_aligned_with_the_blueprint() {
        let blueprint = Blueprint::default().then::<Sounder>();
        let bundle = SettingsBundle::build(
            &json!({ "sounder": { "depth": 2 }, "unknown": { "a": 1 } }),
            &host(),
            &blueprint,
        )
        .unwrap();

        assert_eq!(bundle.records.len(), 1);
        assert_eq!(bundle.records[0].index, 1);
        assert_eq!(bundle.records[0].name, "sounder");
        assert_eq!(bundle.manager, ManagerSettings::default());
    }

    #[test]
    fn test_constructor_failure_becomes_component_init_error() {
        let blueprint = Blueprint::default().then::<Sounder>();
        let mut bundle =
            SettingsBundle::build(&json!({ "sounder": { "depth": 99 } }), &host(), &blueprint)
                .unwrap();

        let record = bundle.records.remove(0);
        let err = record.build().unwrap_err();
        assert!(matches!(
            err,
            MeterlineError::ComponentInit { index: 1, ref name, .. } if name == "sounder"
        ));
    }
}
