//! Device-type templates and class entities loaded from the datamodel tree.
//!
//! ```text
//! datamodel/
//!   classes/     JSON-LD entities posted to the broker by `/init`
//!   devices/     Orion-LD device templates, one `<Type>.json` each
//!   iotdevices/  IoT agent device templates
//! ```

mod entity;
mod template;

pub use template::{DeviceTemplate, IotDeviceTemplate, PropertyKind, PropertyRole, PropertySpec};

use crate::config::DatamodelConfig;
use crate::forms::FormData;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum DatamodelError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("template {path} is invalid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("template {0} declares no id property")]
    MissingIdProperty(PathBuf),
    #[error("template {path} declares {count} id properties, expected one")]
    DuplicateIdProperty { path: PathBuf, count: usize },
    #[error("no template for device type '{0}'")]
    UnknownType(String),
    #[error("form data has no value for id property '{0}'")]
    MissingId(String),
}

#[derive(Debug, Clone)]
pub struct Datamodel {
    devices: BTreeMap<String, DeviceTemplate>,
    iotdevices: BTreeMap<String, IotDeviceTemplate>,
    class_files: Vec<PathBuf>,
    context: Vec<String>,
}

impl Datamodel {
    pub fn load(config: &DatamodelConfig) -> Result<Self, DatamodelError> {
        let root = &config.root;

        let mut devices = BTreeMap::new();
        for path in list_files(&root.join(&config.devices), &["json"])? {
            let template: DeviceTemplate = read_template(&path)?;
            let path = check_id_count(path, template.id_count())?;
            devices.insert(file_key(&path), template);
        }

        let mut iotdevices = BTreeMap::new();
        for path in list_files(&root.join(&config.iotdevices), &["json"])? {
            let template: IotDeviceTemplate = read_template(&path)?;
            let path = check_id_count(path, template.id_count())?;
            iotdevices.insert(file_key(&path), template);
        }

        let class_files = list_files(&root.join(&config.classes), &["json", "jsonld"])?;

        info!(
            devices = devices.len(),
            iotdevices = iotdevices.len(),
            classes = class_files.len(),
            root = %root.display(),
            "datamodel loaded"
        );

        Ok(Self {
            devices,
            iotdevices,
            class_files,
            context: config.context.clone(),
        })
    }

    /// Orion-LD device type keys (template file names), sorted.
    pub fn device_types(&self) -> Vec<&str> {
        self.devices.keys().map(String::as_str).collect()
    }

    pub fn iotdevice_types(&self) -> Vec<&str> {
        self.iotdevices.keys().map(String::as_str).collect()
    }

    pub fn class_files(&self) -> &[PathBuf] {
        &self.class_files
    }

    /// Class names, i.e. the entity types registered by `/init`.
    pub fn classes(&self) -> Vec<String> {
        self.class_files
            .iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .map(type_name)
            .map(str::to_string)
            .collect()
    }

    pub fn context(&self) -> &[String] {
        &self.context
    }

    pub fn device_template(&self, key: &str) -> Result<&DeviceTemplate, DatamodelError> {
        self.devices
            .get(key)
            .ok_or_else(|| DatamodelError::UnknownType(key.to_string()))
    }

    pub fn iot_template(&self, key: &str) -> Result<&IotDeviceTemplate, DatamodelError> {
        self.iotdevices
            .get(key)
            .ok_or_else(|| DatamodelError::UnknownType(key.to_string()))
    }

    /// Resolve the template behind an NGSI-LD entity type.
    pub fn template_for_entity_type(
        &self,
        entity_type: &str,
    ) -> Result<&DeviceTemplate, DatamodelError> {
        self.devices
            .iter()
            .find(|(key, template)| {
                template.entity_type == entity_type || type_name(key) == entity_type
            })
            .map(|(_, template)| template)
            .ok_or_else(|| DatamodelError::UnknownType(entity_type.to_string()))
    }

    pub fn create_entity(&self, key: &str, data: &FormData) -> Result<Value, DatamodelError> {
        let template = self.device_template(key)?;
        entity::build_entity(template, data, &self.context)
    }

    pub fn entity_update(&self, template: &DeviceTemplate, data: &FormData) -> Value {
        entity::build_update(template, data)
    }

    pub fn create_iot_device(&self, key: &str, data: &FormData) -> Result<Value, DatamodelError> {
        let template = self.iot_template(key)?;
        entity::build_iot_device(template, data)
    }
}

/// Display name of a type key: everything before the first `.`.
pub fn type_name(key: &str) -> &str {
    key.split('.').next().unwrap_or(key)
}

/// NGSI-LD entity id for a device, unless the value already is a URN.
pub fn entity_id(entity_type: &str, id: &str) -> String {
    if id.starts_with("urn:") {
        id.to_string()
    } else {
        format!("urn:ngsi-ld:{entity_type}:{id}")
    }
}

fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, DatamodelError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "datamodel directory missing");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(DatamodelError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| DatamodelError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.contains(&ext));
        if path.is_file() && matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_template<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, DatamodelError> {
    let raw = std::fs::read_to_string(path).map_err(|source| DatamodelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| DatamodelError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn check_id_count(path: PathBuf, count: usize) -> Result<PathBuf, DatamodelError> {
    match count {
        1 => Ok(path),
        0 => Err(DatamodelError::MissingIdProperty(path)),
        count => Err(DatamodelError::DuplicateIdProperty { path, count }),
    }
}

fn file_key(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
