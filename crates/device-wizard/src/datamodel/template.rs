use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    Text,
    Number,
    Integer,
    Boolean,
    #[serde(alias = "date_time")]
    Datetime,
    Select { choices: Vec<String> },
    /// Points at an entity of another class; choices come from the broker.
    Relationship { class: String },
}

impl PropertyKind {
    /// Attribute type name used in IoT agent `static_attributes`.
    pub const fn agent_type(&self) -> &'static str {
        match self {
            Self::Text | Self::Select { .. } => "Text",
            Self::Number => "Number",
            Self::Integer => "Integer",
            Self::Boolean => "Boolean",
            Self::Datetime => "DateTime",
            Self::Relationship { .. } => "Relationship",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyRole {
    Id,
    Category,
}

/// One field of a device-type template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(flatten)]
    pub kind: PropertyKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub role: Option<PropertyRole>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl PropertySpec {
    pub fn label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.name.clone())
    }

    pub fn is_id(&self) -> bool {
        self.role == Some(PropertyRole::Id) || (self.role.is_none() && self.name == "id")
    }
}

fn id_property(properties: &[PropertySpec]) -> Option<&PropertySpec> {
    properties.iter().find(|property| property.is_id())
}

fn id_count(properties: &[PropertySpec]) -> usize {
    properties.iter().filter(|property| property.is_id()).count()
}

/// Orion-LD device type, stored under `devices/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceTemplate {
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub description: Option<String>,
    pub properties: Vec<PropertySpec>,
}

impl DeviceTemplate {
    pub fn id_property(&self) -> Option<&PropertySpec> {
        id_property(&self.properties)
    }

    pub fn id_count(&self) -> usize {
        id_count(&self.properties)
    }

    pub fn category_property(&self) -> Option<&PropertySpec> {
        self.properties
            .iter()
            .find(|property| property.role == Some(PropertyRole::Category))
    }

    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|property| property.name == name)
    }
}

/// IoT agent device type, stored under `iotdevices/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IotDeviceTemplate {
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub apikey: Option<String>,
    pub fields: Vec<PropertySpec>,
    #[serde(default)]
    pub attributes: Vec<Value>,
    #[serde(default)]
    pub commands: Vec<Value>,
}

fn default_transport() -> String {
    "MQTT".to_string()
}

fn default_protocol() -> String {
    "PDI-IoTA-UltraLight".to_string()
}

impl IotDeviceTemplate {
    pub fn id_property(&self) -> Option<&PropertySpec> {
        id_property(&self.fields)
    }

    pub fn id_count(&self) -> usize {
        id_count(&self.fields)
    }
}
