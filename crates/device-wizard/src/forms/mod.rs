//! HTML form definitions derived from device-type templates, and validation of
//! submitted form bodies into typed values.

mod service;

pub use service::{FormService, FormServiceError, TypeChoice};

use crate::datamodel::{PropertyKind, PropertySpec};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

const DATETIME_OUTPUT: &str = "%Y-%m-%dT%H:%M:%SZ";
const DATETIME_INPUTS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Text,
    Number,
    Integer,
    Checkbox,
    DateTime,
    Select,
}

impl InputKind {
    /// `type` attribute of the rendered `<input>`.
    pub const fn html_type(self) -> &'static str {
        match self {
            Self::Text | Self::Select => "text",
            Self::Number | Self::Integer => "number",
            Self::Checkbox => "checkbox",
            Self::DateTime => "datetime-local",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    pub name: String,
    pub label: String,
    pub input: InputKind,
    pub required: bool,
    pub readonly: bool,
    /// Current value as it should appear in the input.
    pub value: Option<String>,
    pub choices: Vec<String>,
}

impl FormField {
    pub fn from_property(property: &PropertySpec) -> Self {
        let (input, choices) = match &property.kind {
            PropertyKind::Text => (InputKind::Text, Vec::new()),
            PropertyKind::Number => (InputKind::Number, Vec::new()),
            PropertyKind::Integer => (InputKind::Integer, Vec::new()),
            PropertyKind::Boolean => (InputKind::Checkbox, Vec::new()),
            PropertyKind::Datetime => (InputKind::DateTime, Vec::new()),
            PropertyKind::Select { choices } => (InputKind::Select, choices.clone()),
            PropertyKind::Relationship { .. } => (InputKind::Select, Vec::new()),
        };
        let input = if property.name.ends_with("_datetime") {
            InputKind::DateTime
        } else {
            input
        };

        Self {
            name: property.name.clone(),
            label: property.label(),
            input,
            required: property.required,
            readonly: false,
            value: property.default.as_ref().map(display_value),
            choices,
        }
    }
}

/// Render a JSON value the way an input field shows it.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Form {
    pub title: String,
    pub fields: Vec<FormField>,
}

impl Form {
    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FormField> {
        self.fields.iter_mut().find(|field| field.name == name)
    }

    /// Validate a submitted body. Read-only fields keep their current value.
    pub fn validate(&self, submitted: &HashMap<String, String>) -> Result<FormData, FormErrors> {
        let mut data = FormData::default();
        let mut errors = FormErrors::default();

        for field in &self.fields {
            let raw = if field.readonly {
                field.value.clone()
            } else {
                submitted.get(&field.name).cloned()
            };
            let raw = raw.map(|value| value.trim().to_string()).unwrap_or_default();

            if field.input == InputKind::Checkbox {
                data.insert(&field.name, FieldValue::Boolean(parse_checkbox(&raw)));
                continue;
            }

            if raw.is_empty() {
                if field.required {
                    errors.push(&field.name, "This field is required.");
                }
                continue;
            }

            match parse_field(field, &raw) {
                Ok(value) => data.insert(&field.name, value),
                Err(message) => errors.push(&field.name, message),
            }
        }

        if errors.is_empty() {
            Ok(data)
        } else {
            Err(errors)
        }
    }

    /// Copy submitted values back into the form so a re-render keeps them.
    pub fn fill(&mut self, submitted: &HashMap<String, String>) {
        for field in self.fields.iter_mut().filter(|field| !field.readonly) {
            if let Some(value) = submitted.get(&field.name) {
                field.value = Some(value.clone());
            } else if field.input == InputKind::Checkbox {
                field.value = None;
            }
        }
    }
}

fn parse_checkbox(raw: &str) -> bool {
    matches!(
        raw.to_ascii_lowercase().as_str(),
        "y" | "yes" | "on" | "true" | "1"
    )
}

fn parse_field(field: &FormField, raw: &str) -> Result<FieldValue, String> {
    match field.input {
        InputKind::Text => Ok(FieldValue::Text(raw.to_string())),
        InputKind::Number => raw
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(FieldValue::Number)
            .ok_or_else(|| "Not a valid float value.".to_string()),
        InputKind::Integer => raw
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| "Not a valid integer value.".to_string()),
        InputKind::DateTime => parse_datetime(raw)
            .map(FieldValue::DateTime)
            .ok_or_else(|| "Not a valid datetime value.".to_string()),
        InputKind::Select => {
            if field.choices.iter().any(|choice| choice == raw) {
                Ok(FieldValue::Text(raw.to_string()))
            } else {
                Err("Not a valid choice.".to_string())
            }
        }
        InputKind::Checkbox => Ok(FieldValue::Boolean(parse_checkbox(raw))),
    }
}

/// Accepts browser `datetime-local` values (no zone, read as UTC) and RFC 3339.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    let raw = raw.trim_end_matches('Z');
    DATETIME_INPUTS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Integer(i64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
}

impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Number(number) => serde_json::Number::from_f64(*number)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Integer(number) => Value::from(*number),
            Self::Boolean(flag) => Value::Bool(*flag),
            Self::DateTime(_) => Value::String(self.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
            Self::Integer(number) => write!(f, "{number}"),
            Self::Boolean(flag) => write!(f, "{flag}"),
            Self::DateTime(at) => write!(f, "{}", at.format(DATETIME_OUTPUT)),
        }
    }
}

/// Validated values in form order; empty optional fields are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    values: Vec<(String, FieldValue)>,
}

impl FormData {
    pub fn insert(&mut self, name: &str, value: FieldValue) {
        match self.values.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    pub fields: Vec<(String, String)>,
}

impl FormErrors {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.fields.push((field.to_string(), message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn for_field<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(field, _)| field == name)
            .map(|(_, message)| message.as_str())
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .fields
            .iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect();
        f.write_str(&rendered.join("; "))
    }
}
