use super::{display_value, parse_datetime, Form, FormField, InputKind};
use crate::datamodel::{
    type_name, Datamodel, DatamodelError, DeviceTemplate, IotDeviceTemplate, PropertyKind,
    PropertySpec,
};
use crate::fiware::{FiwareError, OrionClient};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum FormServiceError {
    #[error(transparent)]
    Datamodel(#[from] DatamodelError),
    #[error(transparent)]
    Fiware(#[from] FiwareError),
}

/// Entry of the "select device type" page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeChoice {
    pub key: String,
    pub label: String,
}

impl TypeChoice {
    pub fn list(keys: &[&str]) -> Vec<Self> {
        keys.iter()
            .map(|key| Self {
                key: key.to_string(),
                label: type_name(key).to_string(),
            })
            .collect()
    }
}

/// Builds forms from templates, resolving relationship choices against the broker.
#[derive(Debug, Clone)]
pub struct FormService {
    orion: OrionClient,
}

impl FormService {
    pub fn new(orion: OrionClient) -> Self {
        Self { orion }
    }

    async fn field(&self, property: &PropertySpec) -> FormField {
        let mut field = FormField::from_property(property);
        if let PropertyKind::Relationship { class } = &property.kind {
            field.choices = self.relationship_choices(class).await;
        }
        field
    }

    async fn relationship_choices(&self, class: &str) -> Vec<String> {
        match self.orion.entities(class).await {
            Ok(entities) => entities
                .iter()
                .filter_map(|entity| entity.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
            Err(err) => {
                warn!(%class, error = %err, "relationship choices unavailable");
                Vec::new()
            }
        }
    }

    async fn fields(&self, properties: &[PropertySpec]) -> Vec<FormField> {
        let mut fields = Vec::with_capacity(properties.len());
        for property in properties {
            fields.push(self.field(property).await);
        }
        fields
    }

    pub async fn device_form(
        &self,
        datamodel: &Datamodel,
        key: &str,
    ) -> Result<(Form, DeviceTemplate), FormServiceError> {
        let template = datamodel.device_template(key)?.clone();
        let form = Form {
            title: type_name(key).to_string(),
            fields: self.fields(&template.properties).await,
        };
        Ok((form, template))
    }

    pub async fn iot_device_form(
        &self,
        datamodel: &Datamodel,
        key: &str,
    ) -> Result<(Form, IotDeviceTemplate), FormServiceError> {
        let template = datamodel.iot_template(key)?.clone();
        let form = Form {
            title: type_name(key).to_string(),
            fields: self.fields(&template.fields).await,
        };
        Ok((form, template))
    }

    /// Form for editing an existing entity, pre-filled with its current values.
    pub async fn entity_form(
        &self,
        datamodel: &Datamodel,
        entity_id: &str,
        entity_type: &str,
    ) -> Result<(Form, DeviceTemplate), FormServiceError> {
        let template = datamodel.template_for_entity_type(entity_type)?.clone();
        let entity = self.orion.entity(entity_id).await?;

        let mut fields = self.fields(&template.properties).await;
        for (field, property) in fields.iter_mut().zip(&template.properties) {
            if property.is_id() {
                field.readonly = true;
                field.value = Some(entity_id.to_string());
                continue;
            }
            if let Some(current) = entity.get(&property.name).and_then(current_value) {
                field.value = Some(match field.input {
                    InputKind::DateTime => parse_datetime(&current)
                        .map(|at| at.format("%Y-%m-%dT%H:%M:%S").to_string())
                        .unwrap_or(current),
                    _ => current,
                });
            }
        }

        Ok((
            Form {
                title: template.entity_type.clone(),
                fields,
            },
            template,
        ))
    }
}

/// Current value of an NGSI-LD attribute as shown in an input.
fn current_value(attribute: &Value) -> Option<String> {
    if let Some(object) = attribute.get("object") {
        return Some(display_value(object));
    }
    let value = attribute.get("value")?;
    match value.get("@value") {
        Some(inner) => Some(display_value(inner)),
        None => Some(display_value(value)),
    }
}
