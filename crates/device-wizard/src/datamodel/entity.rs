use super::template::{DeviceTemplate, IotDeviceTemplate, PropertyKind, PropertySpec};
use super::{entity_id, DatamodelError};
use crate::forms::{FieldValue, FormData};
use serde_json::{json, Map, Value};

fn attribute(property: &PropertySpec, value: &FieldValue) -> Value {
    match (&property.kind, value) {
        (PropertyKind::Relationship { .. }, _) => json!({
            "type": "Relationship",
            "object": value.to_json(),
        }),
        (_, FieldValue::DateTime(_)) => json!({
            "type": "Property",
            "value": { "@type": "DateTime", "@value": value.to_string() },
        }),
        _ => {
            let mut attr = json!({ "type": "Property", "value": value.to_json() });
            if let Some(unit) = &property.unit {
                attr["unitCode"] = Value::String(unit.clone());
            }
            attr
        }
    }
}

fn id_value(property: Option<&PropertySpec>, data: &FormData) -> Result<String, DatamodelError> {
    let name = property.map(|p| p.name.clone()).unwrap_or_else(|| "id".to_string());
    match data.get(&name) {
        Some(FieldValue::Boolean(_)) | None => Err(DatamodelError::MissingId(name)),
        Some(value) => {
            let id = value.to_string();
            if id.is_empty() {
                Err(DatamodelError::MissingId(name))
            } else {
                Ok(id)
            }
        }
    }
}

fn attributes(properties: &[PropertySpec], data: &FormData) -> Map<String, Value> {
    properties
        .iter()
        .filter(|property| !property.is_id())
        .filter_map(|property| {
            data.get(&property.name)
                .map(|value| (property.name.clone(), attribute(property, value)))
        })
        .collect()
}

/// NGSI-LD entity for a freshly registered device.
pub(crate) fn build_entity(
    template: &DeviceTemplate,
    data: &FormData,
    context: &[String],
) -> Result<Value, DatamodelError> {
    let id = id_value(template.id_property(), data)?;

    let mut entity = Map::new();
    entity.insert(
        "id".to_string(),
        Value::String(entity_id(&template.entity_type, &id)),
    );
    entity.insert(
        "type".to_string(),
        Value::String(template.entity_type.clone()),
    );
    entity.extend(attributes(&template.properties, data));
    entity.insert("@context".to_string(), json!(context));
    Ok(Value::Object(entity))
}

/// Body for `POST /entities/{id}/attrs`.
pub(crate) fn build_update(template: &DeviceTemplate, data: &FormData) -> Value {
    Value::Object(attributes(&template.properties, data))
}

/// Device document for the IoT agent's `POST /iot/devices`.
pub(crate) fn build_iot_device(
    template: &IotDeviceTemplate,
    data: &FormData,
) -> Result<Value, DatamodelError> {
    let device_id = id_value(template.id_property(), data)?;

    let static_attributes: Vec<Value> = template
        .fields
        .iter()
        .filter(|field| !field.is_id())
        .filter_map(|field| {
            data.get(&field.name).map(|value| {
                json!({
                    "name": field.name,
                    "type": field.kind.agent_type(),
                    "value": value.to_json(),
                })
            })
        })
        .collect();

    let mut device = json!({
        "device_id": device_id,
        "entity_name": entity_id(&template.entity_type, &device_id),
        "entity_type": template.entity_type,
        "transport": template.transport,
        "protocol": template.protocol,
        "attributes": template.attributes,
        "commands": template.commands,
        "static_attributes": static_attributes,
    });
    if let Some(apikey) = &template.apikey {
        device["apikey"] = Value::String(apikey.clone());
    }
    Ok(device)
}
