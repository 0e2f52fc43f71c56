use device_wizard::config::{DatamodelConfig, FiwareConfig};
use device_wizard::datamodel::Datamodel;
use device_wizard::fiware::OrionClient;
use device_wizard::forms::{FieldValue, FormService, InputKind};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn shipped_datamodel() -> Datamodel {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../datamodel");
    Datamodel::load(&DatamodelConfig {
        root,
        ..DatamodelConfig::default()
    })
    .expect("shipped datamodel loads")
}

async fn broker_with_rooms() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ngsi-ld/v1/entities"))
        .and(query_param("type", "Room"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "urn:ngsi-ld:Room:lab", "type": "Room"},
            {"id": "urn:ngsi-ld:Room:office", "type": "Room"}
        ])))
        .mount(&server)
        .await;
    server
}

fn orion_for(server: &MockServer) -> OrionClient {
    OrionClient::new(&FiwareConfig {
        orion: server.uri(),
        ..FiwareConfig::default()
    })
    .expect("client builds")
}

fn body(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[test]
fn shipped_datamodel_lists_types_and_classes() {
    let datamodel = shipped_datamodel();
    assert_eq!(
        datamodel.device_types(),
        vec!["SmartPlug.json", "Thermometer.json"]
    );
    assert_eq!(datamodel.iotdevice_types(), vec!["WeatherStation.json"]);
    assert_eq!(datamodel.classes(), vec!["Building", "Room"]);
}

#[tokio::test]
async fn device_form_resolves_relationships_and_builds_entity() {
    let server = broker_with_rooms().await;
    let datamodel = shipped_datamodel();
    let forms = FormService::new(orion_for(&server));

    let (form, template) = forms
        .device_form(&datamodel, "Thermometer.json")
        .await
        .expect("form builds");
    assert_eq!(form.title, "Thermometer");
    assert_eq!(template.entity_type, "Thermometer");

    let location = form.field("hasLocation").expect("relationship field");
    assert_eq!(location.input, InputKind::Select);
    assert_eq!(
        location.choices,
        vec!["urn:ngsi-ld:Room:lab", "urn:ngsi-ld:Room:office"]
    );

    let data = form
        .validate(&body(&[
            ("id", "th-7"),
            ("name", "Lab thermometer"),
            ("category", "sensor"),
            ("temperature", "19"),
            ("installed_datetime", "2024-02-03T10:00"),
            ("hasLocation", "urn:ngsi-ld:Room:lab"),
        ]))
        .expect("submission validates");
    assert_eq!(data.get("temperature"), Some(&FieldValue::Number(19.0)));

    let entity = datamodel
        .create_entity("Thermometer.json", &data)
        .expect("entity builds");
    assert_eq!(entity["id"], "urn:ngsi-ld:Thermometer:th-7");
    assert_eq!(entity["hasLocation"]["object"], "urn:ngsi-ld:Room:lab");
    assert_eq!(
        entity["installed_datetime"]["value"]["@value"],
        "2024-02-03T10:00:00Z"
    );
}

#[tokio::test]
async fn relationship_choices_fall_back_to_empty_when_broker_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ngsi-ld/v1/entities"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let datamodel = shipped_datamodel();
    let forms = FormService::new(orion_for(&server));
    let (form, _) = forms
        .device_form(&datamodel, "Thermometer.json")
        .await
        .expect("form still builds");

    assert!(form
        .field("hasLocation")
        .map(|field| field.choices.is_empty())
        .unwrap_or(false));
}

#[tokio::test]
async fn entity_form_prefills_current_values() {
    let server = broker_with_rooms().await;
    Mock::given(method("GET"))
        .and(path("/ngsi-ld/v1/entities/urn%3Angsi-ld%3AThermometer%3Ath-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "urn:ngsi-ld:Thermometer:th-7",
            "type": "Thermometer",
            "name": {"type": "Property", "value": "Lab thermometer"},
            "temperature": {"type": "Property", "value": 19.5, "unitCode": "CEL"},
            "installed_datetime": {"type": "Property", "value": {"@type": "DateTime", "@value": "2024-02-03T10:00:00Z"}},
            "hasLocation": {"type": "Relationship", "object": "urn:ngsi-ld:Room:office"}
        })))
        .mount(&server)
        .await;

    let datamodel = shipped_datamodel();
    let forms = FormService::new(orion_for(&server));
    let (form, template) = forms
        .entity_form(&datamodel, "urn:ngsi-ld:Thermometer:th-7", "Thermometer")
        .await
        .expect("edit form builds");

    let id = form.field("id").expect("id field");
    assert!(id.readonly);
    assert_eq!(id.value.as_deref(), Some("urn:ngsi-ld:Thermometer:th-7"));
    assert_eq!(
        form.field("temperature").and_then(|f| f.value.as_deref()),
        Some("19.5")
    );
    assert_eq!(
        form.field("installed_datetime").and_then(|f| f.value.as_deref()),
        Some("2024-02-03T10:00:00")
    );
    assert_eq!(
        form.field("hasLocation").and_then(|f| f.value.as_deref()),
        Some("urn:ngsi-ld:Room:office")
    );

    let data = form
        .validate(&body(&[
            ("name", "Renamed"),
            ("category", "sensor"),
            ("hasLocation", "urn:ngsi-ld:Room:lab"),
        ]))
        .expect("edit validates");
    let update = datamodel.entity_update(&template, &data);
    assert!(update.get("id").is_none());
    assert_eq!(update["name"]["value"], "Renamed");
    assert_eq!(update["hasLocation"]["object"], "urn:ngsi-ld:Room:lab");
}
