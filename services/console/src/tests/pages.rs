use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::*;

async fn mount_rooms(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/ngsi-ld/v1/entities"))
        .and(query_param("type", "Room"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "urn:ngsi-ld:Room:lab", "type": "Room"},
            {"id": "urn:ngsi-ld:Room:office", "type": "Room"}
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn root_redirects_to_dashboard() {
    let server = platform().await;
    let response = app(&platform_config(&server))
        .oneshot(get("/"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn dashboard_reports_versions_and_class_counts() {
    let server = platform().await;
    mount_rooms(&server).await;
    Mock::given(method("GET"))
        .and(path("/ngsi-ld/v1/entities"))
        .and(query_param("type", "Building"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": "urn:ngsi-ld:Building:main", "type": "Building"}])),
        )
        .mount(&server)
        .await;

    let response = app(&platform_config(&server))
        .oneshot(get("/dashboard"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_text(response).await;
    assert!(body.contains("<tr><th>Orion LD</th><td>1.4.0</td></tr>"));
    assert!(body.contains("<tr><th>IoT Agent</th><td>1.26.0</td></tr>"));
    assert!(body.contains("<tr><th>Keycloak IDM</th><td>active</td></tr>"));
    assert!(body.contains("<tr><th>Registered class entities</th><td>3</td></tr>"));
    assert!(body.contains("<tr><th>Class files</th><td>2</td></tr>"));
}

#[tokio::test]
async fn device_page_without_type_lists_device_types() {
    let server = platform().await;
    let response = app(&platform_config(&server))
        .oneshot(get("/device"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_text(response).await;
    assert!(body.contains(r#"href="/device?types=Thermometer.json""#));
    assert!(body.contains(r#"href="/device?types=SmartPlug.json""#));
}

#[tokio::test]
async fn unknown_device_type_is_reported() {
    let server = platform().await;
    let response = app(&platform_config(&server))
        .oneshot(get("/device?types=Toaster.json"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(read_text(response).await.contains("Wrong device type"));
}

#[tokio::test]
async fn unreachable_broker_renders_connection_page() {
    let server = platform().await;
    let broker = MockServer::start().await;
    let mut config = platform_config(&server);
    config.fiware.orion = broker.uri();

    let response = app(&config)
        .oneshot(get("/device"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let expected = format!("Could not connect to the Orion LD. URL: {}", broker.uri());
    assert!(read_text(response).await.contains(&expected));
}

#[tokio::test]
async fn inactive_idm_renders_connection_page() {
    let server = platform().await;
    let idm = MockServer::start().await;
    let mut config = platform_config(&server);
    config.device_idm.server = idm.uri();

    let response = app(&config)
        .oneshot(get("/orion"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let expected = format!("Could not connect to the Keycloak IDM. URL: {}", idm.uri());
    assert!(read_text(response).await.contains(&expected));
}

#[tokio::test]
async fn device_form_offers_relationship_choices() {
    let server = platform().await;
    mount_rooms(&server).await;

    let response = app(&platform_config(&server))
        .oneshot(get("/device?types=Thermometer.json"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_text(response).await;
    assert!(body.contains(r#"action="/device?types=Thermometer.json""#));
    assert!(body.contains(r#"<option value="urn:ngsi-ld:Room:office">"#));
    assert!(body.contains(r#"type="datetime-local" id="installed_datetime""#));
}

#[tokio::test]
async fn registering_a_device_creates_entity_and_credentials() {
    let server = platform().await;
    mount_rooms(&server).await;
    Mock::given(method("POST"))
        .and(path("/ngsi-ld/v1/entities"))
        .and(header("content-type", "application/ld+json"))
        .and(body_partial_json(json!({
            "id": "urn:ngsi-ld:Thermometer:th-7",
            "type": "Thermometer",
            "hasLocation": {"type": "Relationship", "object": "urn:ngsi-ld:Room:lab"}
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/admin/realms/{REALM}/users")))
        .and(header("authorization", "Bearer admin-token"))
        .and(body_partial_json(json!({"username": "urn:ngsi-ld:thermometer:th-7"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&platform_config(&server))
        .oneshot(post_form(
            "/device?types=Thermometer.json",
            "id=th-7&name=Lab+thermometer&category=sensor&temperature=19.5&hasLocation=urn%3Angsi-ld%3ARoom%3Alab",
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_text(response).await;
    assert!(body.contains("Device <code>urn:ngsi-ld:Thermometer:th-7</code> was saved."));
    assert!(body.contains("<code>urn:ngsi-ld:thermometer:th-7</code>"));
    assert!(body.contains("<code>/devices/Thermometer/urn:ngsi-ld:thermometer:th-7</code>"));
}

#[tokio::test]
async fn broker_rejection_is_shown_with_reason() {
    let server = platform().await;
    mount_rooms(&server).await;
    Mock::given(method("POST"))
        .and(path("/ngsi-ld/v1/entities"))
        .respond_with(ResponseTemplate::new(409).set_body_string("AlreadyExists"))
        .mount(&server)
        .await;

    let response = app(&platform_config(&server))
        .oneshot(post_form(
            "/device?types=Thermometer.json",
            "id=th-7&name=Lab&category=sensor",
        ))
        .await
        .expect("route executes");

    let body = read_text(response).await;
    assert!(body.contains("could not be saved"));
    assert!(body.contains("AlreadyExists"));
}

#[tokio::test]
async fn invalid_submission_rerenders_form_with_messages() {
    let server = platform().await;
    mount_rooms(&server).await;

    let response = app(&platform_config(&server))
        .oneshot(post_form(
            "/device?types=Thermometer.json",
            "id=th-7&temperature=warm",
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_text(response).await;
    assert!(body.contains("This field is required."));
    assert!(body.contains("Not a valid float value."));
    assert!(body.contains(r#"id="temperature" name="temperature" value="warm""#));
}

#[tokio::test]
async fn orion_listing_shows_mqtt_columns() {
    let server = platform().await;
    Mock::given(method("GET"))
        .and(path("/ngsi-ld/v1/entities"))
        .and(query_param("type", "Thermometer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "urn:ngsi-ld:Thermometer:th-7",
                "type": "Thermometer",
                "category": {"type": "Property", "value": "sensor"}
            }
        ])))
        .mount(&server)
        .await;

    let response = app(&platform_config(&server))
        .oneshot(get("/orion?types=Thermometer.json"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_text(response).await;
    assert!(body.contains("<td>Thermometer</td><td>sensor</td>"));
    assert!(body.contains("<code>/devices/Thermometer/urn:ngsi-ld:thermometer:th-7</code>"));
    assert!(body.contains("/edit?id=urn%3Angsi-ld%3AThermometer%3Ath-7&amp;type=Thermometer"));
    assert!(body.contains(r#"data-delete="/delete?device_id=urn%3Angsi-ld%3AThermometer%3Ath-7""#));
}

#[tokio::test]
async fn iot_agent_table_lists_agent_devices() {
    let server = platform().await;
    Mock::given(method("GET"))
        .and(path("/iot/devices"))
        .and(header("fiware-service", "openiot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "devices": [{
                "device_id": "ws-1",
                "entity_name": "urn:ngsi-ld:WeatherStation:ws-1",
                "entity_type": "WeatherStation"
            }]
        })))
        .mount(&server)
        .await;

    let response = app(&platform_config(&server))
        .oneshot(get("/iotagentapi"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_text(response).await;
    assert!(body.starts_with("<table"));
    assert!(body.contains("<td>ws-1</td>"));
    assert!(body.contains("<code>urn:ngsi-ld:weatherstation:ws-1</code>"));
    assert!(body.contains(r#"data-delete="/iotdelete?device_id=ws-1""#));
}

#[tokio::test]
async fn delete_removes_entity_and_account() {
    let server = platform().await;
    Mock::given(method("DELETE"))
        .and(path("/ngsi-ld/v1/entities/urn%3Angsi-ld%3AThermometer%3Ath-7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/admin/realms/{REALM}/users")))
        .and(query_param("username", "urn:ngsi-ld:thermometer:th-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "u-1"}])))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/admin/realms/{REALM}/users/u-1")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&platform_config(&server))
        .oneshot(get(
            "/delete?device_id=urn%3Angsi-ld%3AThermometer%3Ath-7",
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_text(response).await, "true");
}

#[tokio::test]
async fn init_posts_every_class_file() {
    let server = platform().await;
    Mock::given(method("POST"))
        .and(path("/ngsi-ld/v1/entities"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;

    let response = app(&platform_config(&server))
        .oneshot(get("/init"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(read_text(response).await.contains("Created 2 of 2 class entities."));
}

#[tokio::test]
async fn unknown_paths_render_not_found_page() {
    let server = platform().await;
    let response = app(&platform_config(&server))
        .oneshot(get("/nowhere"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(read_text(response).await.contains("There is nothing at /nowhere."));
}

#[tokio::test]
async fn probes_report_health_and_readiness() {
    let server = platform().await;
    let router = app(&platform_config(&server));

    let health = router
        .clone()
        .oneshot(get("/health"))
        .await
        .expect("route executes");
    assert_eq!(health.status(), StatusCode::OK);

    let ready = router.oneshot(get("/ready")).await.expect("route executes");
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(read_text(ready).await.contains("initializing"));
}

async fn mount_device_account(server: &MockServer, username: &str, user_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/admin/realms/{REALM}/users")))
        .and(query_param("username", username))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": user_id}])))
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/admin/realms/{REALM}/users/{user_id}")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn credentials_failure_still_reports_the_saved_device() {
    let server = platform().await;
    mount_rooms(&server).await;
    Mock::given(method("POST"))
        .and(path("/ngsi-ld/v1/entities"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/admin/realms/{REALM}/users")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let response = app(&platform_config(&server))
        .oneshot(post_form(
            "/device?types=Thermometer.json",
            "id=th-8&name=Lab&category=sensor",
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_text(response).await;
    assert!(body.contains("Device <code>urn:ngsi-ld:Thermometer:th-8</code> was saved."));
    assert!(body.contains(r#"<p class="warning">Device credentials could not be created"#));
    assert!(!body.contains("class=\"credentials\""));
}

#[tokio::test]
async fn iot_device_form_renders_template_fields() {
    let server = platform().await;
    let response = app(&platform_config(&server))
        .oneshot(get("/iotdevice?types=WeatherStation.json"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_text(response).await;
    assert!(body.contains(r#"action="/iotdevice?types=WeatherStation.json""#));
    assert!(body.contains(r#"name="device_id""#));
    assert!(body.contains(r#"name="altitude""#));
}

#[tokio::test]
async fn registering_an_iot_device_provisions_agent_and_credentials() {
    let server = platform().await;
    Mock::given(method("POST"))
        .and(path("/iot/devices"))
        .and(header("fiware-service", "openiot"))
        .and(body_string_contains(r#""device_id":"ws-9""#))
        .and(body_string_contains(
            r#""entity_name":"urn:ngsi-ld:WeatherStation:ws-9""#,
        ))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/admin/realms/{REALM}/users")))
        .and(body_partial_json(json!({"username": "urn:ngsi-ld:weatherstation:ws-9"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&platform_config(&server))
        .oneshot(post_form(
            "/iotdevice?types=WeatherStation.json",
            "device_id=ws-9&altitude=320",
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_text(response).await;
    assert!(body.contains("Device <code>urn:ngsi-ld:WeatherStation:ws-9</code> was saved."));
    assert!(body.contains(
        "<code>/devices/WeatherStation/urn:ngsi-ld:weatherstation:ws-9</code>"
    ));
}

#[tokio::test]
async fn agent_rejection_is_shown_without_credentials() {
    let server = platform().await;
    Mock::given(method("POST"))
        .and(path("/iot/devices"))
        .respond_with(ResponseTemplate::new(409).set_body_string("DUPLICATE_DEVICE_ID"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/admin/realms/{REALM}/users")))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let response = app(&platform_config(&server))
        .oneshot(post_form(
            "/iotdevice?types=WeatherStation.json",
            "device_id=ws-9",
        ))
        .await
        .expect("route executes");

    let body = read_text(response).await;
    assert!(body.contains("could not be saved"));
    assert!(body.contains("DUPLICATE_DEVICE_ID"));
}

#[tokio::test]
async fn edit_form_is_prefilled_from_the_broker() {
    let server = platform().await;
    mount_rooms(&server).await;
    Mock::given(method("GET"))
        .and(path("/ngsi-ld/v1/entities/urn%3Angsi-ld%3AThermometer%3Ath-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "urn:ngsi-ld:Thermometer:th-7",
            "type": "Thermometer",
            "name": {"type": "Property", "value": "Lab thermometer"},
            "hasLocation": {"type": "Relationship", "object": "urn:ngsi-ld:Room:office"}
        })))
        .mount(&server)
        .await;

    let response = app(&platform_config(&server))
        .oneshot(get(
            "/edit?id=urn%3Angsi-ld%3AThermometer%3Ath-7&type=Thermometer",
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_text(response).await;
    assert!(body.contains(r#"value="Lab thermometer""#));
    assert!(body.contains(r#"value="urn:ngsi-ld:Thermometer:th-7""#));
}

#[tokio::test]
async fn edit_submission_posts_attribute_update() {
    let server = platform().await;
    mount_rooms(&server).await;
    Mock::given(method("GET"))
        .and(path("/ngsi-ld/v1/entities/urn%3Angsi-ld%3AThermometer%3Ath-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "urn:ngsi-ld:Thermometer:th-7",
            "type": "Thermometer"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ngsi-ld/v1/entities/urn%3Angsi-ld%3AThermometer%3Ath-7/attrs"))
        .and(body_partial_json(json!({
            "name": {"type": "Property", "value": "Kitchen thermometer"},
            "temperature": {"type": "Property", "value": 21.0, "unitCode": "CEL"}
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&platform_config(&server))
        .oneshot(post_form(
            "/edit?id=urn%3Angsi-ld%3AThermometer%3Ath-7&type=Thermometer",
            "name=Kitchen+thermometer&category=sensor&temperature=21",
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(read_text(response)
        .await
        .contains("Device <code>urn:ngsi-ld:Thermometer:th-7</code> was saved."));
}

#[tokio::test]
async fn editing_a_missing_device_is_not_found() {
    let server = platform().await;
    let response = app(&platform_config(&server))
        .oneshot(get(
            "/edit?id=urn%3Angsi-ld%3AThermometer%3Aghost&type=Thermometer",
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(read_text(response)
        .await
        .contains("The broker has no device urn:ngsi-ld:Thermometer:ghost."));
}

#[tokio::test]
async fn iot_agent_page_lists_devices_with_delete_links() {
    let server = platform().await;
    Mock::given(method("GET"))
        .and(path("/iot/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "devices": [{
                "device_id": "ws-1",
                "entity_name": "urn:ngsi-ld:WeatherStation:ws-1",
                "entity_type": "WeatherStation"
            }]
        })))
        .mount(&server)
        .await;

    let response = app(&platform_config(&server))
        .oneshot(get("/iotagent"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_text(response).await;
    assert!(body.contains("<html"));
    assert!(body.contains("<td>ws-1</td><td>WeatherStation</td>"));
    assert!(body.contains(r#"data-delete="/iotdelete?device_id=ws-1""#));
}

#[tokio::test]
async fn iot_delete_removes_the_account_of_the_entity_name() {
    let server = platform().await;
    Mock::given(method("GET"))
        .and(path("/iot/devices/ws-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_id": "ws-1",
            "entity_name": "urn:ngsi-ld:WeatherStation:ws-1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/iot/devices/ws-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    mount_device_account(&server, "urn:ngsi-ld:weatherstation:ws-1", "u-9").await;

    let response = app(&platform_config(&server))
        .oneshot(get("/iotdelete?device_id=ws-1"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_text(response).await, "true");
}

#[tokio::test]
async fn iot_delete_of_unknown_device_falls_back_to_its_id() {
    let server = platform().await;
    Mock::given(method("GET"))
        .and(path("/iot/devices/ws-2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/iot/devices/ws-2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    mount_device_account(&server, "ws-2", "u-2").await;

    let response = app(&platform_config(&server))
        .oneshot(get("/iotdelete?device_id=ws-2"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_text(response).await, "true");
}

#[tokio::test]
async fn orion_listing_queries_the_declared_entity_type() {
    let server = platform().await;
    let datamodel = tempfile::tempdir().expect("temp dir");
    let devices = datamodel.path().join("devices");
    std::fs::create_dir_all(&devices).expect("create devices dir");
    std::fs::write(
        devices.join("Thermo.json"),
        r#"{"type": "Thermometer", "properties": [{"name": "id", "kind": "text", "role": "id"}]}"#,
    )
    .expect("write template");
    Mock::given(method("GET"))
        .and(path("/ngsi-ld/v1/entities"))
        .and(query_param("type", "Thermometer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "urn:ngsi-ld:Thermometer:t1", "type": "Thermometer"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = platform_config(&server);
    config.datamodel.root = datamodel.path().to_path_buf();
    let response = app(&config)
        .oneshot(get("/orion?types=Thermo.json"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_text(response).await;
    assert!(body.contains("<td>urn:ngsi-ld:Thermometer:t1</td><td>Thermometer</td>"));
    assert!(body.contains("<code>/devices/Thermometer/urn:ngsi-ld:thermometer:t1</code>"));
}
