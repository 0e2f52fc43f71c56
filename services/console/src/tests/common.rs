use std::path::PathBuf;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use device_wizard::config::{
    DatamodelConfig, DeviceIdmConfig, FiwareConfig, OidcConfig, PlatformConfig, PortalConfig,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::infra::{AppState, Console};
use crate::routes::router;

pub(super) const REALM: &str = "devices";

/// One mock server standing in for the broker, the agent and the IDM.
pub(super) async fn platform() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orionld version": "1.4.0",
            "version": "1.26.0"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/realms/{REALM}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"realm": REALM})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/realms/{REALM}/protocol/openid-connect/token")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "admin-token",
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;
    server
}

pub(super) fn platform_config(server: &MockServer) -> PlatformConfig {
    PlatformConfig {
        fiware: FiwareConfig {
            orion: server.uri(),
            iotagent: server.uri(),
            timeout_secs: 5,
            ..FiwareConfig::default()
        },
        device_idm: DeviceIdmConfig {
            server: server.uri(),
            realm: REALM.to_string(),
            client_secret: "admin-secret".to_string(),
            ..DeviceIdmConfig::default()
        },
        datamodel: DatamodelConfig {
            root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../datamodel"),
            ..DatamodelConfig::default()
        },
        idm: PortalConfig {
            logout_link: "https://portal.example/logout".to_string(),
            account_url: String::new(),
        },
        oidc: None,
    }
}

pub(super) fn oidc_config(server: &MockServer) -> OidcConfig {
    OidcConfig {
        issuer: format!("{}/sso", server.uri()),
        client_id: "device-wizard".to_string(),
        client_secret: "s3cret".to_string(),
        redirect_uri: "http://localhost:8090/oidc/callback".to_string(),
        scopes: vec!["openid".to_string()],
        session_ttl_secs: 60,
    }
}

pub(super) fn app(config: &PlatformConfig) -> Router {
    let console = Console::from_platform(config).expect("console builds");
    router(AppState::new(console))
}

pub(super) fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request builds")
}

pub(super) fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

pub(super) fn location(response: &Response) -> &str {
    response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .expect("location header")
}

pub(super) async fn read_text(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    String::from_utf8(body.to_vec()).expect("utf8 body")
}
