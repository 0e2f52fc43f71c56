//! Per-device credentials in a Keycloak realm.
//!
//! Every registered device gets a realm user named after its lowercased
//! entity id, carrying the MQTT topic it may publish on as a user attribute.

use crate::config::DeviceIdmConfig;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

const PASSWORD_LENGTH: usize = 24;

#[derive(Debug, thiserror::Error)]
pub enum IdmError {
    #[error("identity service request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected payload from {url}: {source}")]
    Payload {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("identity service answered {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("device account '{0}' already exists")]
    Conflict(String),
    #[error("unable to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Credentials handed to the operator once, right after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceCredentials {
    pub username: String,
    pub password: String,
    pub topic: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserRepresentation {
    id: String,
}

#[derive(Debug, Clone)]
pub struct DeviceIdmClient {
    client: Client,
    config: DeviceIdmConfig,
}

impl DeviceIdmClient {
    pub fn new(config: &DeviceIdmConfig) -> Result<Self, IdmError> {
        let client = Client::builder()
            .user_agent(concat!("device-wizard/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(IdmError::Client)?;
        let mut config = config.clone();
        config.server = config.server.trim_end_matches('/').to_string();
        Ok(Self { client, config })
    }

    pub fn server(&self) -> &str {
        &self.config.server
    }

    fn realm_url(&self) -> String {
        format!("{}/realms/{}", self.config.server, self.config.realm)
    }

    fn users_url(&self) -> String {
        format!("{}/admin/realms/{}/users", self.config.server, self.config.realm)
    }

    /// MQTT username for a device.
    pub fn mqtt_user(entity_id: &str) -> String {
        entity_id.to_lowercase()
    }

    /// Topic a device publishes on: `{prefix}/{entity_type}/{mqtt user}`.
    pub fn create_topic(&self, entity_id: &str, entity_type: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.topic_prefix.trim_end_matches('/'),
            entity_type,
            Self::mqtt_user(entity_id)
        )
    }

    pub async fn is_active(&self) -> bool {
        let url = self.realm_url();
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, "identity service probe failed");
                false
            }
        }
    }

    async fn access_token(&self) -> Result<String, IdmError> {
        let url = format!("{}/protocol/openid-connect/token", self.realm_url());
        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|source| IdmError::Transport {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(IdmError::Status {
                url,
                status: response.status(),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|source| IdmError::Payload { url, source })?;
        Ok(token.access_token)
    }

    pub async fn create_entity(
        &self,
        entity_id: &str,
        entity_type: &str,
    ) -> Result<DeviceCredentials, IdmError> {
        let credentials = DeviceCredentials {
            username: Self::mqtt_user(entity_id),
            password: generate_password(),
            topic: self.create_topic(entity_id, entity_type),
        };

        let token = self.access_token().await?;
        let url = self.users_url();
        let payload = json!({
            "username": credentials.username,
            "enabled": true,
            "attributes": {
                "entity_id": [entity_id],
                "entity_type": [entity_type],
                "mqtt_topic": [credentials.topic],
            },
            "credentials": [{
                "type": "password",
                "value": credentials.password,
                "temporary": false,
            }],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .map_err(|source| IdmError::Transport {
                url: url.clone(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => {
                info!(username = %credentials.username, "device account created");
                Ok(credentials)
            }
            StatusCode::CONFLICT => Err(IdmError::Conflict(credentials.username)),
            status => Err(IdmError::Status { url, status }),
        }
    }

    /// Removing a device without an account is not an error.
    pub async fn delete_entity(&self, entity_id: &str) -> Result<(), IdmError> {
        let token = self.access_token().await?;
        let username = Self::mqtt_user(entity_id);
        let url = self.users_url();

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&[("username", username.as_str()), ("exact", "true")])
            .send()
            .await
            .map_err(|source| IdmError::Transport {
                url: url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(IdmError::Status {
                url,
                status: response.status(),
            });
        }
        let users: Vec<UserRepresentation> =
            response
                .json()
                .await
                .map_err(|source| IdmError::Payload {
                    url: url.clone(),
                    source,
                })?;

        let Some(user) = users.into_iter().next() else {
            warn!(%username, "no device account to remove");
            return Ok(());
        };

        let user_url = format!("{}/{}", url, user.id);
        let response = self
            .client
            .delete(&user_url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|source| IdmError::Transport {
                url: user_url.clone(),
                source,
            })?;

        match response.status() {
            status if status.is_success() || status == StatusCode::NOT_FOUND => {
                info!(%username, "device account removed");
                Ok(())
            }
            status => Err(IdmError::Status {
                url: user_url,
                status,
            }),
        }
    }
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> DeviceIdmClient {
        DeviceIdmClient::new(&DeviceIdmConfig {
            server: server.uri(),
            realm: "devices".to_string(),
            client_id: "wizard".to_string(),
            client_secret: "s3cret".to_string(),
            topic_prefix: "/devices/".to_string(),
        })
        .expect("client builds")
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/realms/devices/protocol/openid-connect/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn topic_and_user_are_lowercased() {
        let client = DeviceIdmClient::new(&DeviceIdmConfig::default()).expect("client builds");
        assert_eq!(
            client.create_topic("urn:ngsi-ld:Thermometer:T-1", "Thermometer"),
            "/devices/Thermometer/urn:ngsi-ld:thermometer:t-1"
        );
        assert_eq!(DeviceIdmClient::mqtt_user("ABC"), "abc");
    }

    #[test]
    fn generated_passwords_differ() {
        let first = generate_password();
        assert_eq!(first.len(), PASSWORD_LENGTH);
        assert_ne!(first, generate_password());
    }

    #[tokio::test]
    async fn is_active_follows_realm_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/realms/devices"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        assert!(client_for(&server).is_active().await);

        let missing = MockServer::start().await;
        assert!(!client_for(&missing).is_active().await);
    }

    #[tokio::test]
    async fn create_entity_registers_user_with_topic() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/admin/realms/devices/users"))
            .and(header("authorization", "Bearer tok"))
            .and(body_string_contains("\"username\":\"urn:ngsi-ld:room:r1\""))
            .and(body_string_contains("/devices/Room/urn:ngsi-ld:room:r1"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let credentials = client_for(&server)
            .create_entity("urn:ngsi-ld:Room:R1", "Room")
            .await
            .expect("account created");
        assert_eq!(credentials.username, "urn:ngsi-ld:room:r1");
        assert_eq!(credentials.topic, "/devices/Room/urn:ngsi-ld:room:r1");
        assert_eq!(credentials.password.len(), PASSWORD_LENGTH);
    }

    #[tokio::test]
    async fn create_entity_reports_conflict() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/admin/realms/devices/users"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .create_entity("dup", "Room")
            .await
            .expect_err("conflict surfaces");
        assert!(matches!(err, IdmError::Conflict(name) if name == "dup"));
    }

    #[tokio::test]
    async fn delete_entity_looks_up_user_then_deletes() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/admin/realms/devices/users"))
            .and(query_param("username", "ws-1"))
            .and(query_param("exact", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "u-42"}])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/admin/realms/devices/users/u-42"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .delete_entity("WS-1")
            .await
            .expect("account removed");
    }

    #[tokio::test]
    async fn malformed_user_lookup_is_a_payload_error() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/admin/realms/devices/users"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .delete_entity("ws-1")
            .await
            .expect_err("lookup body rejected");
        assert!(matches!(err, IdmError::Payload { .. }));
    }

    #[tokio::test]
    async fn delete_entity_without_account_is_ok() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/admin/realms/devices/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        client_for(&server)
            .delete_entity("ghost")
            .await
            .expect("nothing to remove");
    }
}
