use super::{http_client, read_json, send_checked, trim_base, FiwareError};
use crate::config::FiwareConfig;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, LINK};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

const JSON_LD: &str = "application/ld+json";
const CORE_CONTEXT_LINK: &str = "<http://uri.etsi.org/ngsi-ld/v1/ngsi-ld-core-context.jsonld>; rel=\"http://www.w3.org/ns/json-ld#context\"; type=\"application/ld+json\"";

/// Client for an Orion-LD context broker.
#[derive(Debug, Clone)]
pub struct OrionClient {
    client: Client,
    url: String,
}

impl OrionClient {
    pub fn new(config: &FiwareConfig) -> Result<Self, FiwareError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: trim_base(&config.orion),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn entities_url(&self) -> String {
        format!("{}/ngsi-ld/v1/entities", self.url)
    }

    fn entity_url(&self, id: &str) -> String {
        format!("{}/{}", self.entities_url(), urlencoding::encode(id))
    }

    fn link_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_LD));
        headers.insert(LINK, HeaderValue::from_static(CORE_CONTEXT_LINK));
        headers
    }

    pub async fn create_entity(&self, entity: &Value) -> Result<(), FiwareError> {
        self.create_entity_raw(entity.to_string()).await
    }

    /// Post an already serialized JSON-LD document, e.g. a class file from disk.
    pub async fn create_entity_raw(&self, body: String) -> Result<(), FiwareError> {
        let url = self.entities_url();
        let request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, JSON_LD)
            .body(body);
        send_checked(&url, request).await?;
        info!(broker = %self.url, "entity created");
        Ok(())
    }

    pub async fn update_entity(&self, id: &str, attrs: &Value) -> Result<(), FiwareError> {
        let url = format!("{}/attrs", self.entity_url(id));
        let request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, JSON_LD)
            .body(attrs.to_string());
        send_checked(&url, request).await?;
        info!(%id, "entity attributes updated");
        Ok(())
    }

    pub async fn entities(&self, entity_type: &str) -> Result<Vec<Value>, FiwareError> {
        let url = self.entities_url();
        let request = self
            .client
            .get(&url)
            .headers(Self::link_headers())
            .query(&[("type", entity_type)]);
        let response = send_checked(&url, request).await?;
        read_json(&url, response).await
    }

    pub async fn entity(&self, id: &str) -> Result<Value, FiwareError> {
        let url = self.entity_url(id);
        let request = self.client.get(&url).header(CONTENT_TYPE, JSON_LD);
        let response = send_checked(&url, request).await?;
        read_json(&url, response).await
    }

    /// Deleting an entity the broker no longer knows is not an error.
    pub async fn delete_entity(&self, id: &str) -> Result<(), FiwareError> {
        let url = self.entity_url(id);
        let request = self.client.delete(&url).header(CONTENT_TYPE, JSON_LD);
        match send_checked(&url, request).await {
            Ok(_) => {
                info!(%id, "entity deleted");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                debug!(%id, "entity already absent");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn version(&self) -> Option<String> {
        let url = format!("{}/version", self.url);
        let response = match send_checked(&url, self.client.get(&url)).await {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "context broker version probe failed");
                return None;
            }
        };
        let body: Value = read_json(&url, response).await.ok()?;
        body.get("orionld version")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}
