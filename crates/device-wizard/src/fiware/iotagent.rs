use super::{http_client, read_json, send_checked, trim_base, FiwareError};
use crate::config::FiwareConfig;
use md5::{Digest, Md5};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Entity type identifier the agent uses for a service group: hex MD5 of the type name.
pub fn entity_type_hash(device_type: &str) -> String {
    let digest = Md5::digest(device_type.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Response of `GET /iot/devices`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub devices: Vec<Value>,
}

/// Client for a FIWARE IoT agent's provisioning API.
#[derive(Debug, Clone)]
pub struct IotAgentClient {
    client: Client,
    url: String,
    broker: String,
    headers: HeaderMap,
}

impl IotAgentClient {
    pub fn new(config: &FiwareConfig) -> Result<Self, FiwareError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in [
            ("fiware-service", &config.fiware_service),
            ("fiware-servicepath", &config.fiware_servicepath),
        ] {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: trim_base(&config.iotagent),
            broker: trim_base(&config.orion),
            headers,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn device_url(&self, id: &str) -> String {
        format!("{}/iot/devices/{}", self.url, urlencoding::encode(id))
    }

    /// Register a service group so devices of `device_type` can report with `api_key`.
    pub async fn create_service(&self, api_key: &str, device_type: &str) -> Result<(), FiwareError> {
        let url = format!("{}/iot/services", self.url);
        let payload = json!({
            "services": [{
                "apikey": api_key,
                "cbroker": self.broker,
                "entity_type": entity_type_hash(device_type),
                "resource": format!("/iot/{device_type}"),
            }]
        });
        let request = self.client.post(&url).headers(self.headers.clone()).json(&payload);
        send_checked(&url, request).await?;
        info!(%device_type, "service group provisioned");
        Ok(())
    }

    pub async fn create_device(&self, device: &Value) -> Result<(), FiwareError> {
        let url = format!("{}/iot/devices", self.url);
        let payload = json!({ "devices": [device] });
        let request = self.client.post(&url).headers(self.headers.clone()).json(&payload);
        send_checked(&url, request).await?;
        info!(device_id = ?device.get("device_id"), "device provisioned");
        Ok(())
    }

    pub async fn devices(&self) -> Result<DeviceList, FiwareError> {
        let url = format!("{}/iot/devices", self.url);
        let request = self.client.get(&url).headers(self.headers.clone());
        let response = send_checked(&url, request).await?;
        read_json(&url, response).await
    }

    pub async fn device(&self, id: &str) -> Result<Value, FiwareError> {
        let url = self.device_url(id);
        let request = self.client.get(&url).headers(self.headers.clone());
        let response = send_checked(&url, request).await?;
        read_json(&url, response).await
    }

    pub async fn delete_device(&self, id: &str) -> Result<(), FiwareError> {
        let url = self.device_url(id);
        let request = self.client.delete(&url).headers(self.headers.clone());
        match send_checked(&url, request).await {
            Ok(_) => {
                info!(%id, "device removed");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                debug!(%id, "device already absent");
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
                debug!(error = %err, "iot agent version probe failed");
                return None;
            }
        };
        let body: Value = read_json(&url, response).await.ok()?;
        body.get("version").and_then(Value::as_str).map(str::to_string)
    }
}
