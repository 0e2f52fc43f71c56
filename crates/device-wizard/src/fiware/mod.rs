//! Thin HTTP clients for the two FIWARE services the console talks to.
//!
//! Both clients share the same failure model: transport problems and non-2xx
//! answers surface as [`FiwareError`], while `version()` probes swallow every
//! failure and report `None` so that pages can show which backend is down.

mod iotagent;
mod orion;

pub use iotagent::{entity_type_hash, DeviceList, IotAgentClient};
pub use orion::OrionClient;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FiwareError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("unexpected payload from {url}: {source}")]
    Payload {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unable to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<Client, FiwareError> {
    Client::builder()
        .user_agent(concat!("device-wizard/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(FiwareError::Client)
}

/// Send the request and turn any non-2xx answer into [`FiwareError::Status`].
pub(crate) async fn send_checked(url: &str, request: RequestBuilder) -> Result<Response, FiwareError> {
    let response = request.send().await.map_err(|source| FiwareError::Transport {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(FiwareError::Status {
        url: url.to_string(),
        status,
        body,
    })
}

pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    url: &str,
    response: Response,
) -> Result<T, FiwareError> {
    response.json().await.map_err(|source| FiwareError::Payload {
        url: url.to_string(),
        source,
    })
}

pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

impl FiwareError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FiwareError::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}
