//! Authorization-code login against an OpenID Connect provider (Keycloak, Auth0, ...).

use super::AuthError;
use crate::config::OidcConfig;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

const PENDING_TTL_SECS: i64 = 10 * 60;

#[derive(Debug, Clone, Deserialize)]
struct Discovery {
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
    #[serde(default)]
    end_session_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    nonce: Option<String>,
}

/// Nonce claim of a compact JWT. The token comes straight from the token
/// endpoint, so only the payload segment is read.
fn id_token_nonce(id_token: &str) -> Result<Option<String>, AuthError> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::Provider("malformed id token".to_string()))?;
    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| AuthError::Provider(format!("id token decode failed: {err}")))?;
    let claims: IdTokenClaims = serde_json::from_slice(&decoded)
        .map_err(|err| AuthError::Provider(format!("id token parse failed: {err}")))?;
    Ok(claims.nonce)
}

/// Claims the console shows about the logged-in operator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    pub sub: String,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
}

impl UserProfile {
    pub fn username(&self) -> &str {
        self.preferred_username.as_deref().unwrap_or(&self.sub)
    }

    pub fn fullname(&self) -> String {
        format!(
            "{} {}",
            self.given_name.as_deref().unwrap_or_default(),
            self.family_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}

#[derive(Debug)]
struct PendingLogin {
    pkce_verifier: String,
    nonce: String,
    return_to: String,
    expires_at: i64,
}

/// Result of a completed login.
#[derive(Debug, Clone)]
pub struct CompletedLogin {
    pub profile: UserProfile,
    pub return_to: String,
}

pub struct OidcClient {
    config: OidcConfig,
    http: Client,
    discovery: RwLock<Option<Discovery>>,
    pending: RwLock<HashMap<String, PendingLogin>>,
}

impl OidcClient {
    pub fn new(config: OidcConfig) -> Self {
        Self {
            config,
            http: Client::new(),
            discovery: RwLock::new(None),
            pending: RwLock::new(HashMap::new()),
        }
    }

    pub fn session_ttl_secs(&self) -> i64 {
        self.config.session_ttl_secs
    }

    async fn discover(&self) -> Result<Discovery, AuthError> {
        if let Some(cached) = self.discovery.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let url = format!(
            "{}/.well-known/openid-configuration",
            self.config.issuer.trim_end_matches('/')
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| AuthError::Provider(format!("discovery failed: {err}")))?;
        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "discovery failed: {}",
                response.status()
            )));
        }
        let discovery: Discovery = response
            .json()
            .await
            .map_err(|err| AuthError::Provider(format!("discovery parse failed: {err}")))?;

        *self.discovery.write().await = Some(discovery.clone());
        debug!(issuer = %self.config.issuer, "oidc discovery cached");
        Ok(discovery)
    }

    /// Provider URL to redirect the browser to; `return_to` is restored after login.
    pub async fn authorization_url(&self, return_to: &str) -> Result<String, AuthError> {
        let discovery = self.discover().await?;

        let state = uuid::Uuid::new_v4().to_string();
        let nonce = uuid::Uuid::new_v4().to_string();
        let verifier_bytes: [u8; 32] = rand::random();
        let pkce_verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(pkce_verifier.as_bytes()));

        let now = Utc::now().timestamp();
        {
            let mut pending = self.pending.write().await;
            pending.retain(|_, login| login.expires_at > now);
            pending.insert(
                state.clone(),
                PendingLogin {
                    pkce_verifier,
                    nonce: nonce.clone(),
                    return_to: return_to.to_string(),
                    expires_at: now + PENDING_TTL_SECS,
                },
            );
        }

        let scopes = self.config.scopes.join(" ");
        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&nonce={}&code_challenge={}&code_challenge_method=S256",
            discovery.authorization_endpoint,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(&state),
            urlencoding::encode(&nonce),
            urlencoding::encode(&challenge),
        ))
    }

    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<CompletedLogin, AuthError> {
        let pending = self
            .pending
            .write()
            .await
            .remove(state)
            .ok_or(AuthError::InvalidState)?;
        if pending.expires_at <= Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }

        let discovery = self.discover().await?;
        let response = self
            .http
            .post(&discovery.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code_verifier", pending.pkce_verifier.as_str()),
            ])
            .send()
            .await
            .map_err(|err| AuthError::Provider(format!("token exchange failed: {err}")))?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Provider(format!("token exchange failed: {body}")));
        }
        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|err| AuthError::Provider(format!("token parse failed: {err}")))?;
        if let Some(id_token) = tokens.id_token.as_deref() {
            if id_token_nonce(id_token)?.as_deref() != Some(pending.nonce.as_str()) {
                return Err(AuthError::NonceMismatch);
            }
        }

        let response = self
            .http
            .get(&discovery.userinfo_endpoint)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|err| AuthError::Provider(format!("userinfo failed: {err}")))?;
        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "userinfo failed: {}",
                response.status()
            )));
        }
        let profile: UserProfile = response
            .json()
            .await
            .map_err(|err| AuthError::Provider(format!("userinfo parse failed: {err}")))?;

        info!(user = %profile.username(), "operator logged in");
        Ok(CompletedLogin {
            profile,
            return_to: pending.return_to,
        })
    }

    /// Provider logout endpoint, when the discovery document advertises one.
    pub async fn end_session_url(&self) -> Option<String> {
        self.discover().await.ok()?.end_session_endpoint
    }
}
