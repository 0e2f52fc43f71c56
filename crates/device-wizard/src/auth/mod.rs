//! Operator login delegated to an OpenID Connect provider, plus the
//! in-memory session table the console keys by cookie.

mod oidc;

pub use oidc::{CompletedLogin, OidcClient, UserProfile};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("identity provider error: {0}")]
    Provider(String),
    #[error("unknown or reused login state")]
    InvalidState,
    #[error("login attempt expired")]
    Expired,
    #[error("id token nonce does not match the login attempt")]
    NonceMismatch,
}

/// The operator shown in the page header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorIdentity {
    pub user: String,
    pub fullname: String,
}

impl OperatorIdentity {
    pub fn anonymous() -> Self {
        Self {
            user: "operator".to_string(),
            fullname: "Local operator".to_string(),
        }
    }
}

impl From<&UserProfile> for OperatorIdentity {
    fn from(profile: &UserProfile) -> Self {
        Self {
            user: profile.username().to_string(),
            fullname: profile.fullname(),
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    identity: OperatorIdentity,
    expires_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    /// Start a session and return its id.
    pub async fn create(&self, identity: OperatorIdentity, ttl_secs: i64) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now().timestamp();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| session.expires_at > now);
        sessions.insert(
            id.clone(),
            Session {
                identity,
                expires_at: now + ttl_secs,
            },
        );
        id
    }

    /// Expired sessions are dropped on lookup.
    pub async fn get(&self, id: &str) -> Option<OperatorIdentity> {
        let now = Utc::now().timestamp();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(id) {
                Some(session) if session.expires_at > now => {
                    return Some(session.identity.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }
        self.sessions.write().await.remove(id);
        None
    }

    pub async fn remove(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }
}
