//! Login gate for the console pages and the OIDC login round trip.

use crate::infra::{AppState, Console, SESSION_COOKIE};
use axum::extract::{Query, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use device_wizard::auth::OperatorIdentity;
use device_wizard::error::AppError;
use serde::Deserialize;
use tracing::{info, warn};

/// Operator behind the session cookie; everyone is the anonymous operator
/// when no identity provider is configured.
pub(crate) async fn operator(console: &Console, jar: &CookieJar) -> Option<OperatorIdentity> {
    if console.oidc.is_none() {
        return Some(OperatorIdentity::anonymous());
    }
    let cookie = jar.get(SESSION_COOKIE)?;
    console.sessions.get(cookie.value()).await
}

/// Resolves the operator for every protected request; unauthenticated
/// browsers are sent to `/login` with the requested path to come back to.
pub(crate) async fn require_login(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(identity) = operator(&state.console, &jar).await {
        request.extensions_mut().insert(identity);
        return next.run(request).await;
    }

    let return_to = request
        .uri()
        .path_and_query()
        .map(|target| target.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    Redirect::to(&format!("/login?next={}", urlencoding::encode(&return_to))).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginQuery {
    #[serde(default)]
    next: Option<String>,
}

/// Only same-site paths are accepted as post-login targets.
fn local_path(raw: Option<&str>) -> String {
    match raw {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/dashboard".to_string(),
    }
}

pub(crate) async fn login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<Redirect, AppError> {
    let return_to = local_path(query.next.as_deref());
    let Some(oidc) = state.console.oidc.as_ref() else {
        return Ok(Redirect::to(&return_to));
    };
    let url = oidc.authorization_url(&return_to).await?;
    Ok(Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CallbackQuery {
    code: String,
    state: String,
}

pub(crate) async fn oidc_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<(CookieJar, Redirect), AppError> {
    let console = &state.console;
    let Some(oidc) = console.oidc.as_ref() else {
        return Ok((jar, Redirect::to("/dashboard")));
    };

    let login = oidc.exchange_code(&query.code, &query.state).await?;
    let identity = OperatorIdentity::from(&login.profile);
    let session_id = console
        .sessions
        .create(identity, oidc.session_ttl_secs())
        .await;

    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    Ok((
        jar.add(cookie),
        Redirect::to(&local_path(Some(&login.return_to))),
    ))
}

pub(crate) async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    let console = &state.console;
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        console.sessions.remove(cookie.value()).await;
        info!("operator logged out");
    }

    let target = if !console.portal.logout_link.is_empty() {
        console.portal.logout_link.clone()
    } else if let Some(oidc) = console.oidc.as_ref() {
        oidc.end_session_url().await.unwrap_or_else(|| "/".to_string())
    } else {
        warn!("no logout link configured");
        "/".to_string()
    };

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    (jar, Redirect::to(&target))
}
