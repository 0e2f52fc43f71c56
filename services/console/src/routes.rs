use crate::infra::AppState;
use crate::pages;
use crate::session::{self, require_login};
use crate::views::{self, Chrome};
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{middleware, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use device_wizard::auth::OperatorIdentity;
use serde_json::json;
use std::sync::atomic::Ordering;

pub(crate) fn router(state: AppState) -> Router {
    let console_pages = Router::new()
        .route("/", get(pages::root))
        .route("/dashboard", get(pages::dashboard))
        .route("/about", get(pages::about))
        .route("/help", get(pages::help))
        .route("/device", get(pages::device_page).post(pages::device_submit))
        .route(
            "/iotdevice",
            get(pages::iot_device_page).post(pages::iot_device_submit),
        )
        .route("/edit", get(pages::edit_page).post(pages::edit_submit))
        .route("/orion", get(pages::orion_devices))
        .route("/iotagent", get(pages::iot_agent_devices))
        .route("/iotagentapi", get(pages::iot_agent_table))
        .route("/delete", get(pages::delete_device))
        .route("/iotdelete", get(pages::delete_iot_device))
        .route("/init", get(pages::init_classes))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_login));

    Router::new()
        .merge(console_pages)
        .route("/login", get(session::login))
        .route("/oidc/callback", get(session::oidc_callback))
        .route("/logout", get(session::logout))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .fallback(not_found)
        .with_state(state)
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn not_found(State(state): State<AppState>, jar: CookieJar, uri: Uri) -> impl IntoResponse {
    let console = &state.console;
    let identity = session::operator(console, &jar)
        .await
        .unwrap_or_else(OperatorIdentity::anonymous);
    let chrome = Chrome {
        identity: &identity,
        account_url: &console.portal.account_url,
        fiware_service: &console.fiware_service,
    };
    (StatusCode::NOT_FOUND, Html(views::not_found(&chrome, uri.path())))
}
