//! Console page handlers: registration, editing, listings and deletion.

use crate::infra::{AppState, Console};
use crate::views::{self, Chrome, DashboardView, DeviceRow};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Extension, Form as FormBody};
use device_wizard::auth::OperatorIdentity;
use device_wizard::datamodel::DatamodelError;
use device_wizard::error::AppError;
use device_wizard::forms::{FormServiceError, TypeChoice};
use device_wizard::idm::DeviceIdmClient;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub(crate) struct TypesQuery {
    #[serde(default)]
    types: Option<String>,
}

impl TypesQuery {
    fn key(&self) -> Option<&str> {
        self.types.as_deref().filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct EditQuery {
    id: String,
    #[serde(rename = "type")]
    entity_type: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteQuery {
    device_id: String,
}

type Submitted = FormBody<HashMap<String, String>>;

fn chrome<'a>(console: &'a Console, identity: &'a OperatorIdentity) -> Chrome<'a> {
    Chrome {
        identity,
        account_url: &console.portal.account_url,
        fiware_service: &console.fiware_service,
    }
}

#[derive(Debug, Clone, Copy)]
enum Backend {
    Orion,
    IotAgent,
    Idm,
}

/// First backend that does not answer, rendered as an error page.
async fn unavailable(
    console: &Console,
    identity: &OperatorIdentity,
    backends: &[Backend],
) -> Option<Response> {
    for backend in backends {
        let (up, service, url) = match backend {
            Backend::Orion => (
                console.orion.version().await.is_some(),
                "Orion LD",
                console.orion.url(),
            ),
            Backend::IotAgent => (
                console.iotagent.version().await.is_some(),
                "IoT Agent",
                console.iotagent.url(),
            ),
            Backend::Idm => (
                console.idm.is_active().await,
                "Keycloak IDM",
                console.idm.server(),
            ),
        };
        if !up {
            warn!(%service, %url, "backend unavailable");
            let page = views::unavailable(&chrome(console, identity), service, url);
            return Some((StatusCode::SERVICE_UNAVAILABLE, Html(page)).into_response());
        }
    }
    None
}

fn wrong_type(console: &Console, identity: &OperatorIdentity) -> Response {
    let page = views::message(
        &chrome(console, identity),
        "Wrong device type",
        "The requested device type is not part of the data model.",
    );
    (StatusCode::NOT_FOUND, Html(page)).into_response()
}

fn unknown_device(console: &Console, identity: &OperatorIdentity, id: &str) -> Response {
    let page = views::message(
        &chrome(console, identity),
        "Unknown device",
        &format!("The broker has no device {id}."),
    );
    (StatusCode::NOT_FOUND, Html(page)).into_response()
}

fn action(path: &str, key: &str) -> String {
    format!("{path}?types={}", urlencoding::encode(key))
}

pub(crate) async fn root() -> Redirect {
    Redirect::to("/dashboard")
}

pub(crate) async fn dashboard(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
) -> Html<String> {
    let console = &state.console;
    let (orion_version, agent_version, idm_active) = tokio::join!(
        console.orion.version(),
        console.iotagent.version(),
        console.idm.is_active()
    );

    let registered_classes = match orion_version {
        Some(_) => {
            let mut total = 0;
            for class in console.datamodel.classes() {
                match console.orion.entities(&class).await {
                    Ok(entities) => total += entities.len(),
                    Err(err) => debug!(%class, error = %err, "class count unavailable"),
                }
            }
            Some(total)
        }
        None => None,
    };

    let view = DashboardView {
        orion_version,
        agent_version,
        idm_active,
        registered_classes,
        class_files: console.datamodel.class_files().len(),
    };
    Html(views::dashboard(&chrome(console, &identity), &view))
}

pub(crate) async fn about(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
) -> Html<String> {
    Html(views::about(&chrome(&state.console, &identity)))
}

pub(crate) async fn help(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
) -> Html<String> {
    Html(views::help(&chrome(&state.console, &identity)))
}

pub(crate) async fn device_page(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Query(query): Query<TypesQuery>,
) -> Result<Response, AppError> {
    let console = &state.console;
    if let Some(page) = unavailable(console, &identity, &[Backend::Orion, Backend::Idm]).await {
        return Ok(page);
    }
    let chrome = chrome(console, &identity);

    let Some(key) = query.key() else {
        let choices = TypeChoice::list(&console.datamodel.device_types());
        let page = views::select_type(&chrome, "Register device", "/device", &choices);
        return Ok(Html(page).into_response());
    };
    if console.datamodel.device_template(key).is_err() {
        return Ok(wrong_type(console, &identity));
    }

    let (form, _) = console.forms.device_form(&console.datamodel, key).await?;
    let page = views::form(&chrome, &form, &action("/device", key), "Register", None);
    Ok(Html(page).into_response())
}

pub(crate) async fn device_submit(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Query(query): Query<TypesQuery>,
    FormBody(body): Submitted,
) -> Result<Response, AppError> {
    let console = &state.console;
    if let Some(page) = unavailable(console, &identity, &[Backend::Orion, Backend::Idm]).await {
        return Ok(page);
    }
    let chrome = chrome(console, &identity);

    let Some(key) = query.key() else {
        return Ok(wrong_type(console, &identity));
    };
    if console.datamodel.device_template(key).is_err() {
        return Ok(wrong_type(console, &identity));
    }

    let (mut form, template) = console.forms.device_form(&console.datamodel, key).await?;
    let data = match form.validate(&body) {
        Ok(data) => data,
        Err(errors) => {
            form.fill(&body);
            let page = views::form(&chrome, &form, &action("/device", key), "Register", Some(&errors));
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(page)).into_response());
        }
    };

    let entity = console.datamodel.create_entity(key, &data)?;
    let entity_id = entity
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let page = match console.orion.create_entity(&entity).await {
        Ok(()) => {
            info!(%entity_id, user = %identity.user, "device registered");
            provisioned(console, &chrome, &form.title, &entity_id, &template.entity_type).await
        }
        Err(err) => {
            warn!(%entity_id, error = %err, "device registration failed");
            views::outcome(&chrome, &form.title, &entity_id, Some(&err.to_string()), None, None)
        }
    };
    Ok(Html(page).into_response())
}

/// Success page once the device exists, with the credentials when the IDM accepted them.
async fn provisioned(
    console: &Console,
    chrome: &Chrome<'_>,
    title: &str,
    entity_id: &str,
    entity_type: &str,
) -> String {
    match console.idm.create_entity(entity_id, entity_type).await {
        Ok(credentials) => views::outcome(chrome, title, entity_id, None, Some(&credentials), None),
        Err(err) => {
            warn!(%entity_id, error = %err, "device credentials not created");
            let warning = format!("Device credentials could not be created: {err}");
            views::outcome(chrome, title, entity_id, None, None, Some(&warning))
        }
    }
}

pub(crate) async fn iot_device_page(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Query(query): Query<TypesQuery>,
) -> Result<Response, AppError> {
    let console = &state.console;
    let backends = [Backend::Orion, Backend::IotAgent, Backend::Idm];
    if let Some(page) = unavailable(console, &identity, &backends).await {
        return Ok(page);
    }
    let chrome = chrome(console, &identity);

    let Some(key) = query.key() else {
        let choices = TypeChoice::list(&console.datamodel.iotdevice_types());
        let page = views::select_type(&chrome, "Register IoT device", "/iotdevice", &choices);
        return Ok(Html(page).into_response());
    };
    if console.datamodel.iot_template(key).is_err() {
        return Ok(wrong_type(console, &identity));
    }

    let (form, _) = console.forms.iot_device_form(&console.datamodel, key).await?;
    let page = views::form(&chrome, &form, &action("/iotdevice", key), "Register", None);
    Ok(Html(page).into_response())
}

pub(crate) async fn iot_device_submit(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Query(query): Query<TypesQuery>,
    FormBody(body): Submitted,
) -> Result<Response, AppError> {
    let console = &state.console;
    let backends = [Backend::Orion, Backend::IotAgent, Backend::Idm];
    if let Some(page) = unavailable(console, &identity, &backends).await {
        return Ok(page);
    }
    let chrome = chrome(console, &identity);

    let Some(key) = query.key() else {
        return Ok(wrong_type(console, &identity));
    };
    if console.datamodel.iot_template(key).is_err() {
        return Ok(wrong_type(console, &identity));
    }

    let (mut form, template) = console.forms.iot_device_form(&console.datamodel, key).await?;
    let data = match form.validate(&body) {
        Ok(data) => data,
        Err(errors) => {
            form.fill(&body);
            let page = views::form(&chrome, &form, &action("/iotdevice", key), "Register", Some(&errors));
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(page)).into_response());
        }
    };

    let device = console.datamodel.create_iot_device(key, &data)?;
    let entity_name = device
        .get("entity_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let page = match console.iotagent.create_device(&device).await {
        Ok(()) => {
            info!(%entity_name, user = %identity.user, "iot device registered");
            provisioned(console, &chrome, &form.title, &entity_name, &template.entity_type).await
        }
        Err(err) => {
            warn!(%entity_name, error = %err, "iot device registration failed");
            views::outcome(&chrome, &form.title, &entity_name, Some(&err.to_string()), None, None)
        }
    };
    Ok(Html(page).into_response())
}

fn edit_action(query: &EditQuery) -> String {
    format!(
        "/edit?id={}&type={}",
        urlencoding::encode(&query.id),
        urlencoding::encode(&query.entity_type)
    )
}

pub(crate) async fn edit_page(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Query(query): Query<EditQuery>,
) -> Result<Response, AppError> {
    let console = &state.console;
    if let Some(page) = unavailable(console, &identity, &[Backend::Orion]).await {
        return Ok(page);
    }

    let form = console
        .forms
        .entity_form(&console.datamodel, &query.id, &query.entity_type)
        .await;
    let (form, _) = match form {
        Ok(built) => built,
        Err(FormServiceError::Datamodel(DatamodelError::UnknownType(_))) => {
            return Ok(wrong_type(console, &identity))
        }
        Err(FormServiceError::Fiware(err)) if err.is_not_found() => {
            return Ok(unknown_device(console, &identity, &query.id))
        }
        Err(err) => return Err(err.into()),
    };

    let page = views::form(&chrome(console, &identity), &form, &edit_action(&query), "Save", None);
    Ok(Html(page).into_response())
}

pub(crate) async fn edit_submit(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Query(query): Query<EditQuery>,
    FormBody(body): Submitted,
) -> Result<Response, AppError> {
    let console = &state.console;
    if let Some(page) = unavailable(console, &identity, &[Backend::Orion]).await {
        return Ok(page);
    }
    let chrome = chrome(console, &identity);

    let form = console
        .forms
        .entity_form(&console.datamodel, &query.id, &query.entity_type)
        .await;
    let (mut form, template) = match form {
        Ok(built) => built,
        Err(FormServiceError::Datamodel(DatamodelError::UnknownType(_))) => {
            return Ok(wrong_type(console, &identity))
        }
        Err(FormServiceError::Fiware(err)) if err.is_not_found() => {
            return Ok(unknown_device(console, &identity, &query.id))
        }
        Err(err) => return Err(err.into()),
    };

    let data = match form.validate(&body) {
        Ok(data) => data,
        Err(errors) => {
            form.fill(&body);
            let page = views::form(&chrome, &form, &edit_action(&query), "Save", Some(&errors));
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(page)).into_response());
        }
    };

    let update = console.datamodel.entity_update(&template, &data);
    let page = match console.orion.update_entity(&query.id, &update).await {
        Ok(()) => {
            info!(entity_id = %query.id, user = %identity.user, "device updated");
            views::outcome(&chrome, &form.title, &query.id, None, None, None)
        }
        Err(err) => {
            warn!(entity_id = %query.id, error = %err, "device update failed");
            views::outcome(&chrome, &form.title, &query.id, Some(&err.to_string()), None, None)
        }
    };
    Ok(Html(page).into_response())
}

pub(crate) async fn orion_devices(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Query(query): Query<TypesQuery>,
) -> Result<Response, AppError> {
    let console = &state.console;
    if let Some(page) = unavailable(console, &identity, &[Backend::Orion, Backend::Idm]).await {
        return Ok(page);
    }
    let chrome = chrome(console, &identity);

    let Some(key) = query.key() else {
        let choices = TypeChoice::list(&console.datamodel.device_types());
        let page = views::select_type(&chrome, "Devices", "/orion", &choices);
        return Ok(Html(page).into_response());
    };

    let Ok(template) = console.datamodel.device_template(key) else {
        return Ok(wrong_type(console, &identity));
    };
    let entity_type = template.entity_type.as_str();
    let category = template
        .category_property()
        .map(|property| property.name.as_str());
    let rows = console
        .orion
        .entities(entity_type)
        .await?
        .iter()
        .filter_map(|entity| {
            let id = entity.get("id").and_then(Value::as_str)?;
            let kind = entity
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or(entity_type);
            Some(DeviceRow {
                id: id.to_string(),
                entity_type: kind.to_string(),
                category: category.and_then(|name| {
                    entity
                        .get(name)
                        .and_then(|attribute| attribute.get("value"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                }),
                mqtt_topic: console.idm.create_topic(id, kind),
                mqtt_user: DeviceIdmClient::mqtt_user(id),
                edit: Some(format!(
                    "/edit?id={}&type={}",
                    urlencoding::encode(id),
                    urlencoding::encode(kind)
                )),
                delete: format!("/delete?device_id={}", urlencoding::encode(id)),
            })
        })
        .collect::<Vec<_>>();

    let page = views::device_list(&chrome, entity_type, &rows);
    Ok(Html(page).into_response())
}

async fn iot_rows(console: &Console) -> Result<Vec<DeviceRow>, AppError> {
    let listing = console.iotagent.devices().await?;
    Ok(listing
        .devices
        .iter()
        .filter_map(|device| {
            let device_id = device.get("device_id").and_then(Value::as_str)?;
            let entity_name = device
                .get("entity_name")
                .and_then(Value::as_str)
                .unwrap_or(device_id);
            let entity_type = device
                .get("entity_type")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some(DeviceRow {
                id: device_id.to_string(),
                entity_type: entity_type.to_string(),
                category: None,
                mqtt_topic: console.idm.create_topic(entity_name, entity_type),
                mqtt_user: DeviceIdmClient::mqtt_user(entity_name),
                edit: None,
                delete: format!("/iotdelete?device_id={}", urlencoding::encode(device_id)),
            })
        })
        .collect())
}

pub(crate) async fn iot_agent_devices(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
) -> Result<Response, AppError> {
    let console = &state.console;
    let backends = [Backend::IotAgent, Backend::Idm];
    if let Some(page) = unavailable(console, &identity, &backends).await {
        return Ok(page);
    }

    let rows = iot_rows(console).await?;
    let page = views::device_list(&chrome(console, &identity), "IoT devices", &rows);
    Ok(Html(page).into_response())
}

pub(crate) async fn iot_agent_table(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let rows = iot_rows(&state.console).await?;
    Ok(Html(views::device_table(&rows)))
}

pub(crate) async fn delete_device(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Query(query): Query<DeleteQuery>,
) -> Result<Response, AppError> {
    let console = &state.console;
    if let Some(page) = unavailable(console, &identity, &[Backend::Orion, Backend::Idm]).await {
        return Ok(page);
    }

    console.orion.delete_entity(&query.device_id).await?;
    console.idm.delete_entity(&query.device_id).await?;
    info!(device_id = %query.device_id, user = %identity.user, "device deleted");
    Ok("true".into_response())
}

pub(crate) async fn delete_iot_device(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
    Query(query): Query<DeleteQuery>,
) -> Result<Response, AppError> {
    let console = &state.console;
    let backends = [Backend::IotAgent, Backend::Idm];
    if let Some(page) = unavailable(console, &identity, &backends).await {
        return Ok(page);
    }

    // Credentials are keyed by the entity the device reports to.
    let entity_name = match console.iotagent.device(&query.device_id).await {
        Ok(device) => device
            .get("entity_name")
            .and_then(Value::as_str)
            .unwrap_or(&query.device_id)
            .to_string(),
        Err(err) if err.is_not_found() => query.device_id.clone(),
        Err(err) => return Err(err.into()),
    };

    console.iotagent.delete_device(&query.device_id).await?;
    console.idm.delete_entity(&entity_name).await?;
    info!(device_id = %query.device_id, user = %identity.user, "iot device deleted");
    Ok("true".into_response())
}

pub(crate) async fn init_classes(
    State(state): State<AppState>,
    Extension(identity): Extension<OperatorIdentity>,
) -> Result<Response, AppError> {
    let console = &state.console;
    if let Some(page) = unavailable(console, &identity, &[Backend::Orion]).await {
        return Ok(page);
    }

    let files = console.datamodel.class_files();
    let mut created = 0;
    for file in files {
        let body = match tokio::fs::read_to_string(file).await {
            Ok(body) => body,
            Err(err) => {
                warn!(file = %file.display(), error = %err, "class file unreadable");
                continue;
            }
        };
        match console.orion.create_entity_raw(body).await {
            Ok(()) => created += 1,
            Err(err) => warn!(file = %file.display(), error = %err, "class entity not created"),
        }
    }
    info!(created, total = files.len(), "class entities initialised");

    let page = views::message(
        &chrome(console, &identity),
        "Initialise classes",
        &format!("Created {created} of {} class entities.", files.len()),
    );
    Ok(Html(page).into_response())
}
