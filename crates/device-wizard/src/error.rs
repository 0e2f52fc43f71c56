use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::datamodel::DatamodelError;
use crate::fiware::FiwareError;
use crate::forms::FormServiceError;
use crate::idm::IdmError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Datamodel(DatamodelError),
    Fiware(FiwareError),
    Idm(IdmError),
    Auth(AuthError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Datamodel(err) => write!(f, "datamodel error: {}", err),
            AppError::Fiware(err) => write!(f, "fiware error: {}", err),
            AppError::Idm(err) => write!(f, "identity service error: {}", err),
            AppError::Auth(err) => write!(f, "authentication error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Datamodel(err) => Some(err),
            AppError::Fiware(err) => Some(err),
            AppError::Idm(err) => Some(err),
            AppError::Auth(err) => Some(err),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Datamodel(DatamodelError::UnknownType(_)) => StatusCode::NOT_FOUND,
            AppError::Datamodel(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Fiware(_) | AppError::Idm(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<DatamodelError> for AppError {
    fn from(value: DatamodelError) -> Self {
        Self::Datamodel(value)
    }
}

impl From<FiwareError> for AppError {
    fn from(value: FiwareError) -> Self {
        Self::Fiware(value)
    }
}

impl From<IdmError> for AppError {
    fn from(value: IdmError) -> Self {
        Self::Idm(value)
    }
}

impl From<AuthError> for AppError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

impl From<FormServiceError> for AppError {
    fn from(value: FormServiceError) -> Self {
        match value {
            FormServiceError::Datamodel(err) => Self::Datamodel(err),
            FormServiceError::Fiware(err) => Self::Fiware(err),
        }
    }
}
