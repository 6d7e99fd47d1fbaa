//! Top-level error for the binary and for handlers that sit outside the loyalty router.

use crate::config::ConfigError;
use crate::loyalty::router::service_error_status;
use crate::loyalty::{LoyaltyServiceError, TierError, TransactionImportError};
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
    Import(TransactionImportError),
    Tier(TierError),
    Service(LoyaltyServiceError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Import(TransactionImportError::Service(err)) | AppError::Service(err) => {
                service_error_status(err)
            }
            AppError::Import(_) => StatusCode::BAD_REQUEST,
            AppError::Tier(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "invalid configuration: {}", err),
            AppError::Telemetry(err) => write!(f, "could not start logging: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "http server failed: {}", err),
            AppError::Import(err) => write!(f, "{}", err),
            AppError::Tier(err) => write!(f, "invalid tier ladder: {}", err),
            AppError::Service(err) => write!(f, "{}", err),
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
            AppError::Import(err) => Some(err),
            AppError::Tier(err) => Some(err),
            AppError::Service(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

macro_rules! app_error_from {
    ($($source:ty => $variant:ident),+ $(,)?) => {
        $(impl From<$source> for AppError {
            fn from(value: $source) -> Self {
                Self::$variant(value)
            }
        })+
    };
}

app_error_from!(
    ConfigError => Config,
    TelemetryError => Telemetry,
    std::io::Error => Io,
    axum::Error => Server,
    TransactionImportError => Import,
    TierError => Tier,
    LoyaltyServiceError => Service,
);
