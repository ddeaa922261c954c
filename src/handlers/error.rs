//! Mapping of service errors to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use herakles_fleet_monitor::{RegistryError, ServiceError, ValidationError};
use serde_json::json;
use tracing::{debug, error};

/// Error type shared by the JSON endpoints.
#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    NotFound(String),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError::Service(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Service(ServiceError::UnknownHost(_)) => StatusCode::NOT_FOUND,
            ApiError::Service(ServiceError::InvalidInterval(_)) => StatusCode::BAD_REQUEST,
            ApiError::Service(ServiceError::Registry(RegistryError::Validation(
                ValidationError::Duplicate(_),
            ))) => StatusCode::CONFLICT,
            ApiError::Service(ServiceError::Registry(RegistryError::Validation(_))) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Service(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Service(e) => e.to_string(),
            ApiError::NotFound(what) => format!("{} not found", what),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            error!("Request failed: {}", message);
        } else {
            debug!("Request rejected ({}): {}", status, message);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let dup: ApiError = ServiceError::from(ValidationError::Duplicate("a:1".into())).into();
        assert_eq!(dup.status(), StatusCode::CONFLICT);

        let blank: ApiError = ServiceError::from(ValidationError::BlankField("nickname")).into();
        assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

        let unknown: ApiError = ServiceError::UnknownHost("a:1".into()).into();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let interval: ApiError = ServiceError::InvalidInterval(0).into();
        assert_eq!(interval.status(), StatusCode::BAD_REQUEST);

        let io: ApiError = ServiceError::Registry(RegistryError::Io {
            path: "servers.json".into(),
            source: std::io::Error::other("disk full"),
        })
        .into();
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
