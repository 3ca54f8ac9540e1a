use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use roster_core::admission::AdmissionError;
use roster_storage::EmployeeError;

/// Wire shape of every failing API call.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// An API failure carrying the status code and the message shown to the
/// client verbatim.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(stage = "api", status = %self.status, message = %self.message, "request failed");
        }
        let mut response = Json(ErrorBody {
            error: self.message,
        })
        .into_response();
        *response.status_mut() = self.status;
        response
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err.to_string())
    }
}

impl From<EmployeeError> for ApiError {
    fn from(err: EmployeeError) -> Self {
        let status = match &err {
            EmployeeError::Duplicate { .. } | EmployeeError::CapacityExceeded => {
                StatusCode::BAD_REQUEST
            }
            EmployeeError::NotFound => StatusCode::NOT_FOUND,
            EmployeeError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err.body_text())
    }
}
