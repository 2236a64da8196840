use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

// Taken from https://github.com/tokio-rs/axum/blob/main/examples/anyhow-error-response/src/main.rs
#[derive(Debug)]
pub struct ServiceError {
    pub status: StatusCode,
    pub message: HttpErrorResponse,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HttpErrorResponse {
    pub detail: String,
}

impl From<String> for HttpErrorResponse {
    fn from(message: String) -> Self {
        HttpErrorResponse { detail: message }
    }
}

impl From<&str> for HttpErrorResponse {
    fn from(message: &str) -> Self {
        HttpErrorResponse {
            detail: message.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let mut res = Json(self.message).into_response();
        *res.status_mut() = self.status;
        res
    }
}

/// Input a model cannot take. Jobs return it through `anyhow`, its message is meant for the client.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct InvalidInput(pub String);

/// Failure of a call handed to the inference worker pool.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("inference failed: {0:#}")]
    Failed(anyhow::Error),

    #[error("inference rejected input: {0}")]
    Rejected(String),

    #[error("inference did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("inference worker pool is closed")]
    Unavailable,

    #[error("inference task aborted: {0}")]
    Aborted(String),
}

impl InferenceError {
    /// Classifies the error a job returned, [`InvalidInput`] stays visible to the client.
    pub fn from_job(err: anyhow::Error) -> Self {
        match err.downcast::<InvalidInput>() {
            Ok(InvalidInput(message)) => InferenceError::Rejected(message),
            Err(err) => InferenceError::Failed(err),
        }
    }
}

impl From<InferenceError> for ServiceError {
    fn from(err: InferenceError) -> Self {
        // Apart from rejected input the inner error can carry model internals or request text,
        // so it only goes to the log
        let (status, message) = match &err {
            InferenceError::Rejected(message) => (StatusCode::BAD_REQUEST, message.as_str()),
            InferenceError::Failed(_) | InferenceError::Aborted(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Inference failed")
            }
            InferenceError::TimedOut(_) => (StatusCode::GATEWAY_TIMEOUT, "Inference timed out"),
            InferenceError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "Inference unavailable"),
        };
        if status.is_client_error() {
            warn!("{err}");
        } else {
            error!("{err}");
        }
        ServiceError {
            status,
            message: HttpErrorResponse::from(message),
        }
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        warn!("Rejected request body: {}", rejection.body_text());
        ServiceError {
            status: rejection.status(),
            message: HttpErrorResponse::from(rejection.body_text()),
        }
    }
}

pub type ServiceResult<T, E = ServiceError> = Result<T, E>;

#[macro_export]
macro_rules! bail_service {
    ($error_message:expr) => {
        return Err($crate::error::ServiceError {
            status: ::axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            message: $crate::error::HttpErrorResponse::from($error_message),
        })
    };
    ($status:expr, $error_message:expr) => {
        return Err($crate::error::ServiceError {
            status: $status,
            message: $crate::error::HttpErrorResponse::from($error_message),
        })
    };
    ($status:expr, $fmt:expr $(, $arg:expr)+) => {
        return Err($crate::error::ServiceError {
            status: $status,
            message: $crate::error::HttpErrorResponse::from(format!($fmt $(, $arg)+)),
        })
    };
}

/// Logs the message and terminates the process, used for startup failures.
#[macro_export]
macro_rules! exit_err {
    ($code:expr, $fmt:expr $(, $arg:expr)*) => {{
        ::tracing::error!($fmt $(, $arg)*);
        ::std::process::exit($code)
    }};
}
