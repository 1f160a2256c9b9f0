// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! JSON error responses of the HTTP boundary.

use crate::errors::IngestionError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Message returned for failures whose details stay in the logs.
pub const INTERNAL_ERROR_MESSAGE: &str = "an internal server error occurred";

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Unprocessable(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(self) -> String {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Unprocessable(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        (
            status,
            Json(ErrorBody {
                status_code: status.as_u16(),
                message: self.message(),
                timestamp: Utc::now(),
            }),
        )
            .into_response()
    }
}

impl From<IngestionError> for ApiError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::Validation(msg) => {
                warn!(error = %msg, "rejected invalid sensor reading");
                ApiError::BadRequest(msg)
            }
            IngestionError::BusinessRule(msg) => {
                warn!(error = %msg, "sensor reading broke a business rule");
                ApiError::Unprocessable(msg)
            }
            IngestionError::Configuration(msg) => {
                error!(error = %msg, "service is misconfigured");
                ApiError::Internal(msg)
            }
            IngestionError::Transport(err) => {
                error!(error = err.to_string(), "failure to hand the reading to the broker");
                ApiError::Internal(INTERNAL_ERROR_MESSAGE.to_owned())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AmqpError;

    #[test]
    fn ingestion_errors_map_to_status_codes() {
        let cases = [
            (IngestionError::Validation("v".into()), StatusCode::BAD_REQUEST),
            (
                IngestionError::BusinessRule("b".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                IngestionError::Configuration("c".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                IngestionError::Transport(AmqpError::PublishingError),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn transport_details_are_not_exposed() {
        let err = ApiError::from(IngestionError::Transport(AmqpError::ConnectionError));
        assert_eq!(err.message(), INTERNAL_ERROR_MESSAGE);
    }
}
