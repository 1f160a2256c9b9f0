// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # HTTP Boundary
//!
//! Routes:
//! - `GET /health` anonymous liveness probe
//! - `POST /api/sensor-data` bearer-authenticated ingestion of a `SensorReading`
//!
//! Every failure is answered with an `ErrorBody` JSON document.

pub mod auth;
pub mod correlation;
pub mod error;

use crate::{
    http::{
        auth::{Authenticated, JwtVerifier},
        correlation::correlation,
        error::ApiError,
    },
    sensor::SensorReading,
    service::IngestionService,
};
use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Name reported by the health endpoint.
pub const SERVICE_NAME: &str = "sensor-ingestion-api";

#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionService>,
    pub jwt: Arc<JwtVerifier>,
}

impl AppState {
    pub fn new(ingestion: Arc<IngestionService>, jwt: Arc<JwtVerifier>) -> Self {
        AppState { ingestion, jwt }
    }
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestionAck {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/sensor-data", post(ingest_sensor_data))
        .layer(middleware::from_fn(correlation))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_owned(),
        timestamp: Utc::now(),
        service: SERVICE_NAME.to_owned(),
    })
}

async fn ingest_sensor_data(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    payload: Result<Json<SensorReading>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestionAck>), ApiError> {
    let Json(reading) = payload?;

    info!(
        subject = %claims.sub,
        field_id = %reading.field_id,
        sensor_type = %reading.sensor_type,
        "sensor data ingestion requested"
    );

    state.ingestion.publish(&reading).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestionAck {
            message: "sensor data received and published".to_owned(),
            timestamp: Utc::now(),
        }),
    ))
}
