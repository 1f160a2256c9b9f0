// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Correlation id propagation.
//!
//! Every request runs inside a span tagged with its correlation id, taken from the
//! `X-Correlation-ID` header when present and generated otherwise. The id is echoed
//! back on the response. A W3C `traceparent` header, when present, becomes the
//! parent of the request span.

use crate::otel;
use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::{info, info_span, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

pub async fn correlation(req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = info_span!(
        "request",
        correlation_id = %id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    span.set_parent(otel::extract_http_context(req.headers()));

    async move {
        info!("request started");

        let mut response = next.run(req).await;

        info!(status = response.status().as_u16(), "request finished");

        if let Ok(value) = HeaderValue::from_str(&id) {
            response.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }

        response
    }
    .instrument(span)
    .await
}
