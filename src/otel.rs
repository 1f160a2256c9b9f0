// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration for RabbitMQ
//!
//! Propagates the caller's trace context through RabbitMQ message headers so that
//! downstream consumers can continue the trace of the HTTP request that produced
//! the message.
//!
//! The W3C trace-context propagator is installed globally at startup. Inbound
//! `traceparent` headers become the parent of the request span, and `tracing`
//! spans are bridged to OpenTelemetry through `tracing-opentelemetry`, so the
//! span current at publish time is what ends up in the message headers.

use axum::http::HeaderMap;
use lapin::types::{AMQPValue, ShortString};
use opentelemetry::{
    global,
    propagation::{Extractor, Injector},
    Context,
};
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace::SdkTracerProvider, Resource};
use std::collections::BTreeMap;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// An adapter for injecting OpenTelemetry context into RabbitMQ headers.
pub(crate) struct RabbitMQTracePropagator<'a> {
    headers: &'a mut BTreeMap<ShortString, AMQPValue>,
}

impl<'a> RabbitMQTracePropagator<'a> {
    pub(crate) fn new(headers: &'a mut BTreeMap<ShortString, AMQPValue>) -> Self {
        Self { headers }
    }
}

impl Injector for RabbitMQTracePropagator<'_> {
    /// Sets a trace context key-value pair in RabbitMQ message headers.
    ///
    /// Keys are lower-cased, values are stored as AMQP long strings.
    fn set(&mut self, key: &str, value: String) {
        self.headers.insert(
            key.to_lowercase().into(),
            AMQPValue::LongString(value.into()),
        );
    }
}

/// Reads trace context from inbound HTTP request headers.
struct HttpHeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HttpHeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|key| key.as_str()).collect()
    }
}

/// Installs the W3C trace-context propagator as the global text-map propagator.
pub fn install_propagator() {
    global::set_text_map_propagator(TraceContextPropagator::new());
}

/// Installs the propagator and builds the tracer provider backing the
/// `tracing-opentelemetry` layer.
///
/// No exporter is attached: spans exist to give every request a trace id that
/// travels with the messages it publishes.
///
/// # Parameters
/// * `service_name` - Reported as the `service.name` resource attribute
///
/// # Returns
/// The provider; call `shutdown` on it when the process exits
pub fn init_tracer_provider(service_name: &'static str) -> SdkTracerProvider {
    install_propagator();

    SdkTracerProvider::builder()
        .with_resource(Resource::builder().with_service_name(service_name).build())
        .build()
}

/// OpenTelemetry context of the current `tracing` span.
pub(crate) fn current_context() -> Context {
    tracing::Span::current().context()
}

/// Parent context carried by inbound HTTP headers, empty when there is none.
pub(crate) fn extract_http_context(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HttpHeaderExtractor(headers)))
}

/// Writes `ctx` into `headers` using the globally installed text-map propagator.
///
/// With no propagator installed this leaves `headers` untouched.
pub(crate) fn inject_context(ctx: &Context, headers: &mut BTreeMap<ShortString, AMQPValue>) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut RabbitMQTracePropagator::new(headers))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::TraceContextExt;

    #[test]
    fn injector_lowercases_keys_and_stores_long_strings() {
        let mut headers = BTreeMap::new();
        let mut injector = RabbitMQTracePropagator::new(&mut headers);

        injector.set("TraceParent", "00-abc-def-01".to_owned());

        match headers.get(&ShortString::from("traceparent")) {
            Some(AMQPValue::LongString(v)) => assert_eq!(v.as_bytes(), b"00-abc-def-01"),
            other => panic!("unexpected header {:?}", other),
        }
    }

    #[test]
    fn inbound_traceparent_is_extracted_and_forwarded() {
        install_propagator();

        let mut inbound = HeaderMap::new();
        inbound.insert(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
                .parse()
                .unwrap(),
        );

        let ctx = extract_http_context(&inbound);
        assert_eq!(
            ctx.span().span_context().trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );

        let mut headers = BTreeMap::new();
        inject_context(&ctx, &mut headers);

        match headers.get(&ShortString::from("traceparent")) {
            Some(AMQPValue::LongString(v)) => assert_eq!(
                v.as_bytes(),
                b"00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
            ),
            other => panic!("unexpected header {:?}", other),
        }
    }

    #[test]
    fn missing_traceparent_yields_an_empty_context() {
        install_propagator();

        let ctx = extract_http_context(&HeaderMap::new());

        assert!(!ctx.span().span_context().is_valid());
    }
}
