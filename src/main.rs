// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use sensor_ingestion::{
    channel::{AmqpConnector, ConnectionManager},
    http::{auth::JwtVerifier, router, AppState, SERVICE_NAME},
    otel,
    publisher::RabbitMQPublisher,
    service::IngestionService,
    settings::{AppSettings, LogSettings},
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = AppSettings::load()?;
    let tracer_provider = init_tracing(&settings.log);

    settings.validate()?;
    info!(broker = ?settings.rabbitmq, "settings loaded");

    let connections = ConnectionManager::with_connect_timeout(
        AmqpConnector::new(settings.rabbitmq.clone()),
        settings.rabbitmq.connect_timeout(),
    );
    connections
        .spawn_recovery(settings.rabbitmq.recovery_interval())
        .await;

    let publisher = RabbitMQPublisher::new(connections);
    let ingestion = IngestionService::new(publisher.clone(), &settings.rabbitmq);
    let state = AppState::new(ingestion, JwtVerifier::new(&settings.jwt));

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "sensor ingestion api listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    publisher.close().await;

    if let Err(err) = tracer_provider.shutdown() {
        tracing::error!(error = err.to_string(), "failure to shut down the tracer provider");
    }

    Ok(())
}

fn init_tracing(log: &LogSettings) -> SdkTracerProvider {
    let provider = otel::init_tracer_provider(SERVICE_NAME);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    let fmt_layer = if log.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME)))
        .init();

    provider
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = err.to_string(), "failure to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = err.to_string(), "failure to listen for sigterm");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
