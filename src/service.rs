// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Sensor Ingestion Service
//!
//! Validates incoming readings and hands them to the publisher. Publish failures
//! are propagated unchanged; this layer never retries.

use crate::{
    errors::IngestionError, publisher::RabbitMQPublisher, sensor::SensorReading,
    settings::BrokerSettings,
};
use std::sync::Arc;
use tracing::info;

pub struct IngestionService {
    publisher: Arc<RabbitMQPublisher>,
    queue_name: String,
}

impl IngestionService {
    pub fn new(publisher: Arc<RabbitMQPublisher>, settings: &BrokerSettings) -> Arc<IngestionService> {
        Arc::new(IngestionService {
            publisher,
            queue_name: settings.queue_name.clone(),
        })
    }

    /// Validates `reading` and publishes it on the configured queue.
    ///
    /// Invalid readings are rejected before the broker is contacted.
    pub async fn publish(&self, reading: &SensorReading) -> Result<(), IngestionError> {
        info!(
            field_id = %reading.field_id,
            sensor_type = %reading.sensor_type,
            value = reading.value,
            timestamp = %reading.timestamp,
            "publishing sensor reading"
        );

        reading.validate()?;

        let queue_name = self.queue_name()?;

        self.publisher.publish(reading, queue_name).await?;

        info!(queue = queue_name, "sensor reading published");

        Ok(())
    }

    fn queue_name(&self) -> Result<&str, IngestionError> {
        if self.queue_name.trim().is_empty() {
            return Err(IngestionError::Configuration(
                "rabbitmq.queue_name is not configured".to_owned(),
            ));
        }

        Ok(&self.queue_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::{tests::open_session, BrokerSession, ConnectionManager, MockConnector},
        errors::AmqpError,
        publisher::OutboundMessage,
        sensor::tests::reading,
        settings::tests::broker_settings,
    };
    use chrono::Utc;
    use std::sync::Mutex;

    fn service_with(connector: MockConnector, queue_name: &str) -> Arc<IngestionService> {
        let publisher = RabbitMQPublisher::new(ConnectionManager::new(Arc::new(connector)));
        let mut settings = broker_settings();
        settings.queue_name = queue_name.to_owned();
        IngestionService::new(publisher, &settings)
    }

    fn fresh_reading() -> SensorReading {
        let mut r = reading();
        r.timestamp = Utc::now();
        r
    }

    #[tokio::test]
    async fn valid_reading_is_published_once_on_the_configured_queue() {
        let sent = Arc::new(Mutex::new(Vec::<OutboundMessage>::new()));
        let sink = sent.clone();

        let mut connector = MockConnector::new();
        connector.expect_connect().times(1).returning(move || {
            let sink = sink.clone();
            let mut session = open_session();
            session.expect_declare_queue().returning(|_| Ok(()));
            session.expect_publish().times(1).returning(move |msg| {
                sink.lock().unwrap().push(msg.clone());
                Ok(())
            });
            Ok(Arc::new(session) as Arc<dyn BrokerSession>)
        });

        let service = service_with(connector, "sensor-data");
        let r = fresh_reading();

        service.publish(&r).await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].queue, "sensor-data");

        let decoded: SensorReading = serde_json::from_slice(&sent[0].body).unwrap();
        assert_eq!(decoded, r);
    }

    #[tokio::test]
    async fn invalid_readings_never_touch_the_broker() {
        // no expectations: any connect attempt panics
        let service = service_with(MockConnector::new(), "sensor-data");

        let mut blank = fresh_reading();
        blank.field_id = String::new();
        assert!(matches!(
            service.publish(&blank).await,
            Err(IngestionError::Validation(_))
        ));

        let mut nan = fresh_reading();
        nan.value = f64::NAN;
        assert!(matches!(
            service.publish(&nan).await,
            Err(IngestionError::Validation(_))
        ));

        let mut out_of_range = fresh_reading();
        out_of_range.value = -9999.0;
        assert!(matches!(
            service.publish(&out_of_range).await,
            Err(IngestionError::BusinessRule(_))
        ));

        let mut from_the_future = fresh_reading();
        from_the_future.timestamp = Utc::now() + chrono::Duration::days(1);
        assert!(matches!(
            service.publish(&from_the_future).await,
            Err(IngestionError::BusinessRule(_))
        ));
    }

    #[tokio::test]
    async fn missing_queue_name_is_a_configuration_error() {
        let service = service_with(MockConnector::new(), " ");

        assert!(matches!(
            service.publish(&fresh_reading()).await,
            Err(IngestionError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn transport_failures_propagate_unchanged() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|| Err(AmqpError::ConnectionError));

        let service = service_with(connector, "sensor-data");

        assert_eq!(
            service.publish(&fresh_reading()).await,
            Err(IngestionError::Transport(AmqpError::ConnectionError))
        );
    }
}
