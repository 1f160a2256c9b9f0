// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! This module publishes payloads directly to a named queue through the default
//! exchange. Each call:
//! 1. obtains a live session from the `ConnectionManager`
//! 2. declares the target queue (durable, non-exclusive, not auto-deleted)
//! 3. serializes the payload with the codec
//! 4. stamps the message as persistent JSON with a creation timestamp
//! 5. publishes with the queue name as routing key and waits for the confirm
//!
//! Failures are logged with the queue name and returned to the caller; nothing is
//! retried here. A single publisher is shared by every request for the lifetime of
//! the process.

use crate::{
    channel::ConnectionManager,
    codec::{self, JSON_CONTENT_TYPE},
    errors::AmqpError,
    otel,
    queue::QueueDefinition,
};
use chrono::{DateTime, Utc};
use lapin::{
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties,
};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error, info};
use uuid::Uuid;

/// AMQP delivery mode for messages written to disk by the broker
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;
/// AMQP delivery mode for messages kept in memory only
pub const TRANSIENT_DELIVERY_MODE: u8 = 1;

/// A serialized payload plus the metadata it is published with.
///
/// Built fresh for every publish call. It has no deduplication key, so a caller
/// retrying after an ambiguous failure may produce duplicates downstream.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub queue: String,
    pub body: Vec<u8>,
    pub persistent: bool,
    pub content_type: String,
    pub timestamp: DateTime<Utc>,
    pub message_id: String,
    pub headers: BTreeMap<ShortString, AMQPValue>,
}

impl OutboundMessage {
    /// Persistent JSON message for `queue`, stamped now.
    pub fn json(queue: &str, body: Vec<u8>) -> OutboundMessage {
        OutboundMessage {
            queue: queue.to_owned(),
            body,
            persistent: true,
            content_type: JSON_CONTENT_TYPE.to_owned(),
            timestamp: Utc::now(),
            message_id: Uuid::new_v4().to_string(),
            headers: BTreeMap::new(),
        }
    }

    pub fn delivery_mode(&self) -> u8 {
        if self.persistent {
            PERSISTENT_DELIVERY_MODE
        } else {
            TRANSIENT_DELIVERY_MODE
        }
    }

    /// AMQP properties carried by the message. The timestamp has second precision.
    pub fn properties(&self) -> BasicProperties {
        BasicProperties::default()
            .with_content_type(ShortString::from(self.content_type.clone()))
            .with_delivery_mode(self.delivery_mode())
            .with_timestamp(self.timestamp.timestamp().max(0) as u64)
            .with_message_id(ShortString::from(self.message_id.clone()))
            .with_headers(FieldTable::from(self.headers.clone()))
    }
}

/// Publisher writing payloads to RabbitMQ queues.
pub struct RabbitMQPublisher {
    connections: Arc<ConnectionManager>,
}

impl RabbitMQPublisher {
    /// Creates a new RabbitMQ publisher.
    ///
    /// # Parameters
    /// * `connections` - The manager owning the broker session
    ///
    /// # Returns
    /// An Arc-wrapped RabbitMQPublisher instance for thread-safe sharing
    pub fn new(connections: Arc<ConnectionManager>) -> Arc<RabbitMQPublisher> {
        Arc::new(RabbitMQPublisher { connections })
    }

    /// Publishes `message` as persistent JSON on `queue_name`.
    ///
    /// The OpenTelemetry context of the current span is propagated in the message headers.
    ///
    /// # Parameters
    /// * `message` - Any serializable payload
    /// * `queue_name` - Target queue, also used as routing key on the default exchange
    ///
    /// # Returns
    /// Ok(()) once the broker confirmed the message, or the AmqpError that stopped it
    pub async fn publish<T>(&self, message: &T, queue_name: &str) -> Result<(), AmqpError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let session = self.connections.ensure_live_channel().await.map_err(|err| {
            error!(
                error = err.to_string(),
                queue = queue_name,
                "no amqp session available for publishing"
            );
            err
        })?;

        let result = async {
            session
                .declare_queue(&QueueDefinition::publish_target(queue_name))
                .await?;

            let body = codec::serialize(message)?;

            let mut outbound = OutboundMessage::json(queue_name, body);
            otel::inject_context(&otel::current_context(), &mut outbound.headers);

            debug!(
                queue = queue_name,
                message_id = %outbound.message_id,
                bytes = outbound.body.len(),
                "publishing message"
            );

            session.publish(&outbound).await
        }
        .await;

        match result {
            Ok(_) => {
                info!(queue = queue_name, "message published");
                Ok(())
            }
            Err(err) => {
                error!(
                    error = err.to_string(),
                    queue = queue_name,
                    "error publishing message"
                );
                Err(err)
            }
        }
    }

    /// The manager backing this publisher.
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Closes the broker connection. Intended for process shutdown.
    pub async fn close(&self) {
        self.connections.close().await;
    }
}
