// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Sensor Ingestion Service
//!
//! This module provides the error taxonomy used across the crate:
//! - `AmqpError` for broker connection, declaration and publishing failures
//! - `SettingsError` for missing or invalid configuration
//! - `IngestionError` for the failures surfaced by the ingestion path, which the
//!   HTTP boundary translates into status codes

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Every variant is logged at the point of failure with the underlying driver
/// error before being returned, so the variants themselves only carry the
/// context needed by the caller.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// The broker refused the message on the given queue
    #[error("message was nacked by the broker on queue `{0}`")]
    PublishNackedError(String),

    /// Error serializing a message payload
    #[error("failure to serialize payload")]
    SerializationError,

    /// The connection manager was already shut down
    #[error("connection manager is shut down")]
    ShutdownError,
}

/// Errors raised while loading or validating process settings.
///
/// These are fatal at startup.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
    /// A required key is absent or blank
    #[error("`{0}` is not configured")]
    MissingField(&'static str),

    /// A key is present but holds an unusable value
    #[error("`{0}` is invalid: {1}")]
    InvalidField(&'static str, String),

    /// The configuration sources could not be read or deserialized
    #[error("failure to load settings: {0}")]
    Load(String),
}

/// Errors surfaced by the ingestion path.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum IngestionError {
    /// Process configuration required by the call is missing
    #[error("{0}")]
    Configuration(String),

    /// Malformed or out-of-range input
    #[error("{0}")]
    Validation(String),

    /// Well-formed input rejected by a business rule
    #[error("{0}")]
    BusinessRule(String),

    /// The reading could not be handed to the broker
    #[error(transparent)]
    Transport(#[from] AmqpError),
}
