// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Management
//!
//! This module owns the broker connection used by the publisher. The connection and
//! its channel are created lazily on first use, shared by every in-flight publish,
//! and re-created when they are found closed.
//!
//! Two traits separate the lifecycle logic from the driver:
//! - `Connector` opens a new `BrokerSession` (connection + channel)
//! - `BrokerSession` is the live handle the publisher talks to
//!
//! `AmqpConnector` and `AmqpSession` are the lapin-backed implementations.
//!
//! ## Lifecycle
//!
//! `Uninitialized -> Connecting -> Connected -> (Closed) -> Connecting -> Connected | Failed`
//!
//! A failed connect leaves no cached session behind, so the next caller starts from
//! scratch. Connecting happens under the exclusive lock, so every caller waits for
//! it; each attempt is therefore bounded by a connect timeout (30 s unless set
//! with `ConnectionManager::with_connect_timeout`) and a black-holed host fails
//! the waiting callers instead of stalling them for the OS TCP timeout. An optional recovery supervisor re-establishes a dropped session in the
//! background on a fixed interval.

use crate::{
    errors::AmqpError, publisher::OutboundMessage, queue::QueueDefinition,
    settings::BrokerSettings,
};
use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    types::{FieldTable, LongString},
    Channel, Connection, ConnectionProperties,
};
use std::{
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::RwLock, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// AMQP reply code used when closing channels and connections on purpose
const REPLY_SUCCESS: u16 = 200;

/// Upper bound on a single connect attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A live connection/channel pair to the broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Whether both the connection and the channel are still usable.
    fn is_open(&self) -> bool;

    /// Declares the queue described by `def`.
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError>;

    /// Publishes `message` and waits for the broker to confirm it.
    async fn publish(&self, message: &OutboundMessage) -> Result<(), AmqpError>;

    /// Closes the channel then the connection.
    async fn close(&self) -> Result<(), AmqpError>;
}

/// Opens new broker sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn BrokerSession>, AmqpError>;
}

/// lapin-backed `Connector` built from the broker settings.
pub struct AmqpConnector {
    settings: BrokerSettings,
}

impl AmqpConnector {
    pub fn new(settings: BrokerSettings) -> Arc<AmqpConnector> {
        Arc::new(AmqpConnector { settings })
    }
}

#[async_trait]
impl Connector for AmqpConnector {
    /// Connects to RabbitMQ, creates a channel and enables publisher confirms on it.
    async fn connect(&self) -> Result<Arc<dyn BrokerSession>, AmqpError> {
        info!(
            host = %self.settings.host,
            port = self.settings.port,
            "connecting to amqp broker"
        );

        let options = ConnectionProperties::default()
            .with_connection_name(LongString::from(self.settings.connection_name.clone()));

        let conn = match Connection::connect(&self.settings.uri(), options).await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::ConnectionError)
            }
        }?;
        debug!("amqp connected");

        debug!("creating amqp channel...");
        let channel = match conn.create_channel().await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError)
            }
        }?;

        if let Err(err) = channel
            .confirm_select(ConfirmSelectOptions { nowait: false })
            .await
        {
            error!(error = err.to_string(), "error to enable publisher confirms");
            return Err(AmqpError::ChannelError);
        }
        debug!("channel created");

        info!("connected to amqp broker");

        Ok(Arc::new(AmqpSession {
            connection: conn,
            channel,
        }))
    }
}

/// lapin connection and channel.
///
/// lapin channels can be used concurrently for publishing, so the session is
/// shared without an additional lock.
pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl BrokerSession for AmqpSession {
    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        match self
            .channel
            .queue_declare(def.name(), def.declare_options(), FieldTable::default())
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    queue = def.name(),
                    "error to declare the queue"
                );
                Err(AmqpError::DeclareQueueError(def.name().to_owned()))
            }
            _ => {
                debug!("queue: {} was declared", def.name());
                Ok(())
            }
        }
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<(), AmqpError> {
        let confirm = match self
            .channel
            .basic_publish(
                "",
                &message.queue,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &message.body,
                message.properties(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            Ok(c) => Ok(c),
        }?;

        match confirm.await {
            Err(err) => {
                error!(error = err.to_string(), "error waiting for publish confirm");
                Err(AmqpError::PublishingError)
            }
            Ok(confirmation) if confirmation.is_nack() => {
                error!(queue = %message.queue, "message was nacked by the broker");
                Err(AmqpError::PublishNackedError(message.queue.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Both steps always run; the first failure is the one returned.
    async fn close(&self) -> Result<(), AmqpError> {
        let channel = match self.channel.close(REPLY_SUCCESS, "shutdown").await {
            Err(err) => {
                warn!(error = err.to_string(), "error closing the channel");
                Err(AmqpError::ChannelError)
            }
            _ => Ok(()),
        };

        let connection = match self.connection.close(REPLY_SUCCESS, "shutdown").await {
            Err(err) => {
                warn!(error = err.to_string(), "error closing the connection");
                Err(AmqpError::ConnectionError)
            }
            _ => Ok(()),
        };

        first_failure(channel, connection)
    }
}

fn first_failure(
    first: Result<(), AmqpError>,
    second: Result<(), AmqpError>,
) -> Result<(), AmqpError> {
    first.and(second)
}

/// Observable state of the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Uninitialized = 0,
    Connecting = 1,
    Connected = 2,
    Failed = 3,
    Closed = 4,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Failed,
            4 => ConnectionState::Closed,
            _ => ConnectionState::Uninitialized,
        }
    }
}

#[derive(Default)]
struct Slot {
    session: Option<Arc<dyn BrokerSession>>,
    supervisor: Option<JoinHandle<()>>,
    shut_down: bool,
}

/// Lazily established, shared broker session.
///
/// The cached session is read under a shared lock; creating a new one happens
/// under the exclusive lock after re-checking, so concurrent callers that all
/// find the session stale still produce a single new connection.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    slot: RwLock<Slot>,
    state: AtomicU8,
}

impl ConnectionManager {
    /// Creates a manager that connects through `connector` on first use.
    pub fn new(connector: Arc<dyn Connector>) -> Arc<ConnectionManager> {
        ConnectionManager::with_connect_timeout(connector, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Same as `new`, giving up on a connect attempt after `connect_timeout`.
    pub fn with_connect_timeout(
        connector: Arc<dyn Connector>,
        connect_timeout: Duration,
    ) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager {
            connector,
            connect_timeout,
            slot: RwLock::new(Slot::default()),
            state: AtomicU8::new(ConnectionState::Uninitialized as u8),
        })
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Returns an open session, connecting first if there is none or the cached
    /// one was closed.
    ///
    /// Connection failures are logged and returned; nothing is retried here.
    pub async fn ensure_live_channel(&self) -> Result<Arc<dyn BrokerSession>, AmqpError> {
        {
            let slot = self.slot.read().await;
            if slot.shut_down {
                return Err(AmqpError::ShutdownError);
            }

            if let Some(session) = slot.session.as_ref().filter(|s| s.is_open()) {
                return Ok(session.clone());
            }
        }

        self.reconnect().await
    }

    async fn reconnect(&self) -> Result<Arc<dyn BrokerSession>, AmqpError> {
        let mut slot = self.slot.write().await;

        if slot.shut_down {
            return Err(AmqpError::ShutdownError);
        }

        // another caller may have reconnected while we waited for the lock
        if let Some(session) = slot.session.as_ref().filter(|s| s.is_open()) {
            return Ok(session.clone());
        }

        let stale = slot.session.take();
        if stale.is_some() {
            warn!("amqp session is closed, reconnecting");
        }

        self.set_state(ConnectionState::Connecting);

        let attempt = tokio::time::timeout(self.connect_timeout, self.connector.connect()).await;

        let session = match attempt.unwrap_or_else(|_| {
            warn!(
                timeout_secs = self.connect_timeout.as_secs_f64(),
                "timed out connecting to the amqp broker"
            );
            Err(AmqpError::ConnectionError)
        }) {
            Ok(session) => session,
            Err(err) => {
                self.set_state(ConnectionState::Failed);
                error!(error = err.to_string(), "failure to establish amqp session");
                return Err(err);
            }
        };

        slot.session = Some(session.clone());
        self.set_state(ConnectionState::Connected);
        drop(slot);

        if let Some(stale) = stale {
            if let Err(err) = stale.close().await {
                debug!(error = err.to_string(), "stale amqp session did not close cleanly");
            }
        }

        Ok(session)
    }

    async fn needs_recovery(&self) -> bool {
        let slot = self.slot.read().await;
        if slot.shut_down {
            return false;
        }

        match slot.session.as_ref() {
            Some(session) => !session.is_open(),
            None => self.state() == ConnectionState::Failed,
        }
    }

    /// Starts the background task that re-establishes a dropped or failed session
    /// every `interval`, without waiting for the next publish.
    ///
    /// Calling it again replaces the previous supervisor.
    pub async fn spawn_recovery(self: &Arc<Self>, interval: Duration) {
        let manager = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(manager) = manager.upgrade() else {
                    break;
                };

                if !manager.needs_recovery().await {
                    continue;
                }

                warn!("amqp session lost, trying to recover");
                match manager.reconnect().await {
                    Ok(_) => info!("amqp session recovered"),
                    Err(err) => warn!(
                        error = err.to_string(),
                        retry_in_secs = interval.as_secs(),
                        "amqp recovery attempt failed"
                    ),
                }
            }
        });

        let mut slot = self.slot.write().await;
        if slot.shut_down {
            handle.abort();
            return;
        }

        if let Some(previous) = slot.supervisor.replace(handle) {
            previous.abort();
        }
    }

    /// Stops the recovery supervisor and closes the session.
    ///
    /// Runs once; later calls are no-ops. Close errors are logged, never returned.
    pub async fn close(&self) {
        let (session, supervisor) = {
            let mut slot = self.slot.write().await;
            if slot.shut_down {
                return;
            }
            slot.shut_down = true;
            (slot.session.take(), slot.supervisor.take())
        };

        self.set_state(ConnectionState::Closed);

        if let Some(supervisor) = supervisor {
            supervisor.abort();
        }

        if let Some(session) = session {
            match session.close().await {
                Ok(_) => info!("amqp connection closed"),
                Err(err) => error!(error = err.to_string(), "error closing amqp connection"),
            }
        }
    }
}
