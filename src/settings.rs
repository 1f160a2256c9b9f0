// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Process Settings
//!
//! Settings are layered: built-in defaults, then an optional configuration file,
//! then environment variables prefixed with `INGESTION` using `__` as the nesting
//! separator (`INGESTION__RABBITMQ__HOST`, `INGESTION__JWT__KEY`, ...).
//!
//! Loading never checks business meaning; `AppSettings::validate` does, and it is
//! meant to run once at startup so that a bad deployment fails before serving.

use crate::errors::SettingsError;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::{env, fmt, time::Duration};

/// Default AMQP port.
pub const DEFAULT_AMQP_PORT: u16 = 5672;

/// Prefix of the environment variables read by `AppSettings::load`.
pub const ENV_PREFIX: &str = "INGESTION";

/// Root settings of the service.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    pub server: ServerSettings,
    pub rabbitmq: BrokerSettings,
    pub jwt: JwtSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Connection parameters of the message broker.
#[derive(Clone, Deserialize)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub queue_name: String,
    pub connection_name: String,
    pub recovery_interval_secs: u64,
    pub connect_timeout_secs: u64,
}

/// Bearer token validation parameters.
#[derive(Clone, Deserialize)]
pub struct JwtSettings {
    pub issuer: String,
    pub audience: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
}

impl AppSettings {
    /// Loads the settings from the default sources.
    ///
    /// The configuration file is taken from `CONFIG_FILE` when set, otherwise
    /// `config/<ENVIRONMENT>` is tried (`ENVIRONMENT` defaults to `development`).
    /// Both are optional.
    pub fn load() -> Result<AppSettings, SettingsError> {
        let file = match env::var("CONFIG_FILE") {
            Ok(path) => path,
            Err(_) => {
                let environment =
                    env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_owned());
                format!("config/{}", environment)
            }
        };

        Self::load_from(Some(&file))
    }

    /// Loads the settings from defaults, the given optional file and the
    /// environment.
    pub fn load_from(file: Option<&str>) -> Result<AppSettings, SettingsError> {
        let mut builder = Self::defaults()?;

        if let Some(file) = file {
            builder = builder.add_source(File::with_name(file).required(false));
        }

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|err| SettingsError::Load(err.to_string()))
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, SettingsError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")
            .and_then(|b| b.set_default("server.port", 8080))
            .and_then(|b| b.set_default("rabbitmq.host", ""))
            .and_then(|b| b.set_default("rabbitmq.port", DEFAULT_AMQP_PORT as i64))
            .and_then(|b| b.set_default("rabbitmq.username", ""))
            .and_then(|b| b.set_default("rabbitmq.password", ""))
            .and_then(|b| b.set_default("rabbitmq.vhost", "/"))
            .and_then(|b| b.set_default("rabbitmq.queue_name", ""))
            .and_then(|b| b.set_default("rabbitmq.connection_name", "sensor-ingestion"))
            .and_then(|b| b.set_default("rabbitmq.recovery_interval_secs", 10))
            .and_then(|b| b.set_default("rabbitmq.connect_timeout_secs", 30))
            .and_then(|b| b.set_default("jwt.issuer", ""))
            .and_then(|b| b.set_default("jwt.audience", ""))
            .and_then(|b| b.set_default("jwt.key", ""))
            .and_then(|b| b.set_default("log.level", "info"))
            .and_then(|b| b.set_default("log.json", false))
            .map_err(|err| SettingsError::Load(err.to_string()))
    }

    /// Checks every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.server.port == 0 {
            return Err(SettingsError::InvalidField(
                "server.port",
                "must be greater than zero".to_owned(),
            ));
        }

        self.rabbitmq.validate()?;
        self.jwt.validate()
    }
}

impl BrokerSettings {
    /// Fails on blank strings, a zero port, or a zero recovery interval or connect timeout.
    pub fn validate(&self) -> Result<(), SettingsError> {
        require("rabbitmq.host", &self.host)?;
        require("rabbitmq.username", &self.username)?;
        require("rabbitmq.password", &self.password)?;
        require("rabbitmq.queue_name", &self.queue_name)?;

        if self.port == 0 {
            return Err(SettingsError::InvalidField(
                "rabbitmq.port",
                "must be greater than zero".to_owned(),
            ));
        }

        if self.recovery_interval_secs == 0 {
            return Err(SettingsError::InvalidField(
                "rabbitmq.recovery_interval_secs",
                "must be greater than zero".to_owned(),
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(SettingsError::InvalidField(
                "rabbitmq.connect_timeout_secs",
                "must be greater than zero".to_owned(),
            ));
        }

        Ok(())
    }

    /// Interval used by the connection recovery supervisor.
    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }

    /// Upper bound on a single connect attempt.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// AMQP URI built from the settings.
    ///
    /// The vhost is percent-encoded, so the default `/` vhost becomes `%2f`.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.username,
            self.password,
            self.host,
            self.port,
            encode_vhost(&self.vhost)
        )
    }
}

impl fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("vhost", &self.vhost)
            .field("queue_name", &self.queue_name)
            .field("connection_name", &self.connection_name)
            .field("recovery_interval_secs", &self.recovery_interval_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl JwtSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        require("jwt.issuer", &self.issuer)?;
        require("jwt.audience", &self.audience)?;
        require("jwt.key", &self.key)
    }
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("key", &"***")
            .finish()
    }
}

fn require(key: &'static str, value: &str) -> Result<(), SettingsError> {
    if value.trim().is_empty() {
        return Err(SettingsError::MissingField(key));
    }

    Ok(())
}

fn encode_vhost(vhost: &str) -> String {
    vhost
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02x}", b),
        })
        .collect()
}
