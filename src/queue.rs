// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! This module provides the queue definition used when declaring the target queue
//! before publishing. Declarations are idempotent on the broker side: declaring a
//! queue again with the same flags is a no-op, while declaring it with conflicting
//! flags is rejected by the broker and surfaces as `AmqpError::DeclareQueueError`.

use lapin::options::QueueDeclareOptions;

/// Definition of a RabbitMQ queue with its declaration flags.
///
/// This struct implements the builder pattern to create and configure queue definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) exclusive: bool,
    pub(crate) auto_delete: bool,
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name.
    ///
    /// By default, the queue is non-durable, non-exclusive and not auto-deleted.
    ///
    /// # Parameters
    /// * `name` - The name of the queue
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            durable: false,
            exclusive: false,
            auto_delete: false,
        }
    }

    /// Definition used for every publish target: durable, non-exclusive and
    /// kept when it has no consumers.
    pub fn publish_target(name: &str) -> QueueDefinition {
        QueueDefinition::new(name).durable()
    }

    /// Makes the queue durable, persisting across broker restarts.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn is_auto_delete(&self) -> bool {
        self.auto_delete
    }

    /// Options passed to `queue.declare`. The declaration is never passive and
    /// always waits for the broker's reply.
    pub fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: false,
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.auto_delete,
            nowait: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_target_is_durable_shared_and_kept() {
        let def = QueueDefinition::publish_target("sensor-data");
        let opts = def.declare_options();

        assert_eq!(def.name(), "sensor-data");
        assert!(opts.durable);
        assert!(!opts.exclusive);
        assert!(!opts.auto_delete);
        assert!(!opts.passive);
        assert!(!opts.nowait);
    }

    #[test]
    fn plain_definition_is_transient() {
        let def = QueueDefinition::new("tmp");

        assert!(!def.is_durable());
        assert!(!def.declare_options().durable);
    }
}
