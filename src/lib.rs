// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

pub mod channel;
pub mod codec;
pub mod errors;
pub mod http;
pub mod otel;
pub mod publisher;
pub mod queue;
pub mod sensor;
pub mod service;
pub mod settings;
