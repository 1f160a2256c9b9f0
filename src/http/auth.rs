// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs whose issuer, audience and expiry are all checked.

use crate::{http::error::ApiError, settings::JwtSettings};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

const BEARER_PREFIX: &str = "Bearer ";

/// Claims the handlers care about. Issuer, audience and expiry are validated by
/// `JwtVerifier` before these are deserialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: String,
    pub exp: u64,
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(settings: &JwtSettings) -> Arc<JwtVerifier> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_audience(&[settings.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        Arc::new(JwtVerifier {
            key: DecodingKey::from_secret(settings.key.as_bytes()),
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                warn!(error = err.to_string(), "jwt validation failed");
                ApiError::Unauthorized("invalid or expired token".to_owned())
            })
    }
}

/// Extractor that only succeeds for requests with a valid bearer token.
///
/// Place it before any body extractor so unauthenticated requests are rejected
/// without reading the body.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    Arc<JwtVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_owned()))?;

        let token = header
            .strip_prefix(BEARER_PREFIX)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("invalid authorization header".to_owned()))?;

        let verifier = Arc::<JwtVerifier>::from_ref(state);
        verifier.verify(token).map(Authenticated)
    }
}
