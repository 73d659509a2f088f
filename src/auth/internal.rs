// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Internal token issuer.
//!
//! Mints and verifies HS256 tokens carrying `iss = "internal"` and a `userId`
//! claim. The authentication chain only ever calls [`InternalIssuer::verify`].

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;
use uuid::Uuid;

use super::claims::Claims;
use super::clock::Clock;
use super::codec::{self, VerificationKey};
use super::error::AuthError;

/// Issuer tag of internally minted tokens.
pub const INTERNAL_ISSUER: &str = "internal";

/// Lifetime of minted tokens unless overridden.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

pub struct InternalIssuer {
    secret: Vec<u8>,
    clock: Arc<dyn Clock>,
    token_ttl: Duration,
}

impl std::fmt::Debug for InternalIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalIssuer")
            .field("secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

impl InternalIssuer {
    pub fn new(secret: impl Into<Vec<u8>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: secret.into(),
            clock,
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }

    /// Issuer with a random secret that lives as long as the process.
    pub fn ephemeral(clock: Arc<dyn Clock>) -> Self {
        let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        Self::new(secret, clock)
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Mint a token for `user_id`; `None` mints an anonymous session token.
    pub fn mint(&self, user_id: Option<&str>) -> Result<String, jsonwebtoken::errors::Error> {
        let iat = self.clock.unix_now();
        let ttl = i64::try_from(self.token_ttl.as_secs()).unwrap_or(i64::MAX);
        let mut claims = json!({
            "iss": INTERNAL_ISSUER,
            "iat": iat,
            "exp": iat.saturating_add(ttl),
            "jti": Uuid::new_v4().to_string(),
        });
        if let Some(user_id) = user_id {
            claims["userId"] = json!(user_id);
        }

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
    }

    /// Verify signature, issuer tag and expiry of an internal token.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        codec::verify_signature(
            token,
            &VerificationKey::Secret(self.secret.clone()),
            &[Algorithm::HS256],
        )?;

        let claims = codec::decode(token)?.payload;
        if claims.issuer() != Some(INTERNAL_ISSUER) {
            return Err(AuthError::InvalidIssuer(
                "token was not minted by the internal issuer".to_string(),
            ));
        }

        match claims.exp {
            Some(exp) if exp > self.clock.unix_now() => Ok(claims),
            Some(_) => Err(AuthError::Expired),
            None => Err(AuthError::MalformedToken(
                "internal token has no exp claim".to_string(),
            )),
        }
    }
}
