// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Entry point of token verification.
//!
//! [`Authenticator`] detects the mode, builds the chain once, and dispatches
//! every token to the first validator that claims it. Concurrent requests
//! carrying the same token share one verification, keyed by the token's
//! SHA-256 digest.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::claims::VerifiedIdentity;
use super::codec::{self, TokenShape};
use super::error::{AuthError, AuthFailure};
use super::factory::{self, AuthDependencies};
use super::mode::AuthMode;
use super::providers::IssuerHintRegistry;
use super::single_flight::{SingleFlight, SingleFlightStats};
use super::validators::{Validator, ValidatorKind};
use crate::config::AuthConfig;

type Outcome = Result<VerifiedIdentity, AuthFailure>;

const REFERENCE_TOKEN_HINT: &str =
    "The credential is an opaque reference token, not a JWT. Send a JWT access token.";

pub struct Authenticator {
    mode: AuthMode,
    production: bool,
    chain: Arc<[Validator]>,
    hints: Arc<IssuerHintRegistry>,
    flights: SingleFlight<[u8; 32], Outcome>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("mode", &self.mode)
            .field("production", &self.production)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(config: &AuthConfig, deps: &AuthDependencies) -> Self {
        let mode = AuthMode::detect(config);
        let chain = factory::build(config, mode, deps);
        Self {
            mode,
            production: config.is_production(),
            chain: chain.into(),
            hints: Arc::clone(&deps.hints),
            flights: SingleFlight::new(),
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn validators(&self) -> Vec<ValidatorKind> {
        self.chain.iter().map(Validator::kind).collect()
    }

    /// Verifications currently running and how many requests joined them.
    pub fn dedup_stats(&self) -> SingleFlightStats {
        self.flights.stats()
    }

    /// Verify a raw bearer token.
    pub async fn verify(&self, raw_token: &str) -> Outcome {
        let token = raw_token.trim();
        if token.is_empty() {
            return Err(AuthFailure::new(AuthError::MalformedToken(
                "empty bearer token".to_string(),
            )));
        }

        // Only the issuer can read a JWE; everything else goes to the chain.
        if TokenShape::classify(token) == TokenShape::Encrypted {
            debug!("Rejected encrypted bearer credential");
            return Err(self.hints.enrich(AuthError::OpaqueToken, None));
        }

        let digest: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        let chain = Arc::clone(&self.chain);
        let hints = Arc::clone(&self.hints);
        let production = self.production;
        let token = token.to_string();

        self.flights
            .run(digest, async move {
                dispatch(&chain, &hints, production, &token).await
            })
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Token verification aborted");
                Err(AuthFailure::new(AuthError::VerificationAborted))
            })
    }
}

async fn dispatch(
    chain: &[Validator],
    hints: &IssuerHintRegistry,
    production: bool,
    token: &str,
) -> Outcome {
    let Some(validator) = chain.iter().find(|v| v.can_handle(token)) else {
        debug!("No validator accepts the token");
        let claims = codec::decode(token).ok().map(|d| d.payload);
        let mut failure = hints.enrich(AuthError::NoMatchingValidator, claims.as_ref());
        if TokenShape::classify(token) == TokenShape::Reference {
            failure.hint = Some(REFERENCE_TOKEN_HINT.to_string());
        }
        return Err(failure);
    };

    let kind = validator.kind();
    debug!(validator = kind.name(), "Validator selected");

    match validator.authenticate(token).await {
        Ok(identity) => {
            debug!(validator = kind.name(), user_id = %identity.user_id, "Token verified");
            Ok(identity)
        }
        Err(error) => {
            warn!(
                validator = kind.name(),
                error_code = error.error_code(),
                error = %error,
                "Token verification failed"
            );
            let claims = codec::decode(token).ok().map(|d| d.payload);
            let mut failure = hints.enrich(error, claims.as_ref());
            failure.dependency_unavailable = production
                && kind == ValidatorKind::ConfiguredIssuer
                && failure.error.is_fetch_failure();
            Err(failure)
        }
    }
}

/// Verify `raw_token` against a chain built from `config` for this call only.
///
/// For callers that re-read configuration per request. Long-running services
/// should build one [`Authenticator`] instead.
pub async fn verify_request_token(
    raw_token: &str,
    config: &AuthConfig,
    deps: &AuthDependencies,
) -> Outcome {
    Authenticator::new(config, deps).verify(raw_token).await
}
