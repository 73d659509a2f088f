// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token validators.
//!
//! Every strategy is a variant of the closed [`Validator`] enum and offers the
//! same three operations: `can_handle` (cheap, infallible routing check on the
//! unverified token), `verify`, and `extract_user_id`.
//!
//! The Clerk and auto-discovery variants share one verification pipeline
//! ([`Discovery`]) and differ only in which tokens they claim.

use std::sync::Arc;

use jsonwebtoken::Algorithm;
use serde::Serialize;

use super::claims::{Claims, VerifiedIdentity};
use super::codec::{self, VerificationKey, ASYMMETRIC_ALGORITHMS};
use super::error::AuthError;
use super::internal::{InternalIssuer, INTERNAL_ISSUER};
use super::jwks::{self, KeyDirectory};
use super::policy::ValidationPolicy;
use super::providers::{IssuerHintRegistry, Provider};

/// User id reported for internal tokens without a `userId` claim.
pub const ANONYMOUS_USER_ID: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    Internal,
    FixedKey,
    ConfiguredIssuer,
    AutoDiscovery,
    Clerk,
}

impl ValidatorKind {
    pub fn name(self) -> &'static str {
        match self {
            ValidatorKind::Internal => "internal",
            ValidatorKind::FixedKey => "fixed_key",
            ValidatorKind::ConfiguredIssuer => "configured_issuer",
            ValidatorKind::AutoDiscovery => "auto_discovery",
            ValidatorKind::Clerk => "clerk",
        }
    }
}

impl std::fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Unverified claims, or `None` when the token does not decode.
fn peek_claims(token: &str) -> Option<Claims> {
    codec::decode(token).ok().map(|decoded| decoded.payload)
}

/// JWKS-backed verification shared by the external validators.
#[derive(Clone)]
pub struct Discovery {
    directory: Arc<KeyDirectory>,
    policy: ValidationPolicy,
}

impl Discovery {
    pub fn new(directory: Arc<KeyDirectory>, policy: ValidationPolicy) -> Self {
        Self { directory, policy }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Issuer checks, opaque-token rejection, key lookup, signature, then
    /// audience and claims.
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let decoded = codec::decode(token)?;
        let claims = decoded.payload;

        let issuer = self.policy.validate_issuer(claims.issuer())?.to_string();

        // Checked before any key lookup so these never surface as bad signatures.
        if self.policy.is_opaque_token(&claims) {
            return Err(AuthError::OpaqueToken);
        }

        let jwk = self
            .directory
            .signing_key(&issuer, decoded.header.kid.as_deref())
            .await?;
        let key = jwks::to_verification_key(&jwk)?;
        codec::verify_signature(token, &key, ASYMMETRIC_ALGORITHMS)?;

        self.policy.validate_audience(&claims)?;
        self.policy.validate_claims(&claims)?;
        Ok(claims)
    }

    /// HTTPS issuer allowed by the policy.
    fn claims_issuer(&self, claims: &Claims) -> bool {
        claims
            .issuer()
            .is_some_and(|iss| iss.starts_with("https://") && self.policy.can_handle_issuer(iss))
    }
}

/// Tokens minted by the internal issuer.
#[derive(Clone)]
pub struct InternalValidator {
    issuer: Arc<InternalIssuer>,
}

impl InternalValidator {
    pub fn new(issuer: Arc<InternalIssuer>) -> Self {
        Self { issuer }
    }
}

/// One configured key (secret or PEM public key) and one algorithm.
#[derive(Clone)]
pub struct FixedKeyValidator {
    key: VerificationKey,
    algorithm: Algorithm,
    policy: ValidationPolicy,
}

impl FixedKeyValidator {
    pub fn new(key: VerificationKey, algorithm: Algorithm, policy: ValidationPolicy) -> Self {
        Self {
            key,
            algorithm,
            policy,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        codec::verify_signature(token, &self.key, &[self.algorithm])?;
        let claims = codec::decode(token)?.payload;
        self.policy.validate_audience(&claims)?;
        self.policy.validate_claims(&claims)?;
        Ok(claims)
    }
}

/// The single issuer named in configuration.
#[derive(Clone)]
pub struct ConfiguredIssuerValidator {
    issuer: String,
    discovery: Discovery,
}

impl ConfiguredIssuerValidator {
    pub fn new(issuer: impl Into<String>, discovery: Discovery) -> Self {
        Self {
            issuer: issuer.into(),
            discovery,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

/// Any HTTPS issuer that publishes a JWKS (development only).
#[derive(Clone)]
pub struct AutoDiscoveryValidator {
    discovery: Discovery,
}

impl AutoDiscoveryValidator {
    pub fn new(discovery: Discovery) -> Self {
        Self { discovery }
    }
}

/// Clerk-issued tokens, ahead of generic discovery.
#[derive(Clone)]
pub struct ClerkValidator {
    discovery: Discovery,
    hints: Arc<IssuerHintRegistry>,
}

impl ClerkValidator {
    pub fn new(discovery: Discovery, hints: Arc<IssuerHintRegistry>) -> Self {
        Self { discovery, hints }
    }

    fn is_clerk(&self, claims: &Claims) -> bool {
        let clerk_issuer = claims
            .issuer()
            .is_some_and(|iss| self.hints.detect(iss) == Some(Provider::Clerk));
        let clerk_azp = claims.azp.as_deref().is_some_and(|azp| azp.contains("clerk"));
        clerk_issuer || clerk_azp
    }
}

/// A verification strategy.
#[derive(Clone)]
pub enum Validator {
    Internal(InternalValidator),
    FixedKey(FixedKeyValidator),
    ConfiguredIssuer(ConfiguredIssuerValidator),
    AutoDiscovery(AutoDiscoveryValidator),
    Clerk(ClerkValidator),
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Validator::ConfiguredIssuer(v) => f
                .debug_struct("ConfiguredIssuer")
                .field("issuer", &v.issuer)
                .finish(),
            Validator::FixedKey(v) => f
                .debug_struct("FixedKey")
                .field("algorithm", &v.algorithm)
                .finish_non_exhaustive(),
            other => write!(f, "{}", other.kind()),
        }
    }
}

impl Validator {
    pub fn kind(&self) -> ValidatorKind {
        match self {
            Validator::Internal(_) => ValidatorKind::Internal,
            Validator::FixedKey(_) => ValidatorKind::FixedKey,
            Validator::ConfiguredIssuer(_) => ValidatorKind::ConfiguredIssuer,
            Validator::AutoDiscovery(_) => ValidatorKind::AutoDiscovery,
            Validator::Clerk(_) => ValidatorKind::Clerk,
        }
    }

    /// Whether this validator claims `token`. Never fails: a token that does
    /// not decode is simply not handled.
    pub fn can_handle(&self, token: &str) -> bool {
        if let Validator::FixedKey(_) = self {
            return true;
        }
        let Some(claims) = peek_claims(token) else {
            return false;
        };
        match self {
            Validator::Internal(_) => claims.issuer() == Some(INTERNAL_ISSUER),
            Validator::FixedKey(_) => true,
            Validator::ConfiguredIssuer(v) => claims.issuer() == Some(v.issuer.as_str()),
            Validator::AutoDiscovery(v) => v.discovery.claims_issuer(&claims),
            Validator::Clerk(v) => v.discovery.claims_issuer(&claims) && v.is_clerk(&claims),
        }
    }

    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        match self {
            Validator::Internal(v) => v.issuer.verify(token),
            Validator::FixedKey(v) => v.verify(token),
            Validator::ConfiguredIssuer(v) => v.discovery.verify(token).await,
            Validator::AutoDiscovery(v) => v.discovery.verify(token).await,
            Validator::Clerk(v) => v.discovery.verify(token).await,
        }
    }

    /// Normalized user id from verified claims.
    ///
    /// Internal tokens without `userId` are anonymous sessions. External
    /// tokens resolve `sub`, `user_id`, `userId`, `email` in that order.
    pub fn extract_user_id(&self, claims: &Claims) -> Option<String> {
        match self {
            Validator::Internal(_) => Some(
                claims
                    .user_id_camel
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .unwrap_or(ANONYMOUS_USER_ID)
                    .to_string(),
            ),
            _ => claims.external_user_id().map(str::to_string),
        }
    }

    /// Verify and resolve the identity in one step.
    pub async fn authenticate(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let claims = self.verify(token).await?;
        let user_id = self
            .extract_user_id(&claims)
            .ok_or(AuthError::MissingIdentityClaims)?;
        Ok(VerifiedIdentity {
            user_id,
            claims,
            validator: self.kind(),
        })
    }
}
