// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! [`AuthError`] is the typed failure produced by every stage of the
//! verification pipeline. [`AuthFailure`] is what the HTTP boundary sees: the
//! error plus provider-specific remediation and the status mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::providers::Provider;

/// A single claim-level problem found by the validation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimViolation {
    /// None of `sub`, `user_id`, `userId`, `email` is present.
    MissingIdentity,
    /// `exp` is not strictly in the future.
    Expired,
    /// `nbf` is in the future.
    NotYetValid,
}

impl std::fmt::Display for ClaimViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimViolation::MissingIdentity => write!(f, "missing identity claim"),
            ClaimViolation::Expired => write!(f, "token expired"),
            ClaimViolation::NotYetValid => write!(f, "token not yet valid"),
        }
    }
}

/// Authentication error type.
///
/// Cloneable so that one in-flight outcome can be handed to every coalesced
/// caller. Messages never contain the raw token or key material.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header is required")]
    MissingAuthHeader,

    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,

    #[error("Token is malformed: {0}")]
    MalformedToken(String),

    #[error("Token has expired")]
    Expired,

    #[error("Token is not yet valid")]
    NotYetValid,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token issuer is invalid: {0}")]
    InvalidIssuer(String),

    #[error("Token issuer '{actual}' does not match the configured issuer '{expected}'")]
    IssuerMismatch { expected: String, actual: String },

    #[error("Token audience does not include '{expected}'")]
    AudienceMismatch { expected: String },

    #[error("Token carries none of the identity claims sub, user_id, userId, email")]
    MissingIdentityClaims,

    #[error("Token claims are invalid: {}", format_violations(.0))]
    InvalidClaims(Vec<ClaimViolation>),

    #[error("Token is an opaque access token and cannot be verified as a JWT")]
    OpaqueToken,

    #[error("No matching key found in JWKS")]
    NoMatchingKey,

    #[error("Signing key format is not supported: {0}")]
    UnsupportedKeyFormat(String),

    #[error("Failed to fetch JWKS: {0}")]
    FetchError(String),

    #[error("Timed out fetching JWKS")]
    FetchTimeout,

    #[error("JWKS response is invalid: {0}")]
    FormatError(String),

    #[error("No validator accepts this token")]
    NoMatchingValidator,

    #[error("Token verification did not complete")]
    VerificationAborted,
}

fn format_violations(violations: &[ClaimViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::Expired => "token_expired",
            AuthError::NotYetValid => "token_not_yet_valid",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::InvalidIssuer(_) => "invalid_issuer",
            AuthError::IssuerMismatch { .. } => "issuer_mismatch",
            AuthError::AudienceMismatch { .. } => "audience_mismatch",
            AuthError::MissingIdentityClaims => "missing_identity_claims",
            AuthError::InvalidClaims(_) => "invalid_claims",
            AuthError::OpaqueToken => "opaque_token",
            AuthError::NoMatchingKey => "no_matching_key",
            AuthError::UnsupportedKeyFormat(_) => "unsupported_key_format",
            AuthError::FetchError(_) => "jwks_fetch_error",
            AuthError::FetchTimeout => "jwks_fetch_timeout",
            AuthError::FormatError(_) => "jwks_format_error",
            AuthError::NoMatchingValidator => "no_matching_validator",
            AuthError::VerificationAborted => "verification_aborted",
        }
    }

    /// Whether the failure reflects an unreachable key provider rather than a
    /// bad credential.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, AuthError::FetchError(_) | AuthError::FetchTimeout)
    }

    /// Collapse a list of claim violations into the most specific error.
    pub fn from_violations(mut violations: Vec<ClaimViolation>) -> Option<Self> {
        match violations.len() {
            0 => None,
            1 => Some(match violations.remove(0) {
                ClaimViolation::MissingIdentity => AuthError::MissingIdentityClaims,
                ClaimViolation::Expired => AuthError::Expired,
                ClaimViolation::NotYetValid => AuthError::NotYetValid,
            }),
            _ => Some(AuthError::InvalidClaims(violations)),
        }
    }
}

/// An [`AuthError`] enriched for the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub error: AuthError,
    /// Identity provider recognised from the token, if any.
    pub provider: Option<Provider>,
    /// Actionable remediation text.
    pub hint: Option<String>,
    /// Set when a configured issuer could not be reached in production.
    pub dependency_unavailable: bool,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<Provider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl AuthFailure {
    pub fn new(error: AuthError) -> Self {
        Self {
            error,
            provider: None,
            hint: None,
            dependency_unavailable: false,
        }
    }

    pub fn with_hint(mut self, provider: Option<Provider>, hint: impl Into<String>) -> Self {
        self.provider = provider;
        self.hint = Some(hint.into());
        self
    }

    /// Get the HTTP status code for this failure.
    ///
    /// Every credential problem is 401. Only an unreachable configured issuer
    /// in production is reported as 503.
    pub fn status_code(&self) -> StatusCode {
        if self.dependency_unavailable && self.error.is_fetch_failure() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::UNAUTHORIZED
        }
    }
}

impl From<AuthError> for AuthFailure {
    fn from(error: AuthError) -> Self {
        Self::new(error)
    }
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{} ({hint})", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for AuthFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.error.to_string(),
            error_code: self.error.error_code().to_string(),
            provider: self.provider,
            hint: self.hint,
        });
        (status, body).into_response()
    }
}
