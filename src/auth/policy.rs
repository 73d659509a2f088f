// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Issuer, audience and claim rules applied after signature verification.

use std::sync::Arc;

use super::claims::Claims;
use super::clock::Clock;
use super::error::{AuthError, ClaimViolation};
use super::providers::IssuerHintRegistry;
use crate::config::AuthConfig;

const HTTPS: &str = "https://";

/// Validation rules for one configuration snapshot.
#[derive(Clone)]
pub struct ValidationPolicy {
    issuer: Option<String>,
    audience: Option<String>,
    production: bool,
    clock: Arc<dyn Clock>,
    hints: Arc<IssuerHintRegistry>,
}

impl std::fmt::Debug for ValidationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationPolicy")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("production", &self.production)
            .finish_non_exhaustive()
    }
}

impl ValidationPolicy {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>, hints: Arc<IssuerHintRegistry>) -> Self {
        Self {
            issuer: config.external_issuer.clone(),
            audience: config.external_audience.clone(),
            production: config.is_production(),
            clock,
            hints,
        }
    }

    pub fn configured_issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    pub fn is_production(&self) -> bool {
        self.production
    }

    /// Check the `iss` claim and return it.
    ///
    /// The issuer must be an `https://` URL and, when one is configured, equal
    /// to it exactly.
    pub fn validate_issuer<'a>(&self, issuer: Option<&'a str>) -> Result<&'a str, AuthError> {
        let issuer = issuer
            .filter(|iss| !iss.is_empty())
            .ok_or_else(|| AuthError::InvalidIssuer("token has no iss claim".to_string()))?;

        if !issuer.starts_with(HTTPS) {
            return Err(AuthError::InvalidIssuer(format!(
                "issuer '{issuer}' does not use https://"
            )));
        }

        if let Some(expected) = &self.issuer {
            if issuer != expected {
                return Err(AuthError::IssuerMismatch {
                    expected: expected.clone(),
                    actual: issuer.to_string(),
                });
            }
        }

        Ok(issuer)
    }

    /// Whether tokens from `issuer` may be verified at all.
    ///
    /// In production only the configured issuer qualifies, and nothing does
    /// when none is configured. Elsewhere any HTTPS issuer does.
    pub fn can_handle_issuer(&self, issuer: &str) -> bool {
        if self.production {
            return self.issuer.as_deref() == Some(issuer);
        }
        issuer.starts_with(HTTPS)
    }

    pub fn validate_audience(&self, claims: &Claims) -> Result<(), AuthError> {
        let Some(expected) = &self.audience else {
            return Ok(());
        };
        if claims.aud.as_ref().is_some_and(|aud| aud.contains(expected)) {
            Ok(())
        } else {
            Err(AuthError::AudienceMismatch {
                expected: expected.clone(),
            })
        }
    }

    /// An access token from a provider known for opaque tokens, whose audience
    /// is absent or merely names the client (`azp`).
    pub fn is_opaque_token(&self, claims: &Claims) -> bool {
        let Some(issuer) = claims.issuer() else {
            return false;
        };
        if !self.hints.is_opaque_issuer(issuer) {
            return false;
        }
        match (&claims.aud, claims.azp.as_deref()) {
            (None, _) => true,
            (Some(aud), Some(azp)) => aud.is_only(azp),
            (Some(_), None) => false,
        }
    }

    /// All claim violations, in a stable order.
    pub fn check_claims(&self, claims: &Claims) -> Vec<ClaimViolation> {
        let now = self.clock.unix_now();
        let mut violations = Vec::new();

        if !claims.has_identity() {
            violations.push(ClaimViolation::MissingIdentity);
        }
        if claims.exp.is_some_and(|exp| exp <= now) {
            violations.push(ClaimViolation::Expired);
        }
        if claims.nbf.is_some_and(|nbf| nbf > now) {
            violations.push(ClaimViolation::NotYetValid);
        }
        violations
    }

    pub fn validate_claims(&self, claims: &Claims) -> Result<(), AuthError> {
        match AuthError::from_violations(self.check_claims(claims)) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
