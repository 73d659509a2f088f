// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and the verified identity handed to callers.

use serde::{Deserialize, Serialize};

use super::validators::ValidatorKind;

/// The `aud` claim, which providers emit either as a string or as an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// Check whether `expected` is the audience (string) or one of them (array).
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == expected,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == expected),
        }
    }

    /// Check whether the audience names nothing but `value`.
    pub fn is_only(&self, value: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == value,
            Audience::Multiple(auds) => !auds.is_empty() && auds.iter().all(|aud| aud == value),
        }
    }
}

/// Claims carried by any token the gateway accepts.
///
/// Only the registered claims and the identity aliases used by supported
/// providers are typed; everything else lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (canonical user identifier for OIDC providers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Camel-case user id (internal issuer, some custom providers)
    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id_camel: Option<String>,

    /// Snake-case user id (Firebase and legacy issuers)
    #[serde(default, rename = "user_id", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration (seconds since the epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued at (seconds since the epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not before (seconds since the epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Authorized party
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl Claims {
    /// Resolve the user id of an externally issued token.
    ///
    /// Resolution order is `sub`, `user_id`, `userId`, `email`; the first
    /// non-empty value wins.
    pub fn external_user_id(&self) -> Option<&str> {
        non_empty(&self.sub)
            .or_else(|| non_empty(&self.user_id))
            .or_else(|| non_empty(&self.user_id_camel))
            .or_else(|| non_empty(&self.email))
    }

    /// Whether any identity claim is present.
    pub fn has_identity(&self) -> bool {
        self.external_user_id().is_some()
    }

    /// Issuer, if present and non-empty.
    pub fn issuer(&self) -> Option<&str> {
        non_empty(&self.iss)
    }
}

/// A successfully verified bearer token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedIdentity {
    /// Normalized user identifier
    pub user_id: String,

    /// Verified claims
    pub claims: Claims,

    /// Validator that accepted the token
    pub validator: ValidatorKind,
}
