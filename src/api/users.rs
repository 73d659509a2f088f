// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity endpoint.

use axum::Json;
use serde::Serialize;

use crate::auth::{Auth, Claims, ValidatorKind, VerifiedIdentity};

/// Response for GET /v1/me
#[derive(Debug, Serialize)]
pub struct MeResponse {
    /// Normalized user id
    pub user_id: String,
    /// Validator that accepted the token
    pub validator: ValidatorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Verified claims
    pub claims: Claims,
}

impl From<VerifiedIdentity> for MeResponse {
    fn from(identity: VerifiedIdentity) -> Self {
        Self {
            user_id: identity.user_id,
            validator: identity.validator,
            issuer: identity.claims.iss.clone(),
            expires_at: identity.claims.exp,
            claims: identity.claims,
        }
    }
}

/// Get the identity behind the bearer token.
pub async fn me(Auth(identity): Auth) -> Json<MeResponse> {
    Json(identity.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn me_response_from_identity() {
        let identity = VerifiedIdentity {
            user_id: "user_123".to_string(),
            claims: Claims {
                sub: Some("user_123".into()),
                iss: Some("https://x.clerk.accounts.dev".into()),
                exp: Some(1_900_000_000),
                ..Claims::default()
            },
            validator: ValidatorKind::Clerk,
        };

        let response: MeResponse = identity.into();
        assert_eq!(response.user_id, "user_123");
        assert_eq!(response.validator, ValidatorKind::Clerk);
        assert_eq!(response.issuer.as_deref(), Some("https://x.clerk.accounts.dev"));
        assert_eq!(response.expires_at, Some(1_900_000_000));
    }
}
