// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication mode detection.

use serde::Serialize;

use crate::config::AuthConfig;

/// How the gateway authenticates tokens, derived from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Only internally minted tokens.
    Anonymous,
    /// One trusted issuer, verified against its JWKS.
    ConfiguredIssuer,
    /// A fixed secret or public key.
    LegacyKey,
    /// Any HTTPS issuer that publishes a JWKS (non-production only).
    AutoDiscovery,
}

impl AuthMode {
    /// Pick the mode for `config`. First match wins:
    ///
    /// 1. an external issuer is configured
    /// 2. a fixed public key or secret is configured
    /// 3. the environment is not production
    /// 4. otherwise anonymous
    pub fn detect(config: &AuthConfig) -> Self {
        if config.external_issuer.is_some() {
            AuthMode::ConfiguredIssuer
        } else if config.external_public_key.is_some() || config.external_secret.is_some() {
            AuthMode::LegacyKey
        } else if !config.is_production() {
            AuthMode::AutoDiscovery
        } else {
            AuthMode::Anonymous
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthMode::Anonymous => "anonymous",
            AuthMode::ConfiguredIssuer => "configured_issuer",
            AuthMode::LegacyKey => "legacy_key",
            AuthMode::AutoDiscovery => "auto_discovery",
        }
    }

    /// Human-readable reason the mode was selected, for startup logs.
    pub fn rationale(self) -> &'static str {
        match self {
            AuthMode::ConfiguredIssuer => {
                "EXTERNAL_JWT_ISSUER is set; only that issuer's JWKS-signed tokens are accepted"
            }
            AuthMode::LegacyKey => {
                "a fixed EXTERNAL_JWT_PUBLIC_KEY or EXTERNAL_JWT_SECRET is set and no issuer is configured"
            }
            AuthMode::AutoDiscovery => {
                "no external issuer or key is configured outside production; any HTTPS issuer is discovered"
            }
            AuthMode::Anonymous => {
                "production without external configuration; only internal tokens are accepted"
            }
        }
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convenience for [`AuthMode::detect`].
pub fn detect(config: &AuthConfig) -> AuthMode {
    AuthMode::detect(config)
}
