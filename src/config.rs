// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the configuration snapshots read
//! from them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `NODE_ENV` | Deployment environment (`production`/`prod` lock down auto-discovery) | unset (development) |
//! | `EXTERNAL_JWT_ISSUER` | Issuer whose JWKS is trusted | Optional |
//! | `EXTERNAL_JWT_PUBLIC_KEY` | Fixed PEM public key (RS256) | Optional |
//! | `EXTERNAL_JWT_SECRET` | Fixed HMAC secret (HS256) | Optional |
//! | `EXTERNAL_JWT_AUDIENCE` | Required `aud` value | Optional |
//! | `INTERNAL_JWT_SECRET` | HMAC secret of the internal issuer | Random per process |
//! | `JWKS_CACHE_TTL_SECS` | JWKS cache lifetime | `3600` |
//! | `JWKS_FETCH_TIMEOUT_SECS` | Bound on a single JWKS fetch | `5` |

use std::time::Duration;

use tracing::warn;

use crate::auth::jwks::{DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Logging format: `json` for structured output, anything else for pretty.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const NODE_ENV_ENV: &str = "NODE_ENV";

/// Environment variable name for the trusted external issuer.
///
/// When set, only tokens from this issuer (verified against its JWKS) are
/// accepted, regardless of any fixed key also being configured.
pub const EXTERNAL_JWT_ISSUER_ENV: &str = "EXTERNAL_JWT_ISSUER";

/// PEM public key for fixed-key verification. Literal `\n` sequences are
/// expanded, so the key can live on one line of an env file.
pub const EXTERNAL_JWT_PUBLIC_KEY_ENV: &str = "EXTERNAL_JWT_PUBLIC_KEY";

pub const EXTERNAL_JWT_SECRET_ENV: &str = "EXTERNAL_JWT_SECRET";
pub const EXTERNAL_JWT_AUDIENCE_ENV: &str = "EXTERNAL_JWT_AUDIENCE";

/// HMAC secret shared by every gateway instance that must accept the same
/// internal tokens.
pub const INTERNAL_JWT_SECRET_ENV: &str = "INTERNAL_JWT_SECRET";

pub const JWKS_CACHE_TTL_SECS_ENV: &str = "JWKS_CACHE_TTL_SECS";
pub const JWKS_FETCH_TIMEOUT_SECS_ENV: &str = "JWKS_FETCH_TIMEOUT_SECS";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

const PRODUCTION_ALIASES: &[&str] = &["production", "prod"];

/// Whether `node_env` names a production environment.
///
/// Unknown values are treated as non-production.
pub fn is_production_env(node_env: Option<&str>) -> bool {
    node_env.is_some_and(|env| {
        let env = env.trim();
        PRODUCTION_ALIASES
            .iter()
            .any(|alias| env.eq_ignore_ascii_case(alias))
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Authentication configuration snapshot.
///
/// Immutable once read; the mode detector and validators only borrow it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    pub node_env: Option<String>,
    pub external_issuer: Option<String>,
    pub external_public_key: Option<String>,
    pub external_secret: Option<String>,
    pub external_audience: Option<String>,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| non_blank(lookup(name));
        Self {
            node_env: var(NODE_ENV_ENV).map(|v| v.trim().to_string()),
            external_issuer: var(EXTERNAL_JWT_ISSUER_ENV).map(|v| v.trim().to_string()),
            external_public_key: var(EXTERNAL_JWT_PUBLIC_KEY_ENV)
                .map(|v| v.replace("\\n", "\n").trim().to_string()),
            external_secret: var(EXTERNAL_JWT_SECRET_ENV),
            external_audience: var(EXTERNAL_JWT_AUDIENCE_ENV).map(|v| v.trim().to_string()),
        }
    }

    pub fn is_production(&self) -> bool {
        is_production_env(self.node_env.as_deref())
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("AuthConfig")
            .field("node_env", &self.node_env)
            .field("external_issuer", &self.external_issuer)
            .field("external_public_key", &redacted(&self.external_public_key))
            .field("external_secret", &redacted(&self.external_secret))
            .field("external_audience", &self.external_audience)
            .finish()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Settings for the gateway binary.
#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
    pub jwks_cache_ttl: Duration,
    pub jwks_fetch_timeout: Duration,
    pub internal_secret: Option<String>,
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: Duration) -> Duration {
    match non_blank(lookup(name)) {
        None => default,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                warn!(variable = name, value = %raw, "Ignoring invalid duration, using default");
                default
            }
        },
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = match non_blank(lookup(PORT_ENV)) {
            None => DEFAULT_PORT,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(value = %raw, "Ignoring invalid PORT, using {DEFAULT_PORT}");
                DEFAULT_PORT
            }),
        };

        let log_format = match non_blank(lookup(LOG_FORMAT_ENV)) {
            Some(f) if f.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            host: non_blank(lookup(HOST_ENV)).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            log_format,
            jwks_cache_ttl: seconds(&lookup, JWKS_CACHE_TTL_SECS_ENV, DEFAULT_CACHE_TTL),
            jwks_fetch_timeout: seconds(&lookup, JWKS_FETCH_TIMEOUT_SECS_ENV, DEFAULT_FETCH_TIMEOUT),
            internal_secret: non_blank(lookup(INTERNAL_JWT_SECRET_ENV)),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_format", &self.log_format)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("jwks_fetch_timeout", &self.jwks_fetch_timeout)
            .field("internal_secret", &self.internal_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
